//! Host world seam.
//!
//! The claim core never touches host engine types directly. It asks a
//! [`CellOwnershipSource`] for cell records and policy predicates and hands it
//! ownership-change events for watchers. [`MemoryWorld`] is the in-process
//! adapter used by the CLI and tests.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claims::claimant::{Claimant, ClaimantPlayer};
use crate::claims::errors::ClaimError;
use crate::claims::storage::ClaimStore;
use crate::claims::types::{CellCoord, CellOwnership, DEFAULT_MIN_Y};

/// Event delivered to every watcher of a cell after a claim or unclaim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnershipChange {
    pub coord: CellCoord,
    pub owner_id: Option<Uuid>,
    pub owner_name: Option<String>,
    pub town_id: Option<Uuid>,
}

/// Inclusive rectangle of cells.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellRect {
    pub min: CellCoord,
    pub max: CellCoord,
}

impl CellRect {
    pub fn new(a: CellCoord, b: CellCoord) -> Self {
        Self {
            min: CellCoord::new(a.x.min(b.x), a.z.min(b.z)),
            max: CellCoord::new(a.x.max(b.x), a.z.max(b.z)),
        }
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        (self.min.x..=self.max.x).contains(&coord.x) && (self.min.z..=self.max.z).contains(&coord.z)
    }
}

/// Capabilities the claim core consumes from the host world.
pub trait CellOwnershipSource {
    /// Ownership record for `coord`; `None` for cells never claimed.
    fn cell(&self, coord: CellCoord) -> Option<&CellOwnership>;

    /// Mutable record for `coord`, created as wilderness when absent.
    fn cell_mut(&mut self, coord: CellCoord) -> &mut CellOwnership;

    /// Flag `coord` for persistence.
    fn mark_dirty(&mut self, coord: CellCoord);

    fn in_border(&self, coord: CellCoord) -> bool;

    fn is_protected(&self, coord: CellCoord) -> bool;

    /// Host rules (contiguity and similar) for a player claiming `coord`.
    fn can_player_claim(&self, player: &ClaimantPlayer, coord: CellCoord) -> bool;

    fn notify_watchers(&mut self, change: OwnershipChange);

    fn min_y(&self) -> i32 {
        DEFAULT_MIN_Y
    }
}

/// In-memory world used by the CLI and tests.
#[derive(Debug, Default)]
pub struct MemoryWorld {
    cells: HashMap<CellCoord, CellOwnership>,
    dirty: HashSet<CellCoord>,
    border_radius: Option<i32>,
    protected: Vec<CellRect>,
    require_contiguous: bool,
    min_y: Option<i32>,
    watchers: HashMap<CellCoord, BTreeSet<Uuid>>,
    changes: Vec<OwnershipChange>,
    deliveries: Vec<(Uuid, OwnershipChange)>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells with `|x|` or `|z|` above `radius` lie outside the border.
    pub fn with_border(mut self, radius: i32) -> Self {
        self.border_radius = Some(radius);
        self
    }

    pub fn with_protected_zone(mut self, zone: CellRect) -> Self {
        self.protected.push(zone);
        self
    }

    pub fn with_contiguity(mut self, required: bool) -> Self {
        self.require_contiguous = required;
        self
    }

    pub fn with_min_y(mut self, min_y: i32) -> Self {
        self.min_y = Some(min_y);
        self
    }

    /// Populate cell records from the store.
    pub fn load_from(mut self, store: &ClaimStore) -> Result<Self, ClaimError> {
        for (coord, cell) in store.list_cells()? {
            self.cells.insert(coord, cell);
        }
        debug!("loaded {} cell records", self.cells.len());
        Ok(self)
    }

    /// Write every dirty cell to the store. Returns how many were written.
    pub fn flush_dirty(&mut self, store: &ClaimStore) -> Result<usize, ClaimError> {
        let dirty: Vec<CellCoord> = self.dirty.drain().collect();
        for coord in &dirty {
            let cell = self.cells.get(coord).cloned().unwrap_or_default();
            store.put_cell(*coord, &cell)?;
        }
        Ok(dirty.len())
    }

    pub fn set_cell(&mut self, coord: CellCoord, cell: CellOwnership) {
        self.cells.insert(coord, cell);
    }

    pub fn watch(&mut self, coord: CellCoord, watcher: Uuid) {
        self.watchers.entry(coord).or_default().insert(watcher);
    }

    pub fn unwatch(&mut self, coord: CellCoord, watcher: Uuid) {
        if let Some(set) = self.watchers.get_mut(&coord) {
            set.remove(&watcher);
        }
    }

    /// All ownership changes announced so far, in order.
    pub fn changes(&self) -> &[OwnershipChange] {
        &self.changes
    }

    /// Per-watcher deliveries of those changes.
    pub fn deliveries(&self) -> &[(Uuid, OwnershipChange)] {
        &self.deliveries
    }

    pub fn is_dirty(&self, coord: CellCoord) -> bool {
        self.dirty.contains(&coord)
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = (&CellCoord, &CellOwnership)> {
        self.cells.iter()
    }

    pub fn owned_by(&self, owner: Uuid) -> usize {
        self.cells
            .values()
            .filter(|cell| cell.owner_id() == Some(owner))
            .count()
    }
}

impl CellOwnershipSource for MemoryWorld {
    fn cell(&self, coord: CellCoord) -> Option<&CellOwnership> {
        self.cells.get(&coord)
    }

    fn cell_mut(&mut self, coord: CellCoord) -> &mut CellOwnership {
        self.cells.entry(coord).or_default()
    }

    fn mark_dirty(&mut self, coord: CellCoord) {
        self.dirty.insert(coord);
    }

    fn in_border(&self, coord: CellCoord) -> bool {
        match self.border_radius {
            Some(radius) => coord.x.abs() <= radius && coord.z.abs() <= radius,
            None => true,
        }
    }

    fn is_protected(&self, coord: CellCoord) -> bool {
        self.protected.iter().any(|zone| zone.contains(coord))
    }

    fn can_player_claim(&self, player: &ClaimantPlayer, coord: CellCoord) -> bool {
        if !self.require_contiguous || player.chunk_count == 0 {
            return true;
        }
        let id = player.id();
        coord.neighbours().iter().any(|n| {
            self.cells
                .get(n)
                .is_some_and(|cell| cell.owner_id() == Some(id))
        })
    }

    fn notify_watchers(&mut self, change: OwnershipChange) {
        if let Some(watchers) = self.watchers.get(&change.coord) {
            for watcher in watchers {
                self.deliveries.push((*watcher, change.clone()));
            }
        }
        self.changes.push(change);
    }

    fn min_y(&self) -> i32 {
        self.min_y.unwrap_or(DEFAULT_MIN_Y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_and_zones() {
        let world = MemoryWorld::new()
            .with_border(10)
            .with_protected_zone(CellRect::new(CellCoord::new(2, 2), CellCoord::new(-2, -2)));
        assert!(world.in_border(CellCoord::new(10, -10)));
        assert!(!world.in_border(CellCoord::new(11, 0)));
        assert!(world.is_protected(CellCoord::new(0, 0)));
        assert!(world.is_protected(CellCoord::new(-2, 2)));
        assert!(!world.is_protected(CellCoord::new(3, 0)));
    }

    #[test]
    fn contiguity_requires_an_owned_neighbour() {
        let id = Uuid::new_v4();
        let mut player = ClaimantPlayer::new(id, 8);
        let mut world = MemoryWorld::new().with_contiguity(true);
        assert!(world.can_player_claim(&player, CellCoord::new(5, 5)));

        world.set_cell(CellCoord::new(0, 0), CellOwnership::owned_by(id));
        player.chunk_count = 1;
        assert!(world.can_player_claim(&player, CellCoord::new(1, 0)));
        assert!(!world.can_player_claim(&player, CellCoord::new(2, 0)));
    }

    #[test]
    fn notifications_reach_each_watcher() {
        let mut world = MemoryWorld::new();
        let coord = CellCoord::new(1, 1);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        world.watch(coord, a);
        world.watch(coord, b);
        world.notify_watchers(OwnershipChange {
            coord,
            owner_id: None,
            owner_name: None,
            town_id: None,
        });
        assert_eq!(world.changes().len(), 1);
        assert_eq!(world.deliveries().len(), 2);

        world.unwatch(coord, a);
        world.notify_watchers(OwnershipChange {
            coord,
            owner_id: Some(b),
            owner_name: None,
            town_id: None,
        });
        assert_eq!(world.deliveries().len(), 3);
        assert_eq!(world.deliveries()[2].0, b);
    }
}
