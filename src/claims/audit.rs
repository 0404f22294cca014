//! Consistency audit between cell records and claimant counters.
//!
//! A claimant's `chunk_count` must equal the number of cells attributed to it.
//! Crashes between a cell write and a claimant save can break that; the audit
//! reports the drift and [`repair_counts`] rewrites the counters from the
//! cells, which are treated as the source of truth.

use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::claims::cache::ClaimCache;
use crate::claims::claimant::{read, write, ClaimantKind};
use crate::claims::types::CellOwnership;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CountMismatch {
    pub kind: ClaimantKind,
    pub id: Uuid,
    pub recorded: u32,
    pub actual: u32,
}

/// Compare counters with the cells. `known_players` / `known_towns` add
/// claimants that may hold a stale count while owning nothing.
pub fn audit_counts<'a>(
    claims: &ClaimCache,
    cells: impl IntoIterator<Item = &'a CellOwnership>,
    known_players: &[Uuid],
    known_towns: &[Uuid],
) -> Vec<CountMismatch> {
    let mut players: BTreeMap<Uuid, u32> = known_players.iter().map(|id| (*id, 0)).collect();
    let mut towns: BTreeMap<Uuid, u32> = known_towns.iter().map(|id| (*id, 0)).collect();
    for cell in cells {
        if let Some(owner) = cell.owner_id() {
            *players.entry(owner).or_default() += 1;
        }
        if let Some(town) = cell.town_id() {
            *towns.entry(town).or_default() += 1;
        }
    }

    let mut mismatches = Vec::new();
    for (id, actual) in players {
        let recorded = read(&claims.get_player_claim(id)).chunk_count;
        if recorded != actual {
            mismatches.push(CountMismatch {
                kind: ClaimantKind::Player,
                id,
                recorded,
                actual,
            });
        }
    }
    let mut missing_towns = BTreeSet::new();
    for (id, actual) in towns {
        let Some(town) = claims.get_town_claim(id) else {
            if actual > 0 {
                missing_towns.insert(id);
            }
            continue;
        };
        let recorded = read(&town).chunk_count;
        if recorded != actual {
            mismatches.push(CountMismatch {
                kind: ClaimantKind::Town,
                id,
                recorded,
                actual,
            });
        }
    }
    for id in missing_towns {
        warn!("cells attributed to unknown town {}", id);
    }
    mismatches
}

/// Rewrite each mismatched counter to the audited value and persist it.
pub fn repair_counts(claims: &ClaimCache, mismatches: &[CountMismatch]) -> usize {
    let mut repaired = 0;
    for m in mismatches {
        match m.kind {
            ClaimantKind::Player => {
                let handle = claims.get_player_claim(m.id);
                write(&handle).chunk_count = m.actual;
                claims.save_player(&handle);
            }
            ClaimantKind::Town => {
                let Some(handle) = claims.get_town_claim(m.id) else {
                    continue;
                };
                write(&handle).chunk_count = m.actual;
                claims.save_town(&handle);
            }
        }
        info!(
            "repaired {:?} {} chunk count {} -> {}",
            m.kind, m.id, m.recorded, m.actual
        );
        repaired += 1;
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::cache::CacheSettings;
    use crate::claims::storage::ClaimStoreBuilder;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn drift_is_reported_and_repaired() {
        let dir = TempDir::new().expect("tempdir");
        let store = ClaimStoreBuilder::new(dir.path()).open().expect("store");
        let claims = ClaimCache::new(Arc::new(store), CacheSettings::default());
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        write(&claims.get_player_claim(bob)).chunk_count = 3;

        let cells = vec![CellOwnership::owned_by(alice), CellOwnership::owned_by(alice)];
        let found = audit_counts(&claims, &cells, &[bob], &[]);
        assert_eq!(found.len(), 2);
        assert!(found.contains(&CountMismatch {
            kind: ClaimantKind::Player,
            id: alice,
            recorded: 0,
            actual: 2,
        }));

        assert_eq!(repair_counts(&claims, &found), 2);
        assert!(audit_counts(&claims, &cells, &[bob], &[]).is_empty());
        assert_eq!(read(&claims.get_player_claim(bob)).chunk_count, 0);
    }
}
