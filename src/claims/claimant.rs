//! Claimant records: players and towns that can own cells.
//!
//! Both kinds share a [`ClaimantCore`] (identity, name, friend ranks and
//! setting overrides) and expose it through the [`Claimant`] trait. Live
//! instances are shared through [`PlayerHandle`] / [`TownHandle`] so the
//! cache, the resolver and running batches all see one copy per id.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claims::errors::ClaimError;
use crate::claims::types::{
    ClaimPermission, ClaimSetting, Rank, PLAYER_SCHEMA_VERSION, TOWN_SCHEMA_VERSION,
};

pub type PlayerHandle = Arc<RwLock<ClaimantPlayer>>;
pub type TownHandle = Arc<RwLock<ClaimantTown>>;

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClaimantKind {
    Player,
    Town,
}

/// State shared by every claimant kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimantCore {
    pub id: Uuid,
    name: String,
    #[serde(default)]
    friends: HashMap<Uuid, Rank>,
    #[serde(default)]
    settings: HashMap<ClaimSetting, bool>,
    pub updated_at: DateTime<Utc>,
}

impl ClaimantCore {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            friends: HashMap::new(),
            settings: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Common behaviour of players and towns.
pub trait Claimant {
    fn core(&self) -> &ClaimantCore;
    fn core_mut(&mut self) -> &mut ClaimantCore;
    fn kind(&self) -> ClaimantKind;

    fn id(&self) -> Uuid {
        self.core().id
    }

    /// Display name; falls back to the short id when none was ever set.
    fn name(&self) -> String {
        let core = self.core();
        if core.name.trim().is_empty() {
            core.id.simple().to_string()[..8].to_string()
        } else {
            core.name.clone()
        }
    }

    fn set_name(&mut self, name: &str) {
        let core = self.core_mut();
        core.name = name.trim().to_string();
        core.touch();
    }

    /// Explicit rank granted to `player`, if any.
    fn friend_rank(&self, player: Uuid) -> Option<Rank> {
        self.core().friends.get(&player).copied()
    }

    /// Rank `player` holds here: the claimant itself is `Owner`, explicit
    /// grants apply next, everyone else is `Enemy`.
    fn rank_of(&self, player: Uuid) -> Rank {
        if player == self.id() {
            return Rank::Owner;
        }
        self.friend_rank(player).unwrap_or(Rank::Enemy)
    }

    fn set_rank(&mut self, player: Uuid, rank: Rank) {
        let core = self.core_mut();
        core.friends.insert(player, rank);
        core.touch();
    }

    fn remove_friend(&mut self, player: Uuid) -> Option<Rank> {
        let core = self.core_mut();
        let removed = core.friends.remove(&player);
        core.touch();
        removed
    }

    fn friends(&self) -> &HashMap<Uuid, Rank> {
        &self.core().friends
    }

    /// Explicit override for `setting`; `None` means "use the default".
    fn setting_override(&self, setting: ClaimSetting) -> Option<bool> {
        self.core().settings.get(&setting).copied()
    }

    fn set_setting(&mut self, setting: ClaimSetting, value: bool) {
        let core = self.core_mut();
        core.settings.insert(setting, value);
        core.touch();
    }

    fn clear_setting(&mut self, setting: ClaimSetting) -> Option<bool> {
        let core = self.core_mut();
        let removed = core.settings.remove(&setting);
        core.touch();
        removed
    }

    fn settings(&self) -> &HashMap<ClaimSetting, bool> {
        &self.core().settings
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimantPlayer {
    pub schema_version: u8,
    pub core: ClaimantCore,
    pub chunk_count: u32,
    pub chunk_limit: u32,
    pub town_id: Option<Uuid>,
    #[serde(default)]
    permission_ranks: HashMap<ClaimPermission, Rank>,
}

impl ClaimantPlayer {
    pub fn new(id: Uuid, chunk_limit: u32) -> Self {
        Self {
            schema_version: PLAYER_SCHEMA_VERSION,
            core: ClaimantCore::new(id, ""),
            chunk_count: 0,
            chunk_limit,
            town_id: None,
            permission_ranks: HashMap::new(),
        }
    }

    /// Minimum rank required for `permission` on this player's cells.
    pub fn required_rank(&self, permission: ClaimPermission) -> Rank {
        self.permission_ranks
            .get(&permission)
            .copied()
            .unwrap_or_else(|| permission.default_rank())
    }

    pub fn set_permission_rank(&mut self, permission: ClaimPermission, rank: Rank) {
        self.permission_ranks.insert(permission, rank);
        self.core.touch();
    }

    pub fn reset_permission_rank(&mut self, permission: ClaimPermission) {
        self.permission_ranks.remove(&permission);
        self.core.touch();
    }

    pub fn has_capacity(&self) -> bool {
        self.chunk_count < self.chunk_limit
    }

    pub fn increment_chunks(&mut self) {
        self.chunk_count = self.chunk_count.saturating_add(1);
        self.core.touch();
    }

    pub fn decrement_chunks(&mut self) {
        self.chunk_count = self.chunk_count.saturating_sub(1);
        self.core.touch();
    }
}

impl Claimant for ClaimantPlayer {
    fn core(&self) -> &ClaimantCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClaimantCore {
        &mut self.core
    }

    fn kind(&self) -> ClaimantKind {
        ClaimantKind::Player
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimantTown {
    pub schema_version: u8,
    pub core: ClaimantCore,
    pub owner_id: Uuid,
    members: BTreeSet<Uuid>,
    tax_rate: u8,
    pub chunk_count: u32,
    pub chunk_limit: u32,
}

impl ClaimantTown {
    pub fn new(id: Uuid, name: &str, owner_id: Uuid, chunk_limit: u32) -> Self {
        let mut members = BTreeSet::new();
        members.insert(owner_id);
        Self {
            schema_version: TOWN_SCHEMA_VERSION,
            core: ClaimantCore::new(id, name.trim()),
            owner_id,
            members,
            tax_rate: 0,
            chunk_count: 0,
            chunk_limit,
        }
    }

    pub fn is_member(&self, player: Uuid) -> bool {
        player == self.owner_id || self.members.contains(&player)
    }

    pub fn members(&self) -> impl Iterator<Item = &Uuid> {
        self.members.iter()
    }

    pub fn add_member(&mut self, player: Uuid) -> bool {
        let added = self.members.insert(player);
        self.core.touch();
        added
    }

    /// Remove a member. The owner cannot leave their own town.
    pub fn remove_member(&mut self, player: Uuid) -> Result<(), ClaimError> {
        if player == self.owner_id || !self.members.remove(&player) {
            return Err(ClaimError::NotTownMember(player));
        }
        self.core.touch();
        Ok(())
    }

    pub fn tax_rate(&self) -> u8 {
        self.tax_rate
    }

    pub fn set_tax_rate(&mut self, rate: u8) -> Result<(), ClaimError> {
        if rate > 100 {
            return Err(ClaimError::InvalidTaxRate(rate));
        }
        self.tax_rate = rate;
        self.core.touch();
        Ok(())
    }

    pub fn has_capacity(&self) -> bool {
        self.chunk_count < self.chunk_limit
    }

    pub fn increment_chunks(&mut self) {
        self.chunk_count = self.chunk_count.saturating_add(1);
        self.core.touch();
    }

    pub fn decrement_chunks(&mut self) {
        self.chunk_count = self.chunk_count.saturating_sub(1);
        self.core.touch();
    }
}

impl Claimant for ClaimantTown {
    fn core(&self) -> &ClaimantCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClaimantCore {
        &mut self.core
    }

    fn kind(&self) -> ClaimantKind {
        ClaimantKind::Town
    }
}

/// The claimant a batch operation acts for.
#[derive(Debug, Clone)]
pub enum ClaimTarget {
    Player(PlayerHandle),
    Town(TownHandle),
}

impl ClaimTarget {
    pub fn id(&self) -> Uuid {
        match self {
            ClaimTarget::Player(handle) => read(handle).id(),
            ClaimTarget::Town(handle) => read(handle).id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            ClaimTarget::Player(handle) => read(handle).name(),
            ClaimTarget::Town(handle) => read(handle).name(),
        }
    }

    pub fn kind(&self) -> ClaimantKind {
        match self {
            ClaimTarget::Player(_) => ClaimantKind::Player,
            ClaimTarget::Town(_) => ClaimantKind::Town,
        }
    }
}
