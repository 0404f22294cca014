use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::claims::errors::ClaimError;

pub const PLAYER_SCHEMA_VERSION: u8 = 1;
pub const TOWN_SCHEMA_VERSION: u8 = 1;
pub const CELL_SCHEMA_VERSION: u8 = 1;

/// Height of one vertical ownership slice in blocks.
pub const SLICE_HEIGHT: i32 = 16;
/// Number of slices stacked in one cell (-64..320 with the default floor).
pub const SLICE_COUNT: usize = 24;
/// Default world floor used when the host does not configure one.
pub const DEFAULT_MIN_Y: i32 = -64;

/// Trust level a claimant grants to another player.
///
/// Declaration order is the total order: `Enemy < Passive < Ally < Owner`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    #[default]
    Enemy,
    Passive,
    Ally,
    Owner,
}

impl Rank {
    pub const ALL: [Rank; 4] = [Rank::Enemy, Rank::Passive, Rank::Ally, Rank::Owner];

    /// True when an actor holding `self` satisfies `required`.
    pub fn can_perform(self, required: Rank) -> bool {
        self >= required
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Enemy => "enemy",
            Rank::Passive => "passive",
            Rank::Ally => "ally",
            Rank::Owner => "owner",
        }
    }

    /// Parse from a string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        Rank::ALL
            .into_iter()
            .find(|rank| rank.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Privileged action categories gated by rank.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPermission {
    Beds,
    Creatures,
    Harvest,
    Blocks,
    Storage,
    Doors,
    Pickup,
    Redstone,
    Riding,
    Warp,
    Trading,
    Crafting,
}

impl ClaimPermission {
    pub const ALL: [ClaimPermission; 12] = [
        ClaimPermission::Beds,
        ClaimPermission::Creatures,
        ClaimPermission::Harvest,
        ClaimPermission::Blocks,
        ClaimPermission::Storage,
        ClaimPermission::Doors,
        ClaimPermission::Pickup,
        ClaimPermission::Redstone,
        ClaimPermission::Riding,
        ClaimPermission::Warp,
        ClaimPermission::Trading,
        ClaimPermission::Crafting,
    ];

    /// Minimum rank required when the owner has not configured one.
    pub fn default_rank(&self) -> Rank {
        match self {
            ClaimPermission::Doors | ClaimPermission::Trading | ClaimPermission::Crafting => {
                Rank::Passive
            }
            ClaimPermission::Beds
            | ClaimPermission::Creatures
            | ClaimPermission::Harvest
            | ClaimPermission::Blocks
            | ClaimPermission::Storage
            | ClaimPermission::Pickup
            | ClaimPermission::Redstone
            | ClaimPermission::Riding
            | ClaimPermission::Warp => Rank::Ally,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimPermission::Beds => "beds",
            ClaimPermission::Creatures => "creatures",
            ClaimPermission::Harvest => "harvest",
            ClaimPermission::Blocks => "blocks",
            ClaimPermission::Storage => "storage",
            ClaimPermission::Doors => "doors",
            ClaimPermission::Pickup => "pickup",
            ClaimPermission::Redstone => "redstone",
            ClaimPermission::Riding => "riding",
            ClaimPermission::Warp => "warp",
            ClaimPermission::Trading => "trading",
            ClaimPermission::Crafting => "crafting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ClaimPermission::ALL
            .into_iter()
            .find(|perm| perm.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for ClaimPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime-toggleable features that own one or more settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    GriefProtection,
    FireProtection,
    CombatProtection,
}

/// Boolean world-behaviour flags resolved per cell owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSetting {
    EndermanGriefing,
    CreeperGriefing,
    FireSpread,
    PlayerCombat,
    CropAutoreplant,
}

impl ClaimSetting {
    pub const ALL: [ClaimSetting; 5] = [
        ClaimSetting::EndermanGriefing,
        ClaimSetting::CreeperGriefing,
        ClaimSetting::FireSpread,
        ClaimSetting::PlayerCombat,
        ClaimSetting::CropAutoreplant,
    ];

    /// The value that means "allowed" for this flag. Town-priority resolution
    /// returns a player's value directly when it already equals this.
    pub fn polarity(&self) -> bool {
        match self {
            ClaimSetting::EndermanGriefing
            | ClaimSetting::CreeperGriefing
            | ClaimSetting::FireSpread
            | ClaimSetting::PlayerCombat
            | ClaimSetting::CropAutoreplant => true,
        }
    }

    pub fn player_default(&self) -> bool {
        match self {
            ClaimSetting::EndermanGriefing => false,
            ClaimSetting::CreeperGriefing => false,
            ClaimSetting::FireSpread => false,
            ClaimSetting::PlayerCombat => false,
            ClaimSetting::CropAutoreplant => true,
        }
    }

    /// Default for cells owned by the spawn claimant, also used for wilderness.
    pub fn spawn_default(&self) -> bool {
        match self {
            ClaimSetting::EndermanGriefing => false,
            ClaimSetting::CreeperGriefing => false,
            ClaimSetting::FireSpread => false,
            ClaimSetting::PlayerCombat => false,
            ClaimSetting::CropAutoreplant => false,
        }
    }

    pub fn feature(&self) -> Option<Feature> {
        match self {
            ClaimSetting::EndermanGriefing | ClaimSetting::CreeperGriefing => {
                Some(Feature::GriefProtection)
            }
            ClaimSetting::FireSpread => Some(Feature::FireProtection),
            ClaimSetting::PlayerCombat => Some(Feature::CombatProtection),
            ClaimSetting::CropAutoreplant => None,
        }
    }

    /// Whether a town may supersede the cell-owning player for this flag.
    pub fn town_overridable(&self) -> bool {
        matches!(self, ClaimSetting::PlayerCombat)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimSetting::EndermanGriefing => "enderman_griefing",
            ClaimSetting::CreeperGriefing => "creeper_griefing",
            ClaimSetting::FireSpread => "fire_spread",
            ClaimSetting::PlayerCombat => "player_combat",
            ClaimSetting::CropAutoreplant => "crop_autoreplant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ClaimSetting::ALL
            .into_iter()
            .find(|setting| setting.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for ClaimSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Horizontal cell coordinate (chunk x/z).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

impl CellCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn neighbours(&self) -> [CellCoord; 4] {
        [
            CellCoord::new(self.x + 1, self.z),
            CellCoord::new(self.x - 1, self.z),
            CellCoord::new(self.x, self.z + 1),
            CellCoord::new(self.x, self.z - 1),
        ]
    }

    /// Parse `x,z` as written on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        let (x, z) = s.split_once(',')?;
        Some(Self::new(x.trim().parse().ok()?, z.trim().parse().ok()?))
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Ownership record attached to one world cell.
///
/// `slice_owners` stays empty until a vertical band is subdivided, so the
/// common record is just the two optional ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellOwnership {
    owner_id: Option<Uuid>,
    town_id: Option<Uuid>,
    #[serde(default)]
    slice_owners: Vec<Option<Uuid>>,
}

impl CellOwnership {
    pub fn owned_by(owner: Uuid) -> Self {
        Self {
            owner_id: Some(owner),
            ..Self::default()
        }
    }

    pub fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }

    pub fn town_id(&self) -> Option<Uuid> {
        self.town_id
    }

    pub fn is_wilderness(&self) -> bool {
        self.owner_id.is_none()
    }

    /// Set owner and town attribution together. A town requires an owner.
    pub fn assign(&mut self, owner: Option<Uuid>, town: Option<Uuid>) -> Result<(), ClaimError> {
        if town.is_some() && owner.is_none() {
            return Err(ClaimError::Internal(
                "town attribution requires a player owner".to_string(),
            ));
        }
        self.owner_id = owner;
        self.town_id = town;
        Ok(())
    }

    pub fn set_town(&mut self, town: Option<Uuid>) -> Result<(), ClaimError> {
        self.assign(self.owner_id, town)
    }

    /// Reset to wilderness, dropping any slice subdivision.
    pub fn clear(&mut self) {
        self.owner_id = None;
        self.town_id = None;
        self.slice_owners.clear();
    }

    /// `None` below `min_y`, above the top slice, or when the offset
    /// does not fit in an `i32`.
    pub fn slice_index(y: i32, min_y: i32) -> Option<usize> {
        let offset = y.checked_sub(min_y).filter(|offset| *offset >= 0)?;
        let index = (offset / SLICE_HEIGHT) as usize;
        (index < SLICE_COUNT).then_some(index)
    }

    /// Give the slice containing `y` its own owner (or reset it with `None`).
    pub fn set_slice_owner(
        &mut self,
        y: i32,
        min_y: i32,
        owner: Option<Uuid>,
    ) -> Result<(), ClaimError> {
        let index = Self::slice_index(y, min_y).ok_or(ClaimError::InvalidSlice(y))?;
        if self.slice_owners.len() < SLICE_COUNT {
            self.slice_owners.resize(SLICE_COUNT, None);
        }
        self.slice_owners[index] = owner;
        if self.slice_owners.iter().all(Option::is_none) {
            self.slice_owners.clear();
        }
        Ok(())
    }

    pub fn clear_slices(&mut self) {
        self.slice_owners.clear();
    }

    pub fn has_slices(&self) -> bool {
        !self.slice_owners.is_empty()
    }

    /// Owner of the block at height `y`: the slice owner when subdivided,
    /// otherwise the cell owner.
    pub fn owner_at(&self, y: i32, min_y: i32) -> Option<Uuid> {
        Self::slice_index(y, min_y)
            .and_then(|index| self.slice_owners.get(index).copied().flatten())
            .or(self.owner_id)
    }
}
