use std::path::{Path, PathBuf};

use sled::IVec;
use uuid::Uuid;

use crate::claims::claimant::{ClaimantKind, ClaimantPlayer, ClaimantTown};
use crate::claims::errors::ClaimError;
use crate::claims::types::{
    CellCoord, CellOwnership, CELL_SCHEMA_VERSION, PLAYER_SCHEMA_VERSION, TOWN_SCHEMA_VERSION,
};

const TREE_CLAIMANTS: &str = "claimants";
const TREE_CELLS: &str = "cells";

/// Key-value persistence consumed by the claim cache.
///
/// Implementations serialize their own writes per claimant id.
pub trait ClaimPersistence: Send + Sync {
    fn load_player(&self, id: Uuid) -> Result<Option<ClaimantPlayer>, ClaimError>;
    fn save_player(&self, player: &ClaimantPlayer) -> Result<(), ClaimError>;
    fn load_town(&self, id: Uuid) -> Result<Option<ClaimantTown>, ClaimError>;
    fn save_town(&self, town: &ClaimantTown) -> Result<(), ClaimError>;
    fn delete_town(&self, id: Uuid) -> Result<(), ClaimError>;
    fn exists(&self, kind: ClaimantKind, id: Uuid) -> Result<bool, ClaimError>;
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct ClaimStoreBuilder {
    path: PathBuf,
}

impl ClaimStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> Result<ClaimStore, ClaimError> {
        std::fs::create_dir_all(&self.path)?;
        let db = sled::Config::new().path(&self.path).open()?;
        ClaimStore::from_db(db)
    }
}

/// Sled-backed persistence for claimant records and cell ownership.
pub struct ClaimStore {
    db: sled::Db,
    claimants: sled::Tree,
    cells: sled::Tree,
}

impl ClaimStore {
    /// Open (or create) the claim store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ClaimError> {
        ClaimStoreBuilder::new(path.as_ref()).open()
    }

    fn from_db(db: sled::Db) -> Result<Self, ClaimError> {
        let claimants = db.open_tree(TREE_CLAIMANTS)?;
        let cells = db.open_tree(TREE_CELLS)?;
        Ok(Self {
            db,
            claimants,
            cells,
        })
    }

    fn claimant_key(kind: ClaimantKind, id: Uuid) -> Vec<u8> {
        match kind {
            ClaimantKind::Player => format!("players:{}", id),
            ClaimantKind::Town => format!("towns:{}", id),
        }
        .into_bytes()
    }

    fn cell_key(coord: CellCoord) -> Vec<u8> {
        format!("cells:{}:{}", coord.x, coord.z).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ClaimError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, ClaimError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    fn check_schema(entity: &'static str, expected: u8, found: u8) -> Result<(), ClaimError> {
        if expected != found {
            return Err(ClaimError::SchemaMismatch {
                entity,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// List the ids of every persisted claimant of `kind`.
    pub fn list_ids(&self, kind: ClaimantKind) -> Result<Vec<Uuid>, ClaimError> {
        let prefix = match kind {
            ClaimantKind::Player => "players:",
            ClaimantKind::Town => "towns:",
        };
        let mut ids = Vec::new();
        for entry in self.claimants.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(id) = text.strip_prefix(prefix).and_then(|s| Uuid::parse_str(s).ok()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Persist one cell record. Wilderness cells are removed instead of stored.
    pub fn put_cell(&self, coord: CellCoord, cell: &CellOwnership) -> Result<(), ClaimError> {
        let key = Self::cell_key(coord);
        if cell.is_wilderness() && !cell.has_slices() {
            self.cells.remove(key)?;
            return Ok(());
        }
        let bytes = Self::serialize(&(CELL_SCHEMA_VERSION, coord, cell))?;
        self.cells.insert(key, bytes)?;
        Ok(())
    }

    pub fn get_cell(&self, coord: CellCoord) -> Result<Option<CellOwnership>, ClaimError> {
        let Some(bytes) = self.cells.get(Self::cell_key(coord))? else {
            return Ok(None);
        };
        let (version, _, cell): (u8, CellCoord, CellOwnership) = Self::deserialize(bytes)?;
        Self::check_schema("cell", CELL_SCHEMA_VERSION, version)?;
        Ok(Some(cell))
    }

    /// Every persisted cell record.
    pub fn list_cells(&self) -> Result<Vec<(CellCoord, CellOwnership)>, ClaimError> {
        let mut cells = Vec::new();
        for entry in self.cells.scan_prefix(b"cells:") {
            let (_, bytes) = entry?;
            let (version, coord, cell): (u8, CellCoord, CellOwnership) =
                Self::deserialize(bytes)?;
            Self::check_schema("cell", CELL_SCHEMA_VERSION, version)?;
            cells.push((coord, cell));
        }
        Ok(cells)
    }

    pub fn flush(&self) -> Result<(), ClaimError> {
        self.db.flush()?;
        Ok(())
    }
}

impl ClaimPersistence for ClaimStore {
    fn load_player(&self, id: Uuid) -> Result<Option<ClaimantPlayer>, ClaimError> {
        let key = Self::claimant_key(ClaimantKind::Player, id);
        let Some(bytes) = self.claimants.get(&key)? else {
            return Ok(None);
        };
        let record: ClaimantPlayer = Self::deserialize(bytes)?;
        Self::check_schema("player", PLAYER_SCHEMA_VERSION, record.schema_version)?;
        Ok(Some(record))
    }

    fn save_player(&self, player: &ClaimantPlayer) -> Result<(), ClaimError> {
        let key = Self::claimant_key(ClaimantKind::Player, player.core.id);
        let bytes = Self::serialize(player)?;
        self.claimants.insert(key, bytes)?;
        Ok(())
    }

    fn load_town(&self, id: Uuid) -> Result<Option<ClaimantTown>, ClaimError> {
        let key = Self::claimant_key(ClaimantKind::Town, id);
        let Some(bytes) = self.claimants.get(&key)? else {
            return Ok(None);
        };
        let record: ClaimantTown = Self::deserialize(bytes)?;
        Self::check_schema("town", TOWN_SCHEMA_VERSION, record.schema_version)?;
        Ok(Some(record))
    }

    fn save_town(&self, town: &ClaimantTown) -> Result<(), ClaimError> {
        let key = Self::claimant_key(ClaimantKind::Town, town.core.id);
        let bytes = Self::serialize(town)?;
        self.claimants.insert(key, bytes)?;
        Ok(())
    }

    fn delete_town(&self, id: Uuid) -> Result<(), ClaimError> {
        self.claimants
            .remove(Self::claimant_key(ClaimantKind::Town, id))?;
        Ok(())
    }

    fn exists(&self, kind: ClaimantKind, id: Uuid) -> Result<bool, ClaimError> {
        Ok(self.claimants.contains_key(Self::claimant_key(kind, id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::claimant::Claimant;
    use crate::claims::types::{ClaimPermission, ClaimSetting, Rank};
    use tempfile::TempDir;

    #[test]
    fn player_round_trip_keeps_tables() {
        let dir = TempDir::new().expect("tempdir");
        let store = ClaimStoreBuilder::new(dir.path()).open().expect("store");
        let friend = Uuid::new_v4();
        let mut player = ClaimantPlayer::new(Uuid::new_v4(), 32);
        player.set_name("Alice");
        player.set_rank(friend, Rank::Ally);
        player.set_setting(ClaimSetting::FireSpread, true);
        player.set_permission_rank(ClaimPermission::Storage, Rank::Owner);
        player.chunk_count = 3;
        store.save_player(&player).expect("save");

        let fetched = store
            .load_player(player.id())
            .expect("load")
            .expect("present");
        assert_eq!(fetched.name(), "Alice");
        assert_eq!(fetched.chunk_count, 3);
        assert_eq!(fetched.chunk_limit, 32);
        assert_eq!(fetched.friend_rank(friend), Some(Rank::Ally));
        assert_eq!(fetched.setting_override(ClaimSetting::FireSpread), Some(true));
        assert_eq!(fetched.required_rank(ClaimPermission::Storage), Rank::Owner);
        assert!(store
            .exists(ClaimantKind::Player, player.id())
            .expect("exists"));
        assert!(!store.exists(ClaimantKind::Town, player.id()).expect("exists"));
    }

    #[test]
    fn missing_records_load_as_none() {
        let dir = TempDir::new().expect("tempdir");
        let store = ClaimStoreBuilder::new(dir.path()).open().expect("store");
        assert!(store.load_player(Uuid::new_v4()).expect("load").is_none());
        assert!(store.load_town(Uuid::new_v4()).expect("load").is_none());
    }

    #[test]
    fn town_delete_and_listing() {
        let dir = TempDir::new().expect("tempdir");
        let store = ClaimStoreBuilder::new(dir.path()).open().expect("store");
        let town = ClaimantTown::new(Uuid::new_v4(), "Hollow", Uuid::new_v4(), 64);
        store.save_town(&town).expect("save");
        assert_eq!(store.list_ids(ClaimantKind::Town).expect("list"), vec![town.id()]);
        store.delete_town(town.id()).expect("delete");
        assert!(store.list_ids(ClaimantKind::Town).expect("list").is_empty());
    }

    #[test]
    fn wilderness_cells_are_not_stored() {
        let dir = TempDir::new().expect("tempdir");
        let store = ClaimStoreBuilder::new(dir.path()).open().expect("store");
        let coord = CellCoord::new(4, -2);
        let owner = Uuid::new_v4();
        store
            .put_cell(coord, &CellOwnership::owned_by(owner))
            .expect("put");
        assert_eq!(
            store.get_cell(coord).expect("get").and_then(|c| c.owner_id()),
            Some(owner)
        );
        store
            .put_cell(coord, &CellOwnership::default())
            .expect("clear");
        assert!(store.get_cell(coord).expect("get").is_none());
        assert!(store.list_cells().expect("list").is_empty());
    }
}
