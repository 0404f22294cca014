//! Claimant registry.
//!
//! One [`ClaimCache`] is constructed per running world and passed by
//! reference to everything that needs claimants. The index sits behind a
//! single mutex; construction of a missing claimant happens while that lock
//! is held, so two racing lookups for the same id always share one instance.
//!
//! Entries are evicted by [`ClaimCache::evict_idle`] once nothing outside the
//! cache holds the handle and the entry has been idle past the timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::claims::claimant::{
    read, write, Claimant, ClaimTarget, ClaimantKind, ClaimantPlayer, ClaimantTown, PlayerHandle,
    TownHandle,
};
use crate::claims::errors::ClaimError;
use crate::claims::storage::ClaimPersistence;
use crate::claims::types::Feature;
use crate::logutil::escape_log;
use crate::metrics;

/// Maximum attempts at drawing an unused town id before giving up.
const TOWN_ID_ATTEMPTS: usize = 16;

/// Tunables for the cache, usually derived from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub claims_enabled: bool,
    pub spawn_id: Uuid,
    pub default_chunk_limit: u32,
    pub default_town_chunk_limit: u32,
    pub idle_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            claims_enabled: true,
            spawn_id: Uuid::nil(),
            default_chunk_limit: 64,
            default_town_chunk_limit: 256,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Runtime switches for features that own claim settings.
#[derive(Debug)]
pub struct FeatureFlags {
    grief_protection: AtomicBool,
    fire_protection: AtomicBool,
    combat_protection: AtomicBool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            grief_protection: AtomicBool::new(true),
            fire_protection: AtomicBool::new(true),
            combat_protection: AtomicBool::new(true),
        }
    }
}

impl FeatureFlags {
    fn flag(&self, feature: Feature) -> &AtomicBool {
        match feature {
            Feature::GriefProtection => &self.grief_protection,
            Feature::FireProtection => &self.fire_protection,
            Feature::CombatProtection => &self.combat_protection,
        }
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.flag(feature).load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, feature: Feature, enabled: bool) {
        self.flag(feature).store(enabled, Ordering::Relaxed);
        info!("feature {:?} {}", feature, if enabled { "enabled" } else { "disabled" });
    }
}

struct CacheEntry<T> {
    handle: Arc<RwLock<T>>,
    last_access: Instant,
}

impl<T> CacheEntry<T> {
    fn new(handle: Arc<RwLock<T>>) -> Self {
        Self {
            handle,
            last_access: Instant::now(),
        }
    }

    fn touch(&mut self) -> Arc<RwLock<T>> {
        self.last_access = Instant::now();
        self.handle.clone()
    }

    fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        Arc::strong_count(&self.handle) == 1
            && now.saturating_duration_since(self.last_access) >= timeout
    }
}

fn take_idle<T>(
    entries: &mut HashMap<Uuid, CacheEntry<T>>,
    now: Instant,
    timeout: Duration,
) -> Vec<Arc<RwLock<T>>> {
    let idle: Vec<Uuid> = entries
        .iter()
        .filter(|(_, entry)| entry.is_idle(now, timeout))
        .map(|(id, _)| *id)
        .collect();
    idle.iter()
        .filter_map(|id| entries.remove(id))
        .map(|entry| entry.handle)
        .collect()
}

#[derive(Default)]
struct CacheIndex {
    players: HashMap<Uuid, CacheEntry<ClaimantPlayer>>,
    towns: HashMap<Uuid, CacheEntry<ClaimantTown>>,
}

pub struct ClaimCache {
    store: Arc<dyn ClaimPersistence>,
    settings: CacheSettings,
    features: FeatureFlags,
    index: Mutex<CacheIndex>,
}

impl ClaimCache {
    pub fn new(store: Arc<dyn ClaimPersistence>, settings: CacheSettings) -> Self {
        Self {
            store,
            settings,
            features: FeatureFlags::default(),
            index: Mutex::new(CacheIndex::default()),
        }
    }

    fn index(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn features(&self) -> &FeatureFlags {
        &self.features
    }

    pub fn spawn_id(&self) -> Uuid {
        self.settings.spawn_id
    }

    pub fn is_spawn(&self, id: Uuid) -> bool {
        id == self.settings.spawn_id
    }

    /// Cached player claimant for `id`, loading or creating it on first use.
    ///
    /// Never fails: a missing record yields a fresh default instance, and an
    /// unreadable record is logged and replaced by one.
    ///
    /// The store is read without holding the index lock; when two callers
    /// race on a cold id the first insert wins and both get that handle.
    pub fn get_player_claim(&self, id: Uuid) -> PlayerHandle {
        if let Some(entry) = self.index().players.get_mut(&id) {
            metrics::inc_cache_hit();
            return entry.touch();
        }
        metrics::inc_cache_miss();
        let player = match self.store.load_player(id) {
            Ok(Some(player)) => player,
            Ok(None) => {
                debug!("no claim record for player {}, creating default", id);
                ClaimantPlayer::new(id, self.settings.default_chunk_limit)
            }
            Err(e) => {
                warn!("failed to load claim record for player {}: {} (using defaults)", id, e);
                ClaimantPlayer::new(id, self.settings.default_chunk_limit)
            }
        };
        self.index()
            .players
            .entry(id)
            .or_insert_with(|| CacheEntry::new(Arc::new(RwLock::new(player))))
            .touch()
    }

    /// Cached town claimant, or `None` when claims are disabled or no town
    /// record exists for `id`.
    pub fn get_town_claim(&self, id: Uuid) -> Option<TownHandle> {
        if !self.settings.claims_enabled {
            return None;
        }
        if let Some(entry) = self.index().towns.get_mut(&id) {
            metrics::inc_cache_hit();
            return Some(entry.touch());
        }
        metrics::inc_cache_miss();
        match self.store.load_town(id) {
            Ok(Some(town)) => Some(
                self.index()
                    .towns
                    .entry(id)
                    .or_insert_with(|| CacheEntry::new(Arc::new(RwLock::new(town))))
                    .touch(),
            ),
            Ok(None) => None,
            Err(e) => {
                warn!("failed to load town record {}: {}", id, e);
                None
            }
        }
    }

    /// Found a new town owned by `founder`, persist it and register it.
    pub fn make_town_claim(&self, founder: Uuid, name: &str) -> Result<TownHandle, ClaimError> {
        if !self.settings.claims_enabled {
            return Err(ClaimError::ClaimsDisabled);
        }
        let founder_handle = self.get_player_claim(founder);
        if read(&founder_handle).town_id.is_some() {
            return Err(ClaimError::AlreadyInTown(founder));
        }

        let id = self.allocate_town_id()?;
        let town = ClaimantTown::new(id, name, founder, self.settings.default_town_chunk_limit);
        self.store.save_town(&town)?;
        let handle = Arc::new(RwLock::new(town));
        self.add_to_cache(ClaimTarget::Town(handle.clone()));

        write(&founder_handle).town_id = Some(id);
        self.save_player(&founder_handle);
        info!(
            "town {} ({}) founded by {}",
            escape_log(name),
            id,
            founder
        );
        Ok(handle)
    }

    fn allocate_town_id(&self) -> Result<Uuid, ClaimError> {
        for _ in 0..TOWN_ID_ATTEMPTS {
            let candidate = Uuid::new_v4();
            let cached = self.index().towns.contains_key(&candidate);
            if !cached && !self.store.exists(ClaimantKind::Town, candidate)? {
                return Ok(candidate);
            }
        }
        Err(ClaimError::Internal(
            "could not allocate an unused town id".to_string(),
        ))
    }

    /// Register an already-constructed claimant, replacing any cached one.
    pub fn add_to_cache(&self, claimant: ClaimTarget) {
        let mut index = self.index();
        match claimant {
            ClaimTarget::Player(handle) => {
                let id = read(&handle).id();
                index.players.insert(id, CacheEntry::new(handle));
            }
            ClaimTarget::Town(handle) => {
                let id = read(&handle).id();
                index.towns.insert(id, CacheEntry::new(handle));
            }
        }
    }

    /// Forget a cached claimant. Persisted data is untouched.
    pub fn remove_from_cache(&self, kind: ClaimantKind, id: Uuid) -> bool {
        let mut index = self.index();
        match kind {
            ClaimantKind::Player => index.players.remove(&id).is_some(),
            ClaimantKind::Town => index.towns.remove(&id).is_some(),
        }
    }

    pub fn is_cached(&self, kind: ClaimantKind, id: Uuid) -> bool {
        let index = self.index();
        match kind {
            ClaimantKind::Player => index.players.contains_key(&id),
            ClaimantKind::Town => index.towns.contains_key(&id),
        }
    }

    pub fn cached_len(&self) -> usize {
        let index = self.index();
        index.players.len() + index.towns.len()
    }

    /// Drop entries nobody else references that have been idle past the
    /// configured timeout, saving each one on the way out. Returns how many
    /// were evicted.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let timeout = self.settings.idle_timeout;
        let (players, towns) = {
            let mut index = self.index();
            (
                take_idle(&mut index.players, now, timeout),
                take_idle(&mut index.towns, now, timeout),
            )
        };
        for player in &players {
            self.save_player(player);
        }
        for town in &towns {
            self.save_town(town);
        }
        let evicted = players.len() + towns.len();
        if evicted > 0 {
            debug!("evicted {} idle claimants", evicted);
            metrics::add_cache_evictions(evicted as u64);
        }
        evicted
    }

    /// Persist a player. Failures are logged; in-memory state stays
    /// authoritative and the next save retries.
    pub fn save_player(&self, handle: &PlayerHandle) {
        let player = read(handle);
        if let Err(e) = self.store.save_player(&player) {
            metrics::inc_persistence_failure();
            warn!("failed to persist player {}: {}", player.id(), e);
        }
    }

    pub fn save_town(&self, handle: &TownHandle) {
        let town = read(handle);
        if let Err(e) = self.store.save_town(&town) {
            metrics::inc_persistence_failure();
            warn!("failed to persist town {}: {}", town.id(), e);
        }
    }

    pub fn save_target(&self, target: &ClaimTarget) {
        match target {
            ClaimTarget::Player(handle) => self.save_player(handle),
            ClaimTarget::Town(handle) => self.save_town(handle),
        }
    }

    /// Persist every cached claimant.
    pub fn save_all(&self) {
        let (players, towns): (Vec<PlayerHandle>, Vec<TownHandle>) = {
            let index = self.index();
            (
                index.players.values().map(|e| e.handle.clone()).collect(),
                index.towns.values().map(|e| e.handle.clone()).collect(),
            )
        };
        players.iter().for_each(|handle| self.save_player(handle));
        towns.iter().for_each(|handle| self.save_town(handle));
    }

    /// Add `player` to `town_id`.
    pub fn join_town(&self, player: Uuid, town_id: Uuid) -> Result<(), ClaimError> {
        let town = self
            .get_town_claim(town_id)
            .ok_or_else(|| ClaimError::NotFound(format!("town: {}", town_id)))?;
        let player_handle = self.get_player_claim(player);
        if read(&player_handle).town_id.is_some() {
            return Err(ClaimError::AlreadyInTown(player));
        }
        write(&town).add_member(player);
        write(&player_handle).town_id = Some(town_id);
        self.save_town(&town);
        self.save_player(&player_handle);
        Ok(())
    }

    /// Remove `player` from their town. Town owners must dissolve instead.
    pub fn leave_town(&self, player: Uuid) -> Result<(), ClaimError> {
        let player_handle = self.get_player_claim(player);
        let town_id = read(&player_handle)
            .town_id
            .ok_or(ClaimError::NotTownMember(player))?;
        if let Some(town) = self.get_town_claim(town_id) {
            write(&town).remove_member(player)?;
            self.save_town(&town);
        }
        write(&player_handle).town_id = None;
        self.save_player(&player_handle);
        Ok(())
    }

    /// Delete a town whose cells have all been released.
    pub fn dissolve_town(&self, town_id: Uuid) -> Result<(), ClaimError> {
        let town = self
            .get_town_claim(town_id)
            .ok_or_else(|| ClaimError::NotFound(format!("town: {}", town_id)))?;
        let members: Vec<Uuid> = {
            let town = read(&town);
            if town.chunk_count > 0 {
                return Err(ClaimError::TownHasClaims(town_id));
            }
            town.members().copied().collect()
        };
        for member in members {
            let handle = self.get_player_claim(member);
            let mut player = write(&handle);
            if player.town_id == Some(town_id) {
                player.town_id = None;
                drop(player);
                self.save_player(&handle);
            }
        }
        self.store.delete_town(town_id)?;
        self.remove_from_cache(ClaimantKind::Town, town_id);
        info!("town {} dissolved", town_id);
        Ok(())
    }
}
