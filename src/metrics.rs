//! Process-wide claim counters.
//! Cheap relaxed atomics; read them through [`snapshot`].
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static CACHE_EVICTIONS: AtomicU64 = AtomicU64::new(0);
static PERSISTENCE_FAILURES: AtomicU64 = AtomicU64::new(0);
static PERMISSION_ALLOWED: AtomicU64 = AtomicU64::new(0);
static PERMISSION_DENIED: AtomicU64 = AtomicU64::new(0);
static CELLS_CLAIMED: AtomicU64 = AtomicU64::new(0);
static CELLS_UNCLAIMED: AtomicU64 = AtomicU64::new(0);
static CELLS_SKIPPED: AtomicU64 = AtomicU64::new(0);
static BATCHES_COMPLETED: AtomicU64 = AtomicU64::new(0);
static BATCHES_FAILED: AtomicU64 = AtomicU64::new(0);
static BATCHES_CANCELLED: AtomicU64 = AtomicU64::new(0);

pub fn inc_cache_hit() {
    CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_cache_miss() {
    CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}
pub fn add_cache_evictions(n: u64) {
    CACHE_EVICTIONS.fetch_add(n, Ordering::Relaxed);
}
pub fn inc_persistence_failure() {
    PERSISTENCE_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_permission_allowed() {
    PERMISSION_ALLOWED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_permission_denied() {
    PERMISSION_DENIED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_cells_claimed() {
    CELLS_CLAIMED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_cells_unclaimed() {
    CELLS_UNCLAIMED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_cells_skipped() {
    CELLS_SKIPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_batch_completed() {
    BATCHES_COMPLETED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_batch_failed() {
    BATCHES_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_batch_cancelled() {
    BATCHES_CANCELLED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub persistence_failures: u64,
    pub permission_allowed: u64,
    pub permission_denied: u64,
    pub cells_claimed: u64,
    pub cells_unclaimed: u64,
    pub cells_skipped: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub batches_cancelled: u64,
}

impl Snapshot {
    /// Share of lookups served from the cache, if any happened.
    pub fn cache_hit_ratio(&self) -> Option<f64> {
        let total = self.cache_hits + self.cache_misses;
        if total > 0 {
            Some(self.cache_hits as f64 / total as f64)
        } else {
            None
        }
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        cache_hits: CACHE_HITS.load(Ordering::Relaxed),
        cache_misses: CACHE_MISSES.load(Ordering::Relaxed),
        cache_evictions: CACHE_EVICTIONS.load(Ordering::Relaxed),
        persistence_failures: PERSISTENCE_FAILURES.load(Ordering::Relaxed),
        permission_allowed: PERMISSION_ALLOWED.load(Ordering::Relaxed),
        permission_denied: PERMISSION_DENIED.load(Ordering::Relaxed),
        cells_claimed: CELLS_CLAIMED.load(Ordering::Relaxed),
        cells_unclaimed: CELLS_UNCLAIMED.load(Ordering::Relaxed),
        cells_skipped: CELLS_SKIPPED.load(Ordering::Relaxed),
        batches_completed: BATCHES_COMPLETED.load(Ordering::Relaxed),
        batches_failed: BATCHES_FAILED.load(Ordering::Relaxed),
        batches_cancelled: BATCHES_CANCELLED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are global and tests run in parallel, so only check monotonic growth.
    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_cells_claimed();
        add_cache_evictions(3);
        let after = snapshot();
        assert!(after.cells_claimed > before.cells_claimed);
        assert!(after.cache_evictions >= before.cache_evictions + 3);
    }

    #[test]
    fn hit_ratio_needs_lookups() {
        let empty = Snapshot::default();
        assert_eq!(empty.cache_hit_ratio(), None);
        let snap = Snapshot {
            cache_hits: 3,
            cache_misses: 1,
            ..Snapshot::default()
        };
        assert_eq!(snap.cache_hit_ratio(), Some(0.75));
    }
}
