//! Shared fixtures for integration tests.

use std::sync::Arc;

use landclaim::claims::{CacheSettings, ClaimCache, ClaimStore, ClaimStoreBuilder};
use tempfile::TempDir;

/// Throwaway store plus a cache over it. Keep the `TempDir` alive for the
/// duration of the test.
pub fn claims_with(settings: CacheSettings) -> (TempDir, Arc<ClaimStore>, ClaimCache) {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(ClaimStoreBuilder::new(dir.path()).open().expect("store"));
    let claims = ClaimCache::new(store.clone(), settings);
    (dir, store, claims)
}

#[allow(dead_code)] // Not every test file needs default settings.
pub fn claims() -> (TempDir, Arc<ClaimStore>, ClaimCache) {
    claims_with(CacheSettings::default())
}
