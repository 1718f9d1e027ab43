//! Snapshot cache with explicit invalidation
//!
//! Keyed by (entity id, account-or-none). `put` is unconditional
//! last-write-wins; concurrent refreshes for one key are expected to be
//! idempotent and convergent, not ordered. `invalidate` marks the entry
//! stale so the next lookup re-runs the orchestrator instead of serving
//! the old value.

use crate::domain::entity::Snapshot;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SnapshotKey = (String, Option<String>);

pub fn snapshot_key(entity_id: &str, account: Option<&str>) -> SnapshotKey {
    (entity_id.to_string(), account.map(str::to_string))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Snapshot,
    stale: bool,
}

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(Snapshot),
    /// Entry exists but was invalidated; callers must refresh
    StaleHit(Snapshot),
    Missing,
}

/// Shared keyed store of entity snapshots. The only shared mutable
/// resource in the engine.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    inner: Arc<RwLock<HashMap<SnapshotKey, CacheEntry>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &SnapshotKey) -> CacheLookup {
        let entries = self.inner.read().await;
        match entries.get(key) {
            Some(entry) if entry.stale => CacheLookup::StaleHit(entry.snapshot.clone()),
            Some(entry) => CacheLookup::Hit(entry.snapshot.clone()),
            None => CacheLookup::Missing,
        }
    }

    /// Latest snapshot regardless of staleness, for last-known substitution
    pub async fn last_known(&self, key: &SnapshotKey) -> Option<Snapshot> {
        let entries = self.inner.read().await;
        entries.get(key).map(|entry| entry.snapshot.clone())
    }

    /// Replace unconditionally; the key is derived from the snapshot itself
    pub async fn put(&self, snapshot: Snapshot) {
        let key = (snapshot.entity_id.clone(), snapshot.account.clone());
        let mut entries = self.inner.write().await;
        entries.insert(key, CacheEntry { snapshot, stale: false });
    }

    /// Mark the entry stale. A missing key is a no-op.
    pub async fn invalidate(&self, key: &SnapshotKey) {
        let mut entries = self.inner.write().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.stale = true;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
