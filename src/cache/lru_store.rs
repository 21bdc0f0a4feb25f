use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use crate::cache::cache_trait::{CacheEntry, CacheStore, EntryPredicate};
use crate::engine::descriptor::CacheKey;
use crate::utils::error::{EngineError, EngineResult};

/// Bounded store that evicts the least recently used entry at capacity.
///
/// A read counts as a use. All operations take one lock, so per-key
/// atomicity holds trivially.
pub struct LruCacheStore {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    capacity: NonZeroUsize,
}

impl LruCacheStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
        }
    }

    /// Create a store from a plain capacity, rejecting zero
    pub fn with_capacity(capacity: usize) -> EngineResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            EngineError::Configuration("cache capacity must be greater than zero".to_string())
        })?;
        Ok(Self::new(capacity))
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

#[async_trait]
impl CacheStore for LruCacheStore {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut entries = self.entries.lock().await;
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                tracing::debug!(cache_key = %evicted, "evicted least recently used entry");
            }
        }
    }

    async fn remove(&self, key: &CacheKey) -> bool {
        self.entries.lock().await.pop(key).is_some()
    }

    async fn remove_where(&self, predicate: EntryPredicate<'_>) -> usize {
        let mut entries = self.entries.lock().await;
        let matching: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, entry)| predicate(key, entry))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &matching {
            entries.pop(key);
        }
        matching.len()
    }

    async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
