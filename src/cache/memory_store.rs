use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::cache::cache_trait::{CacheEntry, CacheStore, EntryPredicate};
use crate::engine::descriptor::CacheKey;

/// Unbounded in-memory store.
///
/// Reads never block each other; writes are atomic per key. Entries stay
/// until they are invalidated or overwritten.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    async fn put(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    async fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    async fn remove_where(&self, predicate: EntryPredicate<'_>) -> usize {
        let matching: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| predicate(entry.key(), entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        // Re-check under the write lock in case the entry was replaced
        matching
            .iter()
            .filter(|key| self.entries.remove_if(*key, |k, e| predicate(k, e)).is_some())
            .count()
    }

    async fn clear(&self) {
        self.entries.clear();
    }

    async fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::descriptor::QueryDescriptor;
    use crate::utils::types::QueryResult;
    use serde_json::json;

    fn entry_for(operation: &str, value: i64) -> (CacheKey, CacheEntry) {
        let descriptor = QueryDescriptor::new("query { value }", operation).unwrap();
        let key = descriptor.cache_key();
        let entry = CacheEntry::new(descriptor, QueryResult::Success(json!({"value": value})), None);
        (key, entry)
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let store = InMemoryCacheStore::new();
        let (key, first) = entry_for("Value", 1);
        let (_, second) = entry_for("Value", 2);

        assert!(store.get(&key).await.is_none());

        store.put(key.clone(), first).await;
        store.put(key.clone(), second).await;

        let stored = store.get(&key).await.unwrap();
        assert_eq!(stored.result, QueryResult::Success(json!({"value": 2})));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemoryCacheStore::new();
        let (key, entry) = entry_for("Value", 1);

        store.put(key.clone(), entry).await;
        assert!(store.remove(&key).await);
        assert!(!store.remove(&key).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_where_by_operation() {
        let store = InMemoryCacheStore::new();
        for (key, entry) in [entry_for("Feed", 1), entry_for("Profile", 2), entry_for("Settings", 3)] {
            store.put(key, entry).await;
        }

        let removed = store
            .remove_where(&|_: &CacheKey, entry: &CacheEntry| entry.descriptor.operation_name() != "Settings")
            .await;

        assert_eq!(removed, 2);
        assert_eq!(store.len().await, 1);

        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let store = InMemoryCacheStore::new();
        let other = store.clone();
        let (key, entry) = entry_for("Value", 7);

        store.put(key.clone(), entry).await;
        assert!(other.get(&key).await.is_some());
    }
}
