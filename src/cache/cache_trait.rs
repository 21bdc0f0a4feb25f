use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::engine::descriptor::{CacheKey, QueryDescriptor};
use crate::utils::types::QueryResult;

/// A stored result together with the request that produced it
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub descriptor: QueryDescriptor,
    pub result: QueryResult,
    pub stored_at: DateTime<Utc>,
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(descriptor: QueryDescriptor, result: QueryResult, ttl: Option<Duration>) -> Self {
        Self {
            descriptor,
            result,
            stored_at: Utc::now(),
            ttl,
        }
    }

    /// Whether the entry has outlived its TTL at `now`.
    ///
    /// Entries without a TTL never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            None => false,
            Some(ttl) => match chrono::Duration::from_std(ttl) {
                Ok(ttl) => now - self.stored_at >= ttl,
                // Longer than chrono can represent
                Err(_) => false,
            },
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Predicate used for bulk invalidation
pub type EntryPredicate<'a> = &'a (dyn Fn(&CacheKey, &CacheEntry) -> bool + Send + Sync);

/// Key/value storage for query results.
///
/// Implementations must make each operation atomic per key; nothing beyond
/// that is required.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up the entry for `key`, expired or not
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Insert or replace the entry for `key`
    async fn put(&self, key: CacheKey, entry: CacheEntry);

    /// Remove the entry for `key`, reporting whether one existed
    async fn remove(&self, key: &CacheKey) -> bool;

    /// Remove every entry matching `predicate` and return how many were removed
    async fn remove_where(&self, predicate: EntryPredicate<'_>) -> usize;

    /// Remove all entries
    async fn clear(&self);

    /// Number of stored entries
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
