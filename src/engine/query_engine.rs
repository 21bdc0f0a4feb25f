use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore, EntryPredicate, InMemoryCacheStore};
use crate::engine::descriptor::{CacheKey, QueryDescriptor};
use crate::engine::pending::{JoinKind, PendingTable, Settlement};
use crate::transport::Transport;
use crate::utils::{
    config::EngineConfig,
    error::QueryFailure,
    types::{CachePolicy, ExecuteOptions, QueryResult},
};

/// Single path through which every query execution flows.
///
/// Owns the cache store and the table of in-flight fetches. Share one
/// instance behind an `Arc` and pass it to every call site.
pub struct QueryEngine {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CacheStore>,
    pending: PendingTable,
    config: EngineConfig,
}

impl QueryEngine {
    /// Create an engine with an unbounded in-memory cache and default config
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_components(EngineConfig::default(), transport, Arc::new(InMemoryCacheStore::new()))
    }

    /// Create an engine with explicit configuration and cache store
    pub fn with_components(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            transport,
            store,
            pending: PendingTable::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Options built from the configured defaults
    pub fn default_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            policy: self.config.default_policy,
            ttl: None,
            timeout: None,
        }
    }

    /// Execute with the configured default options
    pub async fn query(&self, descriptor: &QueryDescriptor) -> QueryResult {
        self.execute(descriptor, self.default_options()).await
    }

    /// Execute a query under the given cache policy.
    ///
    /// Never returns an error: every outcome, including a cache miss or a
    /// transport failure, is a tagged `QueryResult`.
    pub async fn execute(&self, descriptor: &QueryDescriptor, options: ExecuteOptions) -> QueryResult {
        let key = descriptor.cache_key();
        let policy = options.policy;

        match policy {
            CachePolicy::CacheFirst => {
                if let Some(entry) = self.store.get(&key).await {
                    if !entry.is_expired() {
                        debug!(operation = descriptor.operation_name(), cache_key = %key, "cache hit");
                        return entry.result;
                    }
                    debug!(operation = descriptor.operation_name(), cache_key = %key, "cache entry expired");
                }
                self.fetch(descriptor, key, &options, true).await
            }
            CachePolicy::NetworkOnly => self.fetch(descriptor, key, &options, false).await,
            CachePolicy::CacheOnly => match self.store.get(&key).await {
                Some(entry) => entry.result,
                None => {
                    debug!(operation = descriptor.operation_name(), cache_key = %key, "cache miss");
                    QueryResult::Failure(QueryFailure::CacheMiss)
                }
            },
            CachePolicy::NetworkFirst => {
                let result = self.fetch(descriptor, key.clone(), &options, false).await;
                let fetch_failed = result.failure().map_or(false, QueryFailure::is_fetch_failure);
                if !fetch_failed {
                    return result;
                }

                match self.store.get(&key).await {
                    Some(entry) => {
                        warn!(
                            operation = descriptor.operation_name(),
                            cache_key = %key,
                            "fetch failed, serving cached result"
                        );
                        entry.result
                    }
                    None => result,
                }
            }
        }
    }

    /// Join or start the single network fetch for `key` and wait for it.
    ///
    /// With `reuse_live` a newly started fetch first re-reads the store, since
    /// another fetch may have settled after this caller's cache lookup.
    async fn fetch(
        &self,
        descriptor: &QueryDescriptor,
        key: CacheKey,
        options: &ExecuteOptions,
        reuse_live: bool,
    ) -> QueryResult {
        let ttl = options.ttl.or_else(|| self.config.default_ttl());
        let timeout = options.timeout.or_else(|| self.config.default_timeout());

        let (waiter, kind) = self.pending.join_or_start(&key, |settlement| {
            let fetch = run_fetch(
                self.transport.clone(),
                self.store.clone(),
                descriptor.clone(),
                ttl,
                reuse_live,
                settlement,
            );
            tokio::spawn(fetch).abort_handle()
        });

        if kind == JoinKind::Coalesced {
            debug!(operation = descriptor.operation_name(), cache_key = %key, "joined in-flight request");
        }

        match timeout {
            None => waiter.wait().await,
            Some(limit) => match tokio::time::timeout(limit, waiter.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        operation = descriptor.operation_name(),
                        timeout_ms = limit.as_millis() as u64,
                        "gave up waiting for result"
                    );
                    QueryResult::Failure(QueryFailure::Timeout(limit))
                }
            },
        }
    }

    /// Drop the cached entry for one descriptor
    pub async fn invalidate(&self, descriptor: &QueryDescriptor) -> bool {
        let key = descriptor.cache_key();
        let removed = self.store.remove(&key).await;
        info!(operation = descriptor.operation_name(), cache_key = %key, removed, "invalidated");
        removed
    }

    /// Drop every cached entry matching `predicate`
    pub async fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheEntry) -> bool + Send + Sync,
    {
        let matcher = move |_: &CacheKey, entry: &CacheEntry| predicate(entry);
        let predicate: EntryPredicate<'_> = &matcher;
        let removed = self.store.remove_where(predicate).await;
        info!(removed, "invalidated matching entries");
        removed
    }

    /// Drop every cached entry
    pub async fn clear(&self) {
        self.store.clear().await;
        info!("cache cleared");
    }

    /// Current cache entry for a descriptor, expired or not
    pub async fn cached(&self, descriptor: &QueryDescriptor) -> Option<CacheEntry> {
        self.store.get(&descriptor.cache_key()).await
    }

    /// Number of fetches currently in flight
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

/// Perform one transport call, write the cache, then release every waiter.
///
/// The cache is written before settlement so a caller woken by the result
/// can already read it back.
async fn run_fetch(
    transport: Arc<dyn Transport>,
    store: Arc<dyn CacheStore>,
    descriptor: QueryDescriptor,
    ttl: Option<Duration>,
    reuse_live: bool,
    settlement: Settlement,
) {
    let key = settlement.key().clone();

    if reuse_live {
        if let Some(entry) = store.get(&key).await {
            if !entry.is_expired() {
                debug!(operation = descriptor.operation_name(), cache_key = %key, "settled from fresh cache entry");
                settlement.settle(entry.result);
                return;
            }
        }
    }
    let response = transport
        .send(descriptor.document(), descriptor.operation_name(), descriptor.variables())
        .await;

    let result = match response {
        Ok(raw) => QueryResult::from_response(raw),
        Err(error) => {
            warn!(operation = descriptor.operation_name(), error = %error, "transport failed");
            QueryResult::Failure(error.into())
        }
    };

    if result.is_cacheable() {
        store
            .put(key.clone(), CacheEntry::new(descriptor.clone(), result.clone(), ttl))
            .await;
        debug!(operation = descriptor.operation_name(), cache_key = %key, "cached result");
    } else {
        debug!(operation = descriptor.operation_name(), cache_key = %key, "result not cached");
    }

    settlement.settle(result);
}
