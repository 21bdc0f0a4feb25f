use std::sync::Arc;

use crate::cache::{CacheStore, InMemoryCacheStore, LruCacheStore};
use crate::engine::query_engine::QueryEngine;
use crate::transport::{HttpTransport, Transport};
use crate::utils::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
};

/// Builder for creating QueryEngine instances
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn CacheStore>>,
}

impl EngineBuilder {
    /// Create a new engine builder
    pub fn new() -> Self {
        Self {
            config: None,
            transport: None,
            store: None,
        }
    }

    /// Set the engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this transport instead of one built from configuration
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use this cache store instead of one built from configuration
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the engine.
    ///
    /// Without an explicit transport the configured HTTP transport is used;
    /// without an explicit store the cache capacity picks an LRU or an
    /// unbounded in-memory store.
    pub fn build(self) -> EngineResult<QueryEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let transport_config = config.transport.clone().ok_or_else(|| {
                    EngineError::Configuration(
                        "no transport supplied and none configured".to_string(),
                    )
                })?;
                Arc::new(HttpTransport::new(transport_config)?)
            }
        };

        let store: Arc<dyn CacheStore> = match self.store {
            Some(store) => store,
            None => match config.cache.capacity {
                Some(capacity) => Arc::new(LruCacheStore::with_capacity(capacity)?),
                None => Arc::new(InMemoryCacheStore::new()),
            },
        };

        tracing::debug!(
            transport = ?transport.transport_type(),
            default_policy = %config.default_policy,
            "query engine built"
        );

        Ok(QueryEngine::with_components(config, transport, store))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
