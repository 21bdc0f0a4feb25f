use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::utils::{
    error::{EngineError, EngineResult},
    types::CachePolicy,
};

/// Main engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_policy: CachePolicy,
    pub default_ttl_secs: Option<u64>,
    pub default_timeout_ms: Option<u64>,
    pub cache: CacheConfig,
    pub transport: Option<HttpTransportConfig>,
}

/// Cache store configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries; `None` keeps the store unbounded
    pub capacity: Option<usize>,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpTransportConfig {
    pub endpoint: String,
    #[serde(default = "default_transport_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Authentication applied to every HTTP request
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer { token: String },
    ApiKey { header: String, key: String },
    Basic { username: String, password: String },
}

fn default_transport_timeout() -> u64 {
    30
}

impl EngineConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    /// Check the values serde cannot
    pub fn validate(&self) -> EngineResult<()> {
        if self.cache.capacity == Some(0) {
            return Err(EngineError::Configuration(
                "cache capacity must be greater than zero".to_string(),
            ));
        }

        if let Some(transport) = &self.transport {
            transport.validate()?;
        }

        Ok(())
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

impl HttpTransportConfig {
    /// Create a configuration for the given endpoint
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            timeout_secs: default_transport_timeout(),
            headers: HashMap::new(),
            auth: AuthConfig::None,
        }
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the authentication scheme
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Set the request timeout in seconds
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// Parse and check the endpoint URL
    pub fn endpoint_url(&self) -> EngineResult<Url> {
        if self.endpoint.trim().is_empty() {
            return Err(EngineError::Configuration(
                "transport endpoint must not be empty".to_string(),
            ));
        }

        let url = Url::parse(&self.endpoint).map_err(|e| {
            EngineError::Configuration(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(EngineError::Configuration(format!(
                "unsupported endpoint scheme '{}'",
                other
            ))),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.endpoint_url()?;
        if self.timeout_secs == 0 {
            return Err(EngineError::Configuration(
                "transport timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_policy: CachePolicy::CacheFirst,
            default_ttl_secs: Some(300), // 5 minutes
            default_timeout_ms: None,
            cache: CacheConfig::default(),
            transport: None,
        }
    }
}
