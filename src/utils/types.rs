use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::utils::error::{QueryFailure, TransportError};

/// Source position attached to a GraphQL error
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// A structured error object returned by a GraphQL server
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ErrorLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
    /// Create an error carrying only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }

    /// Attach a response path to the error
    pub fn with_path(mut self, path: Vec<Value>) -> Self {
        self.path = Some(path);
        self
    }
}

/// Response body exactly as the transport received it.
///
/// A JSON `null` for `data` deserializes to `None` and counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,
}

impl RawResponse {
    /// Response carrying only data
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Response carrying only errors
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    /// Response carrying both partial data and errors
    pub fn partial(data: Value, errors: Vec<GraphQLError>) -> Self {
        Self {
            data: Some(data),
            errors: Some(errors),
        }
    }

    /// Whether the body holds anything a GraphQL client can act on
    pub fn has_payload(&self) -> bool {
        self.data.as_ref().map_or(false, |d| !d.is_null())
            || self.errors.as_ref().map_or(false, |e| !e.is_empty())
    }
}

/// Outcome of executing a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Success(Value),
    PartialSuccess { data: Value, errors: Vec<GraphQLError> },
    Failure(QueryFailure),
}

impl QueryResult {
    /// Classify a raw transport response.
    ///
    /// Data without errors is a success, data with errors a partial success,
    /// errors without data a failure. A body with neither is malformed.
    pub fn from_response(response: RawResponse) -> Self {
        let data = response.data.filter(|d| !d.is_null());
        let errors = response.errors.filter(|e| !e.is_empty());

        match (data, errors) {
            (Some(data), None) => QueryResult::Success(data),
            (Some(data), Some(errors)) => QueryResult::PartialSuccess { data, errors },
            (None, Some(errors)) => QueryResult::Failure(QueryFailure::GraphQL(errors)),
            (None, None) => QueryResult::Failure(QueryFailure::Transport(
                TransportError::MalformedResponse(
                    "response carried neither data nor errors".to_string(),
                ),
            )),
        }
    }

    /// Only results with data are written to the cache
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, QueryResult::Failure(_))
    }

    /// Get the data payload, if any
    pub fn data(&self) -> Option<&Value> {
        match self {
            QueryResult::Success(data) | QueryResult::PartialSuccess { data, .. } => Some(data),
            QueryResult::Failure(_) => None,
        }
    }

    /// Get the GraphQL errors, if any
    pub fn graphql_errors(&self) -> &[GraphQLError] {
        match self {
            QueryResult::PartialSuccess { errors, .. } => errors,
            QueryResult::Failure(QueryFailure::GraphQL(errors)) => errors,
            _ => &[],
        }
    }

    /// Get the failure, if the query produced no data
    pub fn failure(&self) -> Option<&QueryFailure> {
        match self {
            QueryResult::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success(_))
    }

    pub fn is_cache_miss(&self) -> bool {
        matches!(self, QueryResult::Failure(QueryFailure::CacheMiss))
    }
}

/// How `execute` combines the cache and the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Serve a live cache entry, otherwise fetch and populate
    #[default]
    CacheFirst,
    /// Always fetch; write the cache but never read it
    NetworkOnly,
    /// Serve whatever is cached, even if expired; never fetch
    CacheOnly,
    /// Fetch; fall back to any cache entry if the fetch fails
    NetworkFirst,
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachePolicy::CacheFirst => write!(f, "cache-first"),
            CachePolicy::NetworkOnly => write!(f, "network-only"),
            CachePolicy::CacheOnly => write!(f, "cache-only"),
            CachePolicy::NetworkFirst => write!(f, "network-first"),
        }
    }
}

/// Per-call execution options.
///
/// `ttl` and `timeout` fall back to the engine's configured defaults when
/// left as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteOptions {
    pub policy: CachePolicy,
    pub ttl: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    /// Create options for the given policy
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            ttl: None,
            timeout: None,
        }
    }

    /// Override the time-to-live of the entry this call writes
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Bound how long this caller waits for a network result
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
