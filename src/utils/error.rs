use std::time::Duration;
use thiserror::Error;

use crate::utils::types::GraphQLError;

/// Main error type for the query engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid query descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised when the underlying call could not complete.
///
/// These are distinct from GraphQL errors, which arrive inside a successful
/// response body. Cloneable so a single settlement can be handed to every
/// coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),
}

/// Why a query produced no data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryFailure {
    #[error("GraphQL errors: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),

    #[error("{0}")]
    Transport(TransportError),

    #[error("No cached data available")]
    CacheMiss,

    #[error("Timed out after {0:?} waiting for result")]
    Timeout(Duration),
}

impl QueryFailure {
    /// Whether the failure came from the fetch path rather than the server
    /// or the cache
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, QueryFailure::Transport(_) | QueryFailure::Timeout(_))
    }
}

impl From<TransportError> for QueryFailure {
    fn from(error: TransportError) -> Self {
        QueryFailure::Transport(error)
    }
}

fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
