use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::{error::TransportError, types::RawResponse};

/// Kinds of transport known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    Http,
    Mock,
}

/// Capability that delivers one GraphQL request and returns the raw body.
///
/// Retries, authentication and connection pooling belong to the
/// implementation; the engine calls `send` once per fetch.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the response body
    async fn send(
        &self,
        document: &str,
        operation_name: &str,
        variables: &Map<String, Value>,
    ) -> Result<RawResponse, TransportError>;

    /// Get the type of this transport
    fn transport_type(&self) -> TransportType;
}
