use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::transport::{Transport, TransportType};
use crate::utils::{
    error::TransportError,
    types::{GraphQLError, RawResponse},
};

/// What the mock answers for one operation
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(RawResponse),
    Error(TransportError),
}

/// In-process transport with scripted replies keyed by operation name.
///
/// Deterministic: no network, optional fixed delay, and a call counter so
/// tests can assert how many requests actually went out. Replies can be
/// re-scripted while the transport is shared.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: DashMap<String, MockReply>,
    calls: DashMap<String, usize>,
    total_calls: AtomicUsize,
    delay: Duration,
}

impl MockTransport {
    /// Create a mock transport with no scripted replies
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport that waits before every reply
    pub fn with_delay(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            ..Self::default()
        }
    }

    /// Answer `operation_name` with the given response body
    pub fn respond_with(&self, operation_name: &str, response: RawResponse) {
        self.replies
            .insert(operation_name.to_string(), MockReply::Response(response));
    }

    /// Answer `operation_name` with a transport-level failure
    pub fn fail_with(&self, operation_name: &str, error: TransportError) {
        self.replies
            .insert(operation_name.to_string(), MockReply::Error(error));
    }

    /// Total number of `send` calls
    pub fn call_count(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Number of `send` calls for one operation
    pub fn calls_for(&self, operation_name: &str) -> usize {
        self.calls.get(operation_name).map_or(0, |count| *count)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        _document: &str,
        operation_name: &str,
        _variables: &Map<String, Value>,
    ) -> Result<RawResponse, TransportError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.entry(operation_name.to_string()).or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.replies.get(operation_name).map(|r| r.value().clone());
        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Error(error)) => Err(error),
            // Behave like a server that does not know the operation
            None => Ok(RawResponse::errors(vec![GraphQLError::new(format!(
                "Unknown operation named \"{}\".",
                operation_name
            ))])),
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Mock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_reply_and_counts() {
        let transport = MockTransport::new();
        transport.respond_with("Hello", RawResponse::data(json!({"hello": "hi"})));

        let response = transport.send("query Hello { hello }", "Hello", &Map::new()).await.unwrap();
        assert_eq!(response.data, Some(json!({"hello": "hi"})));

        let _ = transport.send("query Hello { hello }", "Hello", &Map::new()).await;
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.calls_for("Hello"), 2);
        assert_eq!(transport.calls_for("Other"), 0);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let transport = MockTransport::new();
        transport.fail_with("Hello", TransportError::ConnectionFailed("offline".to_string()));

        let error = transport.send("query Hello { hello }", "Hello", &Map::new()).await.unwrap_err();
        assert_eq!(error, TransportError::ConnectionFailed("offline".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_operation_returns_graphql_error() {
        let transport = MockTransport::new();
        let response = transport.send("query Nope { nope }", "Nope", &Map::new()).await.unwrap();

        assert!(response.data.is_none());
        assert_eq!(response.errors.unwrap()[0].message, "Unknown operation named \"Nope\".");
    }

    #[tokio::test]
    async fn test_rescripting_replaces_reply() {
        let transport = MockTransport::with_delay(1);
        transport.respond_with("Count", RawResponse::data(json!({"count": 1})));
        transport.respond_with("Count", RawResponse::data(json!({"count": 2})));

        let response = transport.send("query Count { count }", "Count", &Map::new()).await.unwrap();
        assert_eq!(response.data, Some(json!({"count": 2})));
        assert_eq!(transport.transport_type(), TransportType::Mock);
    }
}
