use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::transport::{Transport, TransportType};
use crate::utils::{
    config::{AuthConfig, HttpTransportConfig},
    error::{EngineError, EngineResult, TransportError},
    types::RawResponse,
};

const MAX_ERROR_BODY_CHARS: usize = 256;

/// GraphQL-over-HTTP transport: one JSON POST per request
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    auth: AuthConfig,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    /// Create a transport from configuration
    pub fn new(config: HttpTransportConfig) -> EngineResult<Self> {
        config.validate()?;
        let endpoint = config.endpoint_url()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            auth: config.auth,
            headers: config.headers,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Build the POST request with headers and authentication applied
    fn build_request(&self, body: &Value) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);

        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        match &self.auth {
            AuthConfig::None => {}
            AuthConfig::Bearer { token } => {
                request = request.bearer_auth(token);
            }
            AuthConfig::ApiKey { header, key } => {
                request = request.header(header.as_str(), key.as_str());
            }
            AuthConfig::Basic { username, password } => {
                request = request.basic_auth(username, Some(password));
            }
        }

        request
    }
}

/// Standard request body: `{"query", "operationName", "variables"}`
pub fn request_body(document: &str, operation_name: &str, variables: &Map<String, Value>) -> Value {
    json!({
        "query": document,
        "operationName": operation_name,
        "variables": variables,
    })
}

/// Map a response status and body onto the transport contract.
///
/// A non-2xx response that still carries a GraphQL body is handed back as a
/// response so its errors reach the caller.
pub fn interpret_response(status: u16, body: &[u8]) -> Result<RawResponse, TransportError> {
    let parsed = serde_json::from_slice::<RawResponse>(body);

    if !(200..300).contains(&status) {
        return match parsed {
            Ok(raw) if raw.has_payload() => Ok(raw),
            _ => Err(TransportError::HttpStatus {
                status,
                message: String::from_utf8_lossy(body)
                    .chars()
                    .take(MAX_ERROR_BODY_CHARS)
                    .collect(),
            }),
        };
    }

    parsed.map_err(|e| TransportError::MalformedResponse(e.to_string()))
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_decode() || error.is_body() {
        TransportError::MalformedResponse(error.to_string())
    } else {
        TransportError::ConnectionFailed(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        document: &str,
        operation_name: &str,
        variables: &Map<String, Value>,
    ) -> Result<RawResponse, TransportError> {
        let body = request_body(document, operation_name, variables);
        let response = self
            .build_request(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        interpret_response(status, &bytes)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }
}
