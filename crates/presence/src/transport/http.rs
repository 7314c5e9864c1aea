//! reqwest-backed transport.

use std::time::Duration;

use domain::models::Identity;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;

use super::{Method, OutboundRequest, Payload, Transport, TransportError, TransportResponse};

/// Header carrying the acting user's id for audit attribution.
pub const ACTOR_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL every request path is appended to.
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 15_000,
        }
    }
}

/// Sends requests over HTTP with bearer and actor-id headers.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: OutboundRequest,
        identity: &Identity,
    ) -> Result<TransportResponse, TransportError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &identity.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(actor_id) = &identity.actor_id {
            builder = builder.header(ACTOR_ID_HEADER, actor_id);
        }

        builder = match request.payload {
            Payload::Empty => builder,
            Payload::Json(body) => builder.json(&body),
            Payload::Image(upload) => {
                let part = Part::bytes(upload.bytes)
                    .file_name(upload.file_name)
                    .mime_str(&upload.mime_type)
                    .map_err(|e| TransportError::Encode(e.to_string()))?;
                builder.multipart(Form::new().part(upload.field, part))
            }
        };

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(method = %request.method, path = %request.path, error = %e, "Request failed");
            TransportError::Network(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let body = parse_body(&text);

        if !status.is_success() {
            let message = failure_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());
            return Err(TransportError::Server {
                status: status.as_u16(),
                message,
            });
        }

        if body.get("ok") == Some(&Value::Bool(false)) {
            return Err(TransportError::Server {
                status: status.as_u16(),
                message: failure_message(&body).unwrap_or_else(|| "Request rejected".to_string()),
            });
        }

        tracing::trace!(method = %request.method, path = %request.path, status = status.as_u16(), "Request delivered");

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Parses a response body as JSON, keeping non-JSON text as a string.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Extracts the server's failure text from `error` or `message`.
fn failure_message(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => ["error", "message"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join_trims_trailing_slash() {
        let transport = HttpTransport::new(&TransportConfig {
            base_url: "https://api.example.com/".to_string(),
            timeout_ms: 1000,
        })
        .unwrap();
        assert_eq!(transport.url("/telemetry"), "https://api.example.com/telemetry");
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("{\"ok\":true}")["ok"], true);
        assert_eq!(parse_body("Bad Gateway"), Value::String("Bad Gateway".into()));
    }

    #[test]
    fn test_failure_message_prefers_error() {
        let body = serde_json::json!({"ok": false, "error": "Forbidden", "message": "other"});
        assert_eq!(failure_message(&body).as_deref(), Some("Forbidden"));

        let body = serde_json::json!({"message": "Shift already booked on"});
        assert_eq!(failure_message(&body).as_deref(), Some("Shift already booked on"));

        assert_eq!(failure_message(&serde_json::json!({"ok": false})), None);
    }
}
