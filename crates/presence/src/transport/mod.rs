//! Fire-and-forget HTTP delivery.
//!
//! A [`Transport`] sends one request with the caller's [`Identity`] attached
//! and classifies the outcome. It never retries; each caller decides what a
//! failure means (telemetry drops the sample, presence submission waits for
//! the user to press the action again).

mod http;
mod recording;

use domain::models::Identity;
use serde::Serialize;
use thiserror::Error;

pub use http::{HttpTransport, TransportConfig, ACTOR_ID_HEADER};
pub use recording::{RecordedRequest, RecordingTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
        }
    }
}

/// A still image sent as the single field of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Json(serde_json::Value),
    Image(ImageUpload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path relative to the transport's base URL, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub payload: Payload,
}

impl OutboundRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            payload: Payload::Empty,
        }
    }

    pub fn post_json<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self, TransportError> {
        Self::json(Method::Post, path, body)
    }

    pub fn put_json<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self, TransportError> {
        Self::json(Method::Put, path, body)
    }

    pub fn post_image(path: impl Into<String>, upload: ImageUpload) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            payload: Payload::Image(upload),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    fn json<T: Serialize>(
        method: Method,
        path: impl Into<String>,
        body: &T,
    ) -> Result<Self, TransportError> {
        let value =
            serde_json::to_value(body).map_err(|e| TransportError::Encode(e.to_string()))?;
        Ok(Self {
            method,
            path: path.into(),
            query: Vec::new(),
            payload: Payload::Json(value),
        })
    }
}

/// A successful response. `body` is `Null` when the server sent nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl TransportResponse {
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: serde_json::json!({ "ok": true }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Failed to encode request: {0}")]
    Encode(String),
}

impl TransportError {
    /// HTTP status for server errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: OutboundRequest,
        identity: &Identity,
    ) -> Result<TransportResponse, TransportError>;
}
