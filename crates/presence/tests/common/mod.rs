//! In-process mock of the presence backend.
//!
//! Every request is recorded. Responses come from a scripted queue; an empty
//! queue answers `200 {"ok": true}`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use domain::models::Identity;
use presence::transport::{HttpTransport, TransportConfig};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Json(StatusCode, Value),
    Empty(StatusCode),
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<CapturedRequest>>,
    replies: Mutex<VecDeque<Reply>>,
}

#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(record).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("mock backend has no address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend failed");
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn transport(&self) -> HttpTransport {
        HttpTransport::new(&TransportConfig {
            base_url: format!("{}/", self.base_url()),
            timeout_ms: 5_000,
        })
        .expect("Failed to build transport")
    }

    pub fn reply(&self, reply: Reply) {
        self.state.replies.lock().unwrap().push_back(reply);
    }

    pub fn reply_json(&self, status: u16, body: Value) {
        let status = StatusCode::from_u16(status).expect("invalid status");
        self.reply(Reply::Json(status, body));
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

pub fn worker_identity() -> Identity {
    Identity::new(Some("token-abc".into()), Some("worker-7".into()))
}

async fn record(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests.lock().unwrap().push(CapturedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    });

    let reply = state
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::Json(StatusCode::OK, json!({ "ok": true })));

    match reply {
        Reply::Json(status, body) => (status, Json(body)).into_response(),
        Reply::Empty(status) => status.into_response(),
    }
}
