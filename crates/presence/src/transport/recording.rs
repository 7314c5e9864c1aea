//! In-memory transport for development and testing.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use domain::models::Identity;
use tokio::sync::Semaphore;

use super::{OutboundRequest, Transport, TransportError, TransportResponse};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub request: OutboundRequest,
    pub identity: Identity,
}

/// Records every request and answers from a scripted queue.
///
/// An empty queue answers `{ "ok": true }`. A gated transport parks each send
/// until [`RecordingTransport::release`] hands out a permit, which lets tests
/// hold a request in flight.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    gate: Option<Semaphore>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn push_response(&self, response: Result<TransportResponse, TransportError>) {
        lock(&self.responses).push_back(response);
    }

    pub fn push_failure(&self, error: TransportError) {
        self.push_response(Err(error));
    }

    /// Lets `count` parked sends proceed.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn paths(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|r| r.request.path.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        lock(&self.requests).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        request: OutboundRequest,
        identity: &Identity,
    ) -> Result<TransportResponse, TransportError> {
        lock(&self.requests).push(RecordedRequest {
            request,
            identity: identity.clone(),
        });

        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(TransportError::Network("transport closed".into())),
            }
        }

        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::ok()))
    }
}
