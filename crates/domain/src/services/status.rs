//! Status reporting sink.
//!
//! Sessions push human-readable progress and failure strings through a
//! [`StatusReporter`]. There is no buffering and no severity beyond the two
//! channels; the caller decides how to render them.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A single message pushed through a [`StatusReporter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum StatusEvent {
    Status(String),
    Error(String),
}

impl StatusEvent {
    pub fn message(&self) -> &str {
        match self {
            StatusEvent::Status(m) | StatusEvent::Error(m) => m,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StatusEvent::Error(_))
    }
}

/// Two-channel sink for informational progress and actionable failures.
pub trait StatusReporter: Send + Sync {
    /// Informational progress, e.g. "Location tracking active".
    fn on_status(&self, message: &str);

    /// An actionable failure the user should see.
    fn on_error(&self, message: &str);
}

/// Forwards messages to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingStatusReporter {
    /// Label attached to every log line, usually the owning view or session.
    pub source: &'static str,
}

impl TracingStatusReporter {
    pub fn new(source: &'static str) -> Self {
        Self { source }
    }
}

impl StatusReporter for TracingStatusReporter {
    fn on_status(&self, message: &str) {
        tracing::info!(source = self.source, "{}", message);
    }

    fn on_error(&self, message: &str) {
        tracing::warn!(source = self.source, "{}", message);
    }
}

/// Pushes messages into an unbounded channel for a UI loop to drain.
///
/// Sends after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelStatusReporter {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelStatusReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusReporter for ChannelStatusReporter {
    fn on_status(&self, message: &str) {
        let _ = self.tx.send(StatusEvent::Status(message.to_string()));
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(StatusEvent::Error(message.to_string()));
    }
}

/// Records every message in order. Intended for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingStatusReporter {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingStatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn events(&self) -> Vec<StatusEvent> {
        self.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|e| e.is_error())
            .map(|e| e.message().to_string())
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|e| !e.is_error())
            .map(|e| e.message().to_string())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StatusEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StatusReporter for RecordingStatusReporter {
    fn on_status(&self, message: &str) {
        self.lock().push(StatusEvent::Status(message.to_string()));
    }

    fn on_error(&self, message: &str) {
        self.lock().push(StatusEvent::Error(message.to_string()));
    }
}
