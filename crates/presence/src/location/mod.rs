//! Device position sensor capability.
//!
//! [`LocationSource`] is a thin wrapper over whatever the platform exposes:
//! a one-shot read, a continuous watch and cancellation. It carries no retry
//! or fallback policy; that lives in [`crate::telemetry`].

mod scripted;

use std::time::Duration;

use domain::models::PositionReading;
use thiserror::Error;
use tokio::sync::mpsc;

pub use scripted::ScriptedLocationSource;

/// Options for a single read or a continuous watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the platform may return instead of a fresh one.
    pub max_cached_age: Duration,
}

impl PositionOptions {
    pub const fn new(high_accuracy: bool, timeout_ms: u64, max_cached_age_ms: u64) -> Self {
        Self {
            high_accuracy,
            timeout: Duration::from_millis(timeout_ms),
            max_cached_age: Duration::from_millis(max_cached_age_ms),
        }
    }
}

/// Errors a position sensor can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("Location request timed out")]
    Timeout,
}

impl LocationError {
    /// Timeouts and unavailability may clear up; permission loss does not.
    pub fn is_transient(&self) -> bool {
        matches!(self, LocationError::Unavailable(_) | LocationError::Timeout)
    }
}

/// Result of the platform permission query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Prompt,
    Denied,
    /// The platform has no permission query.
    Unsupported,
}

/// Identifies an open watch so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

pub type WatchEvent = Result<PositionReading, LocationError>;

/// An open continuous watch. Readings and errors arrive on `events` until the
/// watch is cancelled, at which point the sender side is dropped.
#[derive(Debug)]
pub struct Watch {
    pub id: WatchId,
    pub events: mpsc::UnboundedReceiver<WatchEvent>,
}

#[async_trait::async_trait]
pub trait LocationSource: Send + Sync {
    /// Best-effort permission check. Defaults to `Unsupported`.
    async fn permission(&self) -> PermissionState {
        PermissionState::Unsupported
    }

    /// Resolves one reading or fails.
    ///
    /// Implementations own the deadline: when no fix is available within
    /// `options.timeout` they fail with [`LocationError::Timeout`] rather than
    /// waiting indefinitely. The session never wraps this call in a timer.
    async fn read_once(&self, options: PositionOptions) -> Result<PositionReading, LocationError>;

    /// Opens a continuous watch. The caller owns the returned id and must
    /// pass it to [`LocationSource::cancel`] to release the sensor.
    fn watch(&self, options: PositionOptions) -> Result<Watch, LocationError>;

    /// Cancels a watch. Unknown or already cancelled ids are ignored.
    fn cancel(&self, id: WatchId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LocationError::Timeout.is_transient());
        assert!(LocationError::Unavailable("indoors".into()).is_transient());
        assert!(!LocationError::PermissionDenied.is_transient());
    }

    #[test]
    fn test_position_options_from_millis() {
        let options = PositionOptions::new(true, 25_000, 5_000);
        assert!(options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(25));
        assert_eq!(options.max_cached_age, Duration::from_secs(5));
    }

    #[test]
    fn test_watch_id_display() {
        assert_eq!(WatchId(3).to_string(), "watch-3");
    }
}
