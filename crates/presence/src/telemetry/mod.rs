//! Continuous location telemetry for one shift assignment.

mod config;
mod session;
mod throttle;

pub use config::TelemetryConfig;
pub use session::{
    AccuracyMode, StopReason, TelemetryError, TelemetrySession, TelemetryState, TelemetryStats,
};
pub use throttle::Throttle;
