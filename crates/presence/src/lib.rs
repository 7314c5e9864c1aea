//! Field-worker presence verification.
//!
//! Two independent sessions share a [`transport::Transport`] and a
//! [`domain::services::StatusReporter`]:
//!
//! - [`telemetry::TelemetrySession`] streams throttled location samples for
//!   one shift assignment, stepping down from high to relaxed accuracy at most
//!   once.
//! - [`session::PresenceCaptureSession`] captures a selfie (live camera or
//!   file-picker fallback) and submits it to the book-on/book-off endpoints.
//!
//! [`api::PresenceApi`] covers the remaining read, ETA and confirmation calls.

pub mod api;
pub mod capture;
pub mod location;
pub mod session;
pub mod telemetry;
pub mod transport;
