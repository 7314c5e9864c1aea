//! Domain layer for shift presence verification.
//!
//! This crate contains:
//! - Wire models (LocationSample, presence confirmations, ETA updates)
//! - Identity and assignment context threaded through every session
//! - The StatusReporter sink used to surface progress and failures
pub mod models;
pub mod services;
