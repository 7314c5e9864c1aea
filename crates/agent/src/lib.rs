//! Headless presence agent.
//!
//! Wires the presence core to a replayed position track, a photo on disk and
//! the HTTP backend. Configuration comes from `config/*.toml` and
//! `PRESENCE__*` environment variables.

pub mod config;
pub mod disk_picker;
pub mod logging;
pub mod replay;
