//! Shared utilities for the shift presence workspace.
//!
//! Range checks for position readings and presence payloads live here so the
//! domain models can reference them from `#[validate(custom(...))]` attributes.

pub mod validation;
