//! Domain models for shift presence verification.

pub mod identity;
pub mod location;
pub mod presence;

pub use identity::{AssignmentContext, Identity};
pub use location::{LocationSample, PositionReading};
pub use presence::{
    ApiEnvelope, Confirmation, ConfirmationResponse, ConfirmationType, Direction, EtaUpdate,
};
