//! Domain services for shift presence verification.

pub mod status;

pub use status::{
    ChannelStatusReporter, RecordingStatusReporter, StatusEvent, StatusReporter,
    TracingStatusReporter,
};
