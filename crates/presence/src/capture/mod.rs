//! Still-image acquisition for presence proof.
//!
//! Two interchangeable strategies produce a [`CapturedImage`]: a live
//! front-facing camera (frame mirrored and encoded to JPEG) and a platform
//! file picker hinted toward the selfie camera. [`CaptureSource::select`]
//! picks one by feature detection.

mod live;
mod media;
mod picker;
mod source;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use live::{
    encode_jpeg, mirror_frame, Camera, Facing, FrameStream, LiveCamera, StaticFrameCamera, JPEG_MIME,
};
pub use media::{CapturedMedia, DisplayHandle, InMemoryMediaStore, MediaEvent, MediaStore};
pub use picker::{FilePicker, FilePickerCapture, PickedFile, PickerHint, StaticPicker};
pub use source::{CapturePlatform, CaptureSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Live,
    Fallback,
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureMode::Live => write!(f, "live"),
            CaptureMode::Fallback => write!(f, "fallback"),
        }
    }
}

/// An encoded still image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub mode: CaptureMode,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Camera requires a secure context")]
    InsecureContext,

    #[error("Camera not supported on this device")]
    CameraUnsupported,

    #[error("Camera permission denied")]
    CameraPermissionDenied,

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Camera has no frame yet")]
    NoFrame,

    #[error("Failed to encode photo: {0}")]
    Encode(String),

    #[error("Selected file is not an image ({0})")]
    InvalidMediaType(String),

    #[error("No photo selected")]
    NoFileSelected,

    #[error("File picker failed: {0}")]
    Picker(String),

    /// The session was disposed or its camera restarted mid-capture.
    #[error("Photo capture interrupted")]
    Interrupted,
}
