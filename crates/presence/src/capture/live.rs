//! Live camera capture.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use tracing::{debug, info};

use super::{CaptureError, CaptureMode, CapturedImage};

pub const JPEG_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Front camera, facing the user.
    User,
    Environment,
}

/// Platform camera capability.
#[async_trait::async_trait]
pub trait Camera: Send + Sync {
    /// Acquires a continuous frame source. Fails with
    /// `CameraPermissionDenied` or `CameraUnavailable`.
    async fn open(&self, facing: Facing) -> Result<Box<dyn FrameStream>, CaptureError>;
}

/// A running camera stream.
pub trait FrameStream: Send + Sync {
    /// Most recent frame, if the stream has produced one.
    fn current_frame(&self) -> Option<RgbaImage>;

    /// Releases the camera. Called at most once.
    fn stop(&mut self);
}

/// Horizontally mirrored copy of `frame`, as the user sees themselves.
pub fn mirror_frame(frame: &RgbaImage) -> RgbaImage {
    image::imageops::flip_horizontal(frame)
}

/// Encodes a frame as JPEG. Alpha is dropped.
pub fn encode_jpeg(frame: &RgbaImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgb = DynamicImage::ImageRgba8(frame.clone()).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(out)
}

/// An acquired front-facing camera stream.
///
/// The stream is stopped by [`LiveCamera::stop`] or on drop, whichever comes
/// first.
pub struct LiveCamera {
    stream: Box<dyn FrameStream>,
    quality: u8,
    stopped: bool,
}

impl LiveCamera {
    pub async fn start(camera: &dyn Camera, quality: u8) -> Result<Self, CaptureError> {
        let stream = camera.open(Facing::User).await?;
        info!("Camera stream started");
        Ok(Self {
            stream,
            quality,
            stopped: false,
        })
    }

    /// Grabs the current frame, mirrors it and encodes it off the async
    /// executor.
    pub async fn capture(&self) -> Result<CapturedImage, CaptureError> {
        if self.stopped {
            return Err(CaptureError::CameraUnavailable("camera stopped".into()));
        }
        let frame = self.stream.current_frame().ok_or(CaptureError::NoFrame)?;
        let quality = self.quality;

        let bytes = tokio::task::spawn_blocking(move || encode_jpeg(&mirror_frame(&frame), quality))
            .await
            .map_err(|e| CaptureError::Encode(e.to_string()))??;

        let captured_at = Utc::now();
        debug!(bytes = bytes.len(), "Camera frame captured");
        Ok(CapturedImage {
            bytes,
            mime_type: JPEG_MIME.to_string(),
            file_name: format!("presence-{}.jpg", captured_at.format("%Y%m%dT%H%M%SZ")),
            mode: CaptureMode::Live,
            captured_at,
        })
    }

    pub fn stop(&mut self) {
        if !self.stopped {
            self.stream.stop();
            self.stopped = true;
            info!("Camera stream stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        !self.stopped
    }
}

impl Drop for LiveCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Camera that serves one fixed frame. Intended for development and testing.
#[derive(Debug, Clone)]
pub struct StaticFrameCamera {
    frame: Option<RgbaImage>,
    failure: Option<CaptureError>,
    opened: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

impl StaticFrameCamera {
    pub fn new(frame: RgbaImage) -> Self {
        Self {
            frame: Some(frame),
            failure: None,
            opened: Arc::new(AtomicUsize::new(0)),
            stopped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A camera whose streams never produce a frame.
    pub fn blank() -> Self {
        Self {
            frame: None,
            ..Self::new(RgbaImage::new(1, 1))
        }
    }

    /// A camera whose `open` always fails with `error`.
    pub fn failing(error: CaptureError) -> Self {
        Self {
            failure: Some(error),
            ..Self::blank()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct StaticStream {
    frame: Option<RgbaImage>,
    stopped: Arc<AtomicUsize>,
}

impl FrameStream for StaticStream {
    fn current_frame(&self) -> Option<RgbaImage> {
        self.frame.clone()
    }

    fn stop(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Camera for StaticFrameCamera {
    async fn open(&self, _facing: Facing) -> Result<Box<dyn FrameStream>, CaptureError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StaticStream {
            frame: self.frame.clone(),
            stopped: Arc::clone(&self.stopped),
        }))
    }
}
