//! Capture strategy selection.

use std::sync::Arc;

use tracing::info;

use super::live::{Camera, LiveCamera};
use super::picker::{FilePicker, FilePickerCapture};
use super::{CaptureError, CaptureMode, CapturedImage};

const DEFAULT_JPEG_QUALITY: u8 = 85;

/// What the execution environment offers for still capture.
#[derive(Clone)]
pub struct CapturePlatform {
    /// Whether the page runs in a secure context; cameras are gated on it.
    pub secure_context: bool,
    pub camera: Option<Arc<dyn Camera>>,
    pub picker: Arc<dyn FilePicker>,
    pub jpeg_quality: u8,
}

impl CapturePlatform {
    pub fn new(secure_context: bool, camera: Option<Arc<dyn Camera>>, picker: Arc<dyn FilePicker>) -> Self {
        Self {
            secure_context,
            camera,
            picker,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// A platform with no camera at all.
    pub fn picker_only(picker: Arc<dyn FilePicker>) -> Self {
        Self::new(true, None, picker)
    }
}

/// The selected capture strategy.
pub enum CaptureSource {
    Live(LiveCamera),
    Fallback {
        picker: FilePickerCapture,
        /// Why the live camera was not used.
        reason: CaptureError,
    },
}

impl CaptureSource {
    /// Prefers the live camera and falls back to the picker when the context
    /// is insecure, no camera exists, or acquiring it fails.
    pub async fn select(platform: &CapturePlatform) -> Self {
        let live = match (&platform.camera, platform.secure_context) {
            (_, false) => Err(CaptureError::InsecureContext),
            (None, true) => Err(CaptureError::CameraUnsupported),
            (Some(camera), true) => LiveCamera::start(camera.as_ref(), platform.jpeg_quality).await,
        };

        match live {
            Ok(camera) => CaptureSource::Live(camera),
            Err(reason) => {
                info!(reason = %reason, "Using file picker for photo capture");
                CaptureSource::Fallback {
                    picker: FilePickerCapture::new(Arc::clone(&platform.picker)),
                    reason,
                }
            }
        }
    }

    pub fn mode(&self) -> CaptureMode {
        match self {
            CaptureSource::Live(_) => CaptureMode::Live,
            CaptureSource::Fallback { .. } => CaptureMode::Fallback,
        }
    }

    pub fn fallback_reason(&self) -> Option<&CaptureError> {
        match self {
            CaptureSource::Live(_) => None,
            CaptureSource::Fallback { reason, .. } => Some(reason),
        }
    }

    pub async fn capture(&self) -> Result<CapturedImage, CaptureError> {
        match self {
            CaptureSource::Live(camera) => camera.capture().await,
            CaptureSource::Fallback { picker, .. } => picker.capture().await,
        }
    }

    /// Stops the camera stream, if any.
    pub fn stop(&mut self) {
        if let CaptureSource::Live(camera) = self {
            camera.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{StaticFrameCamera, StaticPicker};
    use image::RgbaImage;

    fn picker() -> Arc<StaticPicker> {
        Arc::new(StaticPicker::new())
    }

    #[tokio::test]
    async fn test_selects_live_camera() {
        let camera = Arc::new(StaticFrameCamera::new(RgbaImage::new(4, 4)));
        let platform = CapturePlatform::new(true, Some(camera.clone() as Arc<dyn Camera>), picker());

        let mut source = CaptureSource::select(&platform).await;
        assert_eq!(source.mode(), CaptureMode::Live);
        assert!(source.fallback_reason().is_none());

        source.stop();
        assert_eq!(camera.stopped(), 1);
    }

    #[tokio::test]
    async fn test_insecure_context_falls_back_without_opening_camera() {
        let camera = Arc::new(StaticFrameCamera::new(RgbaImage::new(4, 4)));
        let platform = CapturePlatform::new(false, Some(camera.clone() as Arc<dyn Camera>), picker());

        let source = CaptureSource::select(&platform).await;
        assert_eq!(source.mode(), CaptureMode::Fallback);
        assert_eq!(source.fallback_reason(), Some(&CaptureError::InsecureContext));
        assert_eq!(camera.opened(), 0);
    }

    #[tokio::test]
    async fn test_missing_camera_falls_back() {
        let source = CaptureSource::select(&CapturePlatform::picker_only(picker())).await;
        assert_eq!(source.fallback_reason(), Some(&CaptureError::CameraUnsupported));
    }

    #[tokio::test]
    async fn test_denied_camera_falls_back() {
        let camera = Arc::new(StaticFrameCamera::failing(CaptureError::CameraPermissionDenied));
        let platform = CapturePlatform::new(true, Some(camera as Arc<dyn Camera>), picker());

        let source = CaptureSource::select(&platform).await;
        assert_eq!(source.mode(), CaptureMode::Fallback);
        assert_eq!(
            source.fallback_reason(),
            Some(&CaptureError::CameraPermissionDenied)
        );
    }

    #[tokio::test]
    async fn test_fallback_capture_uses_picker() {
        let picker = picker();
        picker.push_file("me.jpg", "image/jpeg", b"jpg");
        let source = CaptureSource::select(&CapturePlatform::picker_only(picker.clone())).await;

        let image = source.capture().await.unwrap();
        assert_eq!(image.mode, CaptureMode::Fallback);
        assert_eq!(picker.hints().len(), 1);
    }
}
