//! File-picker fallback capture.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::debug;

use super::live::Facing;
use super::{CaptureError, CaptureMode, CapturedImage};

/// Hints passed to the platform picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerHint {
    /// Accepted MIME pattern.
    pub accept: &'static str,
    /// Camera the picker should offer first.
    pub capture: Facing,
    pub multiple: bool,
}

impl Default for PickerHint {
    fn default() -> Self {
        Self {
            accept: "image/*",
            capture: Facing::User,
            multiple: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Platform file-acquisition picker. `Ok(None)` means the user dismissed it.
#[async_trait::async_trait]
pub trait FilePicker: Send + Sync {
    async fn pick(&self, hint: &PickerHint) -> Result<Option<PickedFile>, CaptureError>;
}

/// Capture strategy that delegates to a [`FilePicker`] and accepts exactly
/// one image file.
#[derive(Clone)]
pub struct FilePickerCapture {
    picker: Arc<dyn FilePicker>,
    hint: PickerHint,
}

impl FilePickerCapture {
    pub fn new(picker: Arc<dyn FilePicker>) -> Self {
        Self {
            picker,
            hint: PickerHint::default(),
        }
    }

    pub async fn capture(&self) -> Result<CapturedImage, CaptureError> {
        let file = self
            .picker
            .pick(&self.hint)
            .await?
            .ok_or(CaptureError::NoFileSelected)?;

        let mime_type = file.mime_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(CaptureError::InvalidMediaType(file.mime_type));
        }

        debug!(name = %file.name, mime_type = %mime_type, bytes = file.bytes.len(), "Photo picked");
        Ok(CapturedImage {
            bytes: file.bytes,
            mime_type,
            file_name: file.name,
            mode: CaptureMode::Fallback,
            captured_at: Utc::now(),
        })
    }
}

/// Picker answering from a scripted queue and recording the hints it was
/// given. Intended for development and testing.
#[derive(Debug, Default)]
pub struct StaticPicker {
    picks: Mutex<VecDeque<Result<Option<PickedFile>, CaptureError>>>,
    hints: Mutex<Vec<PickerHint>>,
}

impl StaticPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, pick: Result<Option<PickedFile>, CaptureError>) {
        lock(&self.picks).push_back(pick);
    }

    pub fn push_file(&self, name: &str, mime_type: &str, bytes: &[u8]) {
        self.push(Ok(Some(PickedFile {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            bytes: bytes.to_vec(),
        })));
    }

    pub fn hints(&self) -> Vec<PickerHint> {
        lock(&self.hints).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl FilePicker for StaticPicker {
    async fn pick(&self, hint: &PickerHint) -> Result<Option<PickedFile>, CaptureError> {
        lock(&self.hints).push(hint.clone());
        lock(&self.picks).pop_front().unwrap_or(Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accepts_image_and_hints_front_camera() {
        let picker = Arc::new(StaticPicker::new());
        picker.push_file("selfie.png", "image/png", b"png-bytes");
        let capture = FilePickerCapture::new(picker.clone());

        let image = capture.capture().await.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.mode, CaptureMode::Fallback);
        assert_eq!(image.bytes, b"png-bytes".to_vec());

        let hint = &picker.hints()[0];
        assert_eq!(hint.accept, "image/*");
        assert_eq!(hint.capture, Facing::User);
        assert!(!hint.multiple);
    }

    #[tokio::test]
    async fn test_rejects_non_image() {
        let picker = Arc::new(StaticPicker::new());
        picker.push_file("notes.pdf", "application/pdf", b"%PDF");
        let capture = FilePickerCapture::new(picker);

        assert_eq!(
            capture.capture().await,
            Err(CaptureError::InvalidMediaType("application/pdf".to_string()))
        );
    }

    #[tokio::test]
    async fn test_dismissed_picker() {
        let capture = FilePickerCapture::new(Arc::new(StaticPicker::new()));
        assert_eq!(capture.capture().await, Err(CaptureError::NoFileSelected));
    }

    #[tokio::test]
    async fn test_mime_type_is_normalised() {
        let picker = Arc::new(StaticPicker::new());
        picker.push_file("IMG_0001.JPG", " Image/JPEG ", b"jpg");
        let capture = FilePickerCapture::new(picker);
        assert_eq!(capture.capture().await.unwrap().mime_type, "image/jpeg");
    }
}
