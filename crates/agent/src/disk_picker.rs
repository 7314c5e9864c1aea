//! File picker that serves a photo from disk.

use std::path::PathBuf;

use presence::capture::{CaptureError, FilePicker, PickedFile, PickerHint};
use tracing::debug;

/// Answers every pick with the configured file. The MIME type is guessed
/// from the extension, so a non-image path is rejected by the capture step.
#[derive(Debug, Clone)]
pub struct DiskPicker {
    path: PathBuf,
}

impl DiskPicker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl FilePicker for DiskPicker {
    async fn pick(&self, hint: &PickerHint) -> Result<Option<PickedFile>, CaptureError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CaptureError::Picker(format!("{}: {}", self.path.display(), e)))?;

        let mime_type = mime_guess::from_path(&self.path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo".to_string());

        debug!(path = %self.path.display(), mime_type = %mime_type, accept = hint.accept, "Picked photo from disk");
        Ok(Some(PickedFile {
            name,
            mime_type,
            bytes,
        }))
    }
}
