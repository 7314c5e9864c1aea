//! Captured media and display handles.
//!
//! A [`DisplayHandle`] is what the UI renders (for example a temporary blob
//! URL). Every handle minted by a [`MediaStore`] must be revoked exactly once;
//! [`CapturedMedia`] ties that to its own lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;
use uuid::Uuid;

use super::CapturedImage;
use crate::transport::ImageUpload;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayHandle(String);

impl DisplayHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DisplayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform registry that mints and revokes display handles.
pub trait MediaStore: Send + Sync {
    fn register(&self, image: &CapturedImage) -> DisplayHandle;

    fn revoke(&self, handle: &DisplayHandle);
}

/// An owned captured image plus its live display handle.
///
/// Dropping the value revokes the handle, so replacing, clearing and
/// tearing down all release it through the same path.
pub struct CapturedMedia {
    image: CapturedImage,
    handle: DisplayHandle,
    store: Arc<dyn MediaStore>,
}

impl CapturedMedia {
    pub fn new(image: CapturedImage, store: Arc<dyn MediaStore>) -> Self {
        let handle = store.register(&image);
        debug!(handle = %handle, bytes = image.bytes.len(), "Display handle created");
        Self {
            image,
            handle,
            store,
        }
    }

    pub fn handle(&self) -> &DisplayHandle {
        &self.handle
    }

    pub fn image(&self) -> &CapturedImage {
        &self.image
    }

    /// Multipart upload body for `field`.
    pub fn to_upload(&self, field: &str) -> ImageUpload {
        ImageUpload {
            field: field.to_string(),
            file_name: self.image.file_name.clone(),
            mime_type: self.image.mime_type.clone(),
            bytes: self.image.bytes.clone(),
        }
    }
}

impl std::fmt::Debug for CapturedMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedMedia")
            .field("handle", &self.handle)
            .field("mime_type", &self.image.mime_type)
            .field("bytes", &self.image.bytes.len())
            .finish()
    }
}

impl Drop for CapturedMedia {
    fn drop(&mut self) {
        self.store.revoke(&self.handle);
        debug!(handle = %self.handle, "Display handle revoked");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Registered(DisplayHandle),
    Revoked(DisplayHandle),
    /// Revoke of a handle that was not live.
    StaleRevoke(DisplayHandle),
}

/// Process-local store that keeps image bytes behind `blob:` style handles.
#[derive(Debug, Default)]
pub struct InMemoryMediaStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    live: HashMap<DisplayHandle, Vec<u8>>,
    events: Vec<MediaEvent>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes behind a live handle.
    pub fn resolve(&self, handle: &DisplayHandle) -> Option<Vec<u8>> {
        self.lock().live.get(handle).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn events(&self) -> Vec<MediaEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MediaStore for InMemoryMediaStore {
    fn register(&self, image: &CapturedImage) -> DisplayHandle {
        let handle = DisplayHandle::new(format!("blob:presence/{}", Uuid::new_v4()));
        let mut state = self.lock();
        state.live.insert(handle.clone(), image.bytes.clone());
        state.events.push(MediaEvent::Registered(handle.clone()));
        handle
    }

    fn revoke(&self, handle: &DisplayHandle) {
        let mut state = self.lock();
        let event = if state.live.remove(handle).is_some() {
            MediaEvent::Revoked(handle.clone())
        } else {
            MediaEvent::StaleRevoke(handle.clone())
        };
        state.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureMode;
    use chrono::Utc;

    fn image(bytes: &[u8]) -> CapturedImage {
        CapturedImage {
            bytes: bytes.to_vec(),
            mime_type: "image/jpeg".to_string(),
            file_name: "selfie.jpg".to_string(),
            mode: CaptureMode::Live,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_drop_revokes_once() {
        let store = Arc::new(InMemoryMediaStore::new());
        let media = CapturedMedia::new(image(b"abc"), store.clone());
        let handle = media.handle().clone();

        assert!(handle.as_str().starts_with("blob:presence/"));
        assert_eq!(store.resolve(&handle), Some(b"abc".to_vec()));

        drop(media);
        assert_eq!(store.live_count(), 0);
        assert_eq!(
            store.events(),
            vec![MediaEvent::Registered(handle.clone()), MediaEvent::Revoked(handle)]
        );
    }

    #[test]
    fn test_stale_revoke_is_recorded() {
        let store = InMemoryMediaStore::new();
        store.revoke(&DisplayHandle::new("blob:presence/unknown"));
        assert!(matches!(store.events()[0], MediaEvent::StaleRevoke(_)));
    }

    #[test]
    fn test_to_upload() {
        let store = Arc::new(InMemoryMediaStore::new());
        let media = CapturedMedia::new(image(b"jpeg"), store);
        let upload = media.to_upload("photo");
        assert_eq!(upload.field, "photo");
        assert_eq!(upload.file_name, "selfie.jpg");
        assert_eq!(upload.mime_type, "image/jpeg");
        assert_eq!(upload.bytes, b"jpeg".to_vec());
    }
}
