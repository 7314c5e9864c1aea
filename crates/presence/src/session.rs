//! Presence photo capture and book-on/book-off submission.
//!
//! ```text
//! NoMedia -> Captured -> Submitting -> Recorded
//!               ^             |
//!               +-- failure --+
//! ```
//!
//! A session owns at most one [`CapturedMedia`] at a time. Replacing,
//! clearing and disposing all drop the previous media before anything new is
//! registered, so its display handle is revoked exactly once.
//!
//! A pending capture can wait on the user indefinitely. Disposing the session
//! or restarting the camera interrupts it first, so teardown never waits on
//! the picker.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use domain::models::{AssignmentContext, Direction};
use domain::services::StatusReporter;
use metrics::counter;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::capture::{
    CaptureError, CaptureMode, CapturePlatform, CaptureSource, CapturedMedia, DisplayHandle,
    MediaStore,
};
use crate::transport::{OutboundRequest, Transport, TransportError};

/// Multipart field carrying the photo.
pub const PHOTO_FIELD: &str = "photo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    NoMedia,
    Captured,
    Submitting,
    /// The server accepted the photo. The media stays visible as proof.
    Recorded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresenceError {
    #[error("Take a photo first")]
    NoPhotoCaptured,

    #[error("A submission is already in progress")]
    SubmissionInProgress,

    #[error("Invalid assignment context: {0}")]
    InvalidContext(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A submission the server accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub direction: Direction,
    pub submitted_at: DateTime<Utc>,
}

struct Inner {
    state: PresenceState,
    mode: Option<CaptureMode>,
    media: Option<CapturedMedia>,
    last_submission: Option<Submission>,
}

/// One capture-and-submit flow for a single assignment.
///
/// Methods take `&self` so the session can sit behind an `Arc` shared by a UI
/// loop; a second `submit` while one is in flight is rejected rather than
/// queued.
pub struct PresenceCaptureSession {
    context: AssignmentContext,
    platform: CapturePlatform,
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn StatusReporter>,
    store: Arc<dyn MediaStore>,
    source: tokio::sync::Mutex<Option<CaptureSource>>,
    /// Cancelled to abandon the capture in flight, then replaced.
    interrupt: Mutex<CancellationToken>,
    inner: Mutex<Inner>,
}

impl PresenceCaptureSession {
    pub fn new(
        context: AssignmentContext,
        platform: CapturePlatform,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn StatusReporter>,
        store: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            context,
            platform,
            transport,
            reporter,
            store,
            source: tokio::sync::Mutex::new(None),
            interrupt: Mutex::new(CancellationToken::new()),
            inner: Mutex::new(Inner {
                state: PresenceState::NoMedia,
                mode: None,
                media: None,
                last_submission: None,
            }),
        }
    }

    /// Selects a capture source, stopping any stream acquired earlier.
    pub async fn start(&self) -> CaptureMode {
        self.interrupt_capture();
        let mut slot = self.source.lock().await;
        self.select_into(&mut slot).await
    }

    /// Stops the current camera stream and acquires a fresh one.
    pub async fn restart_camera(&self) -> CaptureMode {
        info!(assignment_id = %self.context.assignment_id, "Restarting camera");
        self.start().await
    }

    /// Captures a photo from the selected source, selecting one first if
    /// needed. The previous photo, if any, is released before the new one is
    /// registered.
    pub async fn capture(&self) -> Result<DisplayHandle, PresenceError> {
        if self.state() == PresenceState::Submitting {
            return Err(PresenceError::SubmissionInProgress);
        }

        let interrupted = self.interrupt_token();
        let image = {
            let mut slot = self.source.lock().await;
            if slot.is_none() {
                self.select_into(&mut slot).await;
            }
            match slot.as_ref() {
                Some(source) => tokio::select! {
                    biased;
                    _ = interrupted.cancelled() => Err(CaptureError::Interrupted),
                    image = source.capture() => image,
                },
                None => Err(CaptureError::CameraUnsupported),
            }
        };

        let image = match image {
            Ok(image) => image,
            Err(CaptureError::Interrupted) => {
                debug!(assignment_id = %self.context.assignment_id, "Photo capture interrupted");
                return Err(CaptureError::Interrupted.into());
            }
            Err(e) => {
                warn!(assignment_id = %self.context.assignment_id, error = %e, "Photo capture failed");
                self.reporter.on_error(&format!("Could not capture photo: {}", e));
                return Err(e.into());
            }
        };

        let mut inner = self.lock();
        if inner.state == PresenceState::Submitting {
            return Err(PresenceError::SubmissionInProgress);
        }
        drop(inner.media.take());

        let mode = image.mode;
        let media = CapturedMedia::new(image, Arc::clone(&self.store));
        let handle = media.handle().clone();
        inner.media = Some(media);
        inner.state = PresenceState::Captured;
        drop(inner);

        debug!(assignment_id = %self.context.assignment_id, mode = %mode, handle = %handle, "Photo captured");
        self.reporter.on_status("Photo captured");
        Ok(handle)
    }

    /// Uploads the captured photo to the book-on or book-off endpoint.
    ///
    /// Fails with `NoPhotoCaptured` without touching the network when there is
    /// nothing to send. On success the photo is kept; on failure the session
    /// returns to `Captured` so the user can retry.
    pub async fn submit(&self, direction: Direction) -> Result<(), PresenceError> {
        let upload = {
            let mut inner = self.lock();
            if inner.state == PresenceState::Submitting {
                return Err(PresenceError::SubmissionInProgress);
            }
            let Some(upload) = inner.media.as_ref().map(|media| media.to_upload(PHOTO_FIELD)) else {
                drop(inner);
                self.reporter.on_error("Take a photo before submitting");
                return Err(PresenceError::NoPhotoCaptured);
            };
            if let Err(e) = self.context.validate() {
                drop(inner);
                self.reporter.on_error(&format!("Cannot submit photo: {}", e));
                return Err(PresenceError::InvalidContext(e.to_string()));
            }
            inner.state = PresenceState::Submitting;
            upload
        };
        let _guard = SubmitGuard { inner: &self.inner };

        let path = format!(
            "/presence/{}/{}",
            direction.endpoint_segment(),
            self.context.assignment_id
        );
        info!(
            assignment_id = %self.context.assignment_id,
            direction = %direction,
            bytes = upload.bytes.len(),
            "Submitting presence photo"
        );

        match self
            .transport
            .send(OutboundRequest::post_image(path, upload), &self.context.identity)
            .await
        {
            Ok(_) => {
                let mut inner = self.lock();
                if inner.state == PresenceState::Submitting {
                    inner.state = PresenceState::Recorded;
                    inner.last_submission = Some(Submission {
                        direction,
                        submitted_at: Utc::now(),
                    });
                }
                drop(inner);

                counter!(
                    "presence_submissions_total",
                    "direction" => direction.to_string(),
                    "outcome" => "success"
                )
                .increment(1);
                self.reporter.on_status(match direction {
                    Direction::On => "Book-on recorded",
                    Direction::Off => "Book-off recorded",
                });
                Ok(())
            }
            Err(e) => {
                counter!(
                    "presence_submissions_total",
                    "direction" => direction.to_string(),
                    "outcome" => "failure"
                )
                .increment(1);
                warn!(assignment_id = %self.context.assignment_id, direction = %direction, error = %e, "Presence submission failed");
                self.reporter.on_error(&format!("Failed to submit photo: {}", e));
                Err(e.into())
            }
        }
    }

    /// Releases the captured photo.
    pub fn clear(&self) -> Result<(), PresenceError> {
        let mut inner = self.lock();
        if inner.state == PresenceState::Submitting {
            return Err(PresenceError::SubmissionInProgress);
        }
        drop(inner.media.take());
        inner.state = PresenceState::NoMedia;
        Ok(())
    }

    /// Releases the captured photo and makes sure a capture source is ready
    /// for the next shot.
    pub async fn retake(&self) -> Result<CaptureMode, PresenceError> {
        self.clear()?;
        self.interrupt_capture();
        let mut slot = self.source.lock().await;
        if let Some(source) = slot.as_ref() {
            return Ok(source.mode());
        }
        Ok(self.select_into(&mut slot).await)
    }

    /// Stops the camera and releases the captured photo.
    pub async fn dispose(&self) {
        self.interrupt_capture();
        if let Some(mut source) = self.source.lock().await.take() {
            source.stop();
        }
        let mut inner = self.lock();
        drop(inner.media.take());
        inner.state = PresenceState::NoMedia;
        inner.mode = None;
    }

    pub fn state(&self) -> PresenceState {
        self.lock().state
    }

    /// Capture strategy in use, once one has been selected.
    pub fn mode(&self) -> Option<CaptureMode> {
        self.lock().mode
    }

    pub fn display_handle(&self) -> Option<DisplayHandle> {
        self.lock().media.as_ref().map(|media| media.handle().clone())
    }

    pub fn last_submission(&self) -> Option<Submission> {
        self.lock().last_submission.clone()
    }

    pub fn context(&self) -> &AssignmentContext {
        &self.context
    }

    fn interrupt_token(&self) -> CancellationToken {
        lock(&self.interrupt).clone()
    }

    /// Abandons the capture in flight, if any, so the source lock frees up.
    fn interrupt_capture(&self) {
        let previous = std::mem::replace(&mut *lock(&self.interrupt), CancellationToken::new());
        previous.cancel();
    }

    async fn select_into(&self, slot: &mut Option<CaptureSource>) -> CaptureMode {
        if let Some(mut previous) = slot.take() {
            previous.stop();
        }

        let source = CaptureSource::select(&self.platform).await;
        let mode = source.mode();
        match source.fallback_reason() {
            None => self.reporter.on_status("Camera ready"),
            Some(reason) => self
                .reporter
                .on_status(&format!("{}. Choose a photo instead", reason)),
        }
        *slot = Some(source);
        self.lock().mode = Some(mode);
        mode
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Drop for PresenceCaptureSession {
    fn drop(&mut self) {
        if let Some(mut source) = self.source.get_mut().take() {
            source.stop();
        }
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(inner.media.take());
    }
}

/// Leaves `Submitting` if the submission did not complete, including when
/// the submit future is dropped mid-flight.
struct SubmitGuard<'a> {
    inner: &'a Mutex<Inner>,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        let mut inner = lock(self.inner);
        if inner.state == PresenceState::Submitting {
            inner.state = if inner.media.is_some() {
                PresenceState::Captured
            } else {
                PresenceState::NoMedia
            };
        }
    }
}
