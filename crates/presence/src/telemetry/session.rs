//! Telemetry session state machine.
//!
//! ```text
//! Idle -> Starting -> InitialFix(High) [-> InitialFix(Relaxed)] -> Streaming(High|Relaxed) -> Stopped
//! ```
//!
//! The first fix bypasses the throttle. While streaming, a transient watch
//! error in high accuracy reopens the watch once in relaxed mode; the session
//! never steps back up. Permission loss is terminal.
//!
//! Readings are throttled as they arrive and handed to a separate delivery
//! loop, so a slow upload never holds back the sensor. Delivery keeps at most
//! one sample waiting behind the send in flight; later admitted samples are
//! dropped until that slot frees up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use domain::models::{AssignmentContext, LocationSample, PositionReading};
use domain::services::StatusReporter;
use metrics::counter;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

use super::{TelemetryConfig, Throttle};
use crate::location::{LocationError, LocationSource, PermissionState, PositionOptions, Watch, WatchId};
use crate::transport::{OutboundRequest, Transport};

const TELEMETRY_PATH: &str = "/telemetry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyMode {
    High,
    Relaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called or the session was dropped.
    Requested,
    PermissionDenied,
    /// The sensor could not be opened in any mode.
    Unavailable,
    /// The platform closed the watch.
    SourceClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryState {
    Idle,
    Starting,
    InitialFix(AccuracyMode),
    Streaming(AccuracyMode),
    Stopped(StopReason),
}

impl TelemetryState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, TelemetryState::Stopped(_))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, TelemetryState::Streaming(_))
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Telemetry session already started")]
    AlreadyStarted,

    #[error("Invalid assignment context: {0}")]
    InvalidContext(String),
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    /// Readings delivered by the sensor, including the initial fix.
    pub received: u64,
    pub sent: u64,
    pub throttled: u64,
    /// Admitted but discarded because delivery was still busy.
    pub dropped: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    sent: AtomicU64,
    throttled: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

struct Shared {
    context: AssignmentContext,
    config: TelemetryConfig,
    source: Arc<dyn LocationSource>,
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn StatusReporter>,
    cancel: CancellationToken,
    state: watch::Sender<TelemetryState>,
    active_watch: Mutex<Option<WatchId>>,
    counters: Counters,
}

/// Streams throttled location samples for one assignment.
///
/// A session runs once: `start()` spawns the sampling loop on the current
/// tokio runtime and `stop()` (or dropping the session) cancels it along with
/// any open watch. Restarting means building a new session.
pub struct TelemetrySession {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl TelemetrySession {
    pub fn new(
        context: AssignmentContext,
        config: TelemetryConfig,
        source: Arc<dyn LocationSource>,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let (state, _) = watch::channel(TelemetryState::Idle);
        Self {
            shared: Arc::new(Shared {
                context,
                config,
                source,
                transport,
                reporter,
                cancel: CancellationToken::new(),
                state,
                active_watch: Mutex::new(None),
                counters: Counters::default(),
            }),
            task: None,
        }
    }

    /// Starts sampling. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), TelemetryError> {
        if *self.shared.state.borrow() != TelemetryState::Idle {
            return Err(TelemetryError::AlreadyStarted);
        }

        if let Err(e) = self.shared.context.validate() {
            let message = format!("Cannot start location tracking: {}", e);
            self.shared.reporter.on_error(&message);
            self.shared.finish(StopReason::Unavailable);
            return Err(TelemetryError::InvalidContext(e.to_string()));
        }

        info!(
            company_id = %self.shared.context.company_id,
            assignment_id = %self.shared.context.assignment_id,
            post_interval_ms = self.shared.config.post_interval.as_millis() as u64,
            "Starting telemetry session"
        );
        self.shared.set_state(TelemetryState::Starting);
        self.task = Some(tokio::spawn(run(Arc::clone(&self.shared))));
        Ok(())
    }

    /// Cancels the loop and any open watch. Safe to call from any state;
    /// calls after the first are no-ops.
    pub fn stop(&self) {
        // A session that stopped on its own may still have a send in flight.
        self.shared.cancel.cancel();
        if self.shared.state.borrow().is_stopped() {
            return;
        }
        self.shared.finish(StopReason::Requested);
        self.shared.reporter.on_status("Location tracking stopped");
    }

    /// Stops the session and waits for the sampling loop to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.task.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Telemetry task failed to join");
            }
        }
    }

    pub fn state(&self) -> TelemetryState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetryState> {
        self.shared.state.subscribe()
    }

    pub fn stats(&self) -> TelemetryStats {
        let c = &self.shared.counters;
        TelemetryStats {
            received: c.received.load(Ordering::SeqCst),
            sent: c.sent.load(Ordering::SeqCst),
            throttled: c.throttled.load(Ordering::SeqCst),
            dropped: c.dropped.load(Ordering::SeqCst),
            failed: c.failed.load(Ordering::SeqCst),
        }
    }

    pub fn context(&self) -> &AssignmentContext {
        &self.shared.context
    }
}

impl Drop for TelemetrySession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    /// Moves to `next` unless the session has already stopped.
    fn set_state(&self, next: TelemetryState) {
        self.state.send_if_modified(|current| {
            if current.is_stopped() || *current == next {
                return false;
            }
            debug!(
                assignment_id = %self.context.assignment_id,
                from = ?*current,
                to = ?next,
                "Telemetry state transition"
            );
            *current = next;
            true
        });
    }

    /// Closes the open watch and enters `Stopped(reason)`.
    fn finish(&self, reason: StopReason) {
        self.close_watch();
        self.set_state(TelemetryState::Stopped(reason));
    }

    fn lock_watch(&self) -> MutexGuard<'_, Option<WatchId>> {
        self.active_watch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a watch and records it as the session's only active watch.
    /// Returns `Ok(None)` if the session was cancelled meanwhile; the fresh
    /// watch is released immediately in that case.
    fn open_watch(&self, options: PositionOptions) -> Result<Option<Watch>, LocationError> {
        let watch = self.source.watch(options)?;

        let mut slot = self.lock_watch();
        if self.cancel.is_cancelled() {
            drop(slot);
            self.source.cancel(watch.id);
            return Ok(None);
        }
        let previous = slot.replace(watch.id);
        drop(slot);

        if let Some(previous) = previous {
            self.source.cancel(previous);
        }
        debug!(watch = %watch.id, high_accuracy = options.high_accuracy, "Location watch opened");
        Ok(Some(watch))
    }

    fn close_watch(&self) {
        let id = self.lock_watch().take();
        if let Some(id) = id {
            self.source.cancel(id);
            debug!(watch = %id, "Location watch cancelled");
        }
    }

    fn watch_options(&self, mode: AccuracyMode) -> PositionOptions {
        match mode {
            AccuracyMode::High => self.config.watch_high,
            AccuracyMode::Relaxed => self.config.watch_relaxed,
        }
    }

    fn fail_permission(&self) {
        self.reporter
            .on_error("Location permission denied. Enable location access to share your position.");
        self.finish(StopReason::PermissionDenied);
    }

    /// Queues a reading for delivery without waiting on the transport.
    fn enqueue(&self, outbox: &mpsc::Sender<PositionReading>, reading: PositionReading) {
        match outbox.try_send(reading) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                counter!("presence_samples_dropped_total").increment(1);
                debug!(assignment_id = %self.context.assignment_id, "Delivery busy, location sample dropped");
            }
            // Delivery only exits once the session is cancelled.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Validates and sends one reading. Failures are reported, never retried.
    async fn emit(&self, reading: &PositionReading) {
        let sample = LocationSample::from_reading(&self.context, &self.config.provider, reading);
        if let Err(e) = sample.validate() {
            warn!(assignment_id = %self.context.assignment_id, error = %e, "Discarding invalid location sample");
            self.reporter.on_error(&format!("Discarded invalid location reading: {}", e));
            return;
        }

        let request = match OutboundRequest::post_json(TELEMETRY_PATH, &sample) {
            Ok(request) => request,
            Err(e) => {
                self.reporter.on_error(&format!("Failed to encode location: {}", e));
                return;
            }
        };

        match self.transport.send(request, &self.context.identity).await {
            Ok(_) => {
                self.counters.sent.fetch_add(1, Ordering::SeqCst);
                counter!("presence_samples_sent_total").increment(1);
                debug!(
                    assignment_id = %self.context.assignment_id,
                    lat = sample.lat,
                    lng = sample.lng,
                    "Location sample sent"
                );
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                counter!("presence_samples_failed_total").increment(1);
                warn!(assignment_id = %self.context.assignment_id, error = %e, "Location sample not delivered");
                self.reporter.on_error(&format!("Failed to send location: {}", e));
            }
        }
    }
}

/// Awaits `fut` unless the session is cancelled first.
macro_rules! or_cancelled {
    ($cancel:expr, $fut:expr) => {
        tokio::select! {
            biased;
            _ = $cancel.cancelled() => return,
            out = $fut => out,
        }
    };
}

async fn run(shared: Arc<Shared>) {
    let (outbox, queued) = mpsc::channel(1);
    tokio::join!(sample(Arc::clone(&shared), outbox), deliver(shared, queued));
}

/// Sends queued readings one at a time, in arrival order.
async fn deliver(shared: Arc<Shared>, mut queued: mpsc::Receiver<PositionReading>) {
    let cancel = shared.cancel.clone();
    while let Some(reading) = or_cancelled!(cancel, queued.recv()) {
        or_cancelled!(cancel, shared.emit(&reading));
    }
}

/// Drives the sensor. Dropping `outbox` on return lets delivery drain and exit.
async fn sample(shared: Arc<Shared>, outbox: mpsc::Sender<PositionReading>) {
    let cancel = shared.cancel.clone();
    let mut throttle = Throttle::new(shared.config.post_interval);

    // Starting
    let permission = or_cancelled!(cancel, shared.source.permission());
    if permission == PermissionState::Denied {
        shared.fail_permission();
        return;
    }

    // Initial fix
    shared.reporter.on_status("Getting your location");
    shared.set_state(TelemetryState::InitialFix(AccuracyMode::High));
    let mut mode = AccuracyMode::High;

    let first = or_cancelled!(cancel, shared.source.read_once(shared.config.initial_high));
    let fix = match first {
        Ok(reading) => Some(reading),
        Err(LocationError::PermissionDenied) => {
            shared.fail_permission();
            return;
        }
        Err(e) => {
            debug!(error = %e, "High-accuracy fix failed, trying relaxed");
            shared.set_state(TelemetryState::InitialFix(AccuracyMode::Relaxed));
            match or_cancelled!(cancel, shared.source.read_once(shared.config.initial_relaxed)) {
                Ok(reading) => {
                    mode = AccuracyMode::Relaxed;
                    Some(reading)
                }
                Err(LocationError::PermissionDenied) => {
                    shared.fail_permission();
                    return;
                }
                Err(e) => {
                    shared
                        .reporter
                        .on_error(&format!("Could not get an initial location: {}", e));
                    None
                }
            }
        }
    };

    if let Some(reading) = fix {
        shared.counters.received.fetch_add(1, Ordering::SeqCst);
        throttle.stamp(Instant::now());
        shared.enqueue(&outbox, reading);
    }

    // A relaxed initial fix already spent the single downgrade.
    let mut downgraded = mode == AccuracyMode::Relaxed;

    let mut watch = loop {
        match shared.open_watch(shared.watch_options(mode)) {
            Ok(Some(watch)) => break watch,
            Ok(None) => return,
            Err(LocationError::PermissionDenied) => {
                shared.fail_permission();
                return;
            }
            Err(e) if mode == AccuracyMode::High && !downgraded => {
                debug!(error = %e, "High-accuracy watch unavailable, trying relaxed");
                downgraded = true;
                mode = AccuracyMode::Relaxed;
                counter!("presence_accuracy_downgrades_total").increment(1);
            }
            Err(e) => {
                shared
                    .reporter
                    .on_error(&format!("Location tracking unavailable: {}", e));
                shared.finish(StopReason::Unavailable);
                return;
            }
        }
    };

    shared.set_state(TelemetryState::Streaming(mode));
    shared.reporter.on_status("Location tracking active");

    loop {
        let event = or_cancelled!(cancel, watch.events.recv());
        match event {
            None => {
                if cancel.is_cancelled() {
                    return;
                }
                info!(assignment_id = %shared.context.assignment_id, "Location watch closed by platform");
                shared.reporter.on_status("Location updates ended");
                shared.finish(StopReason::SourceClosed);
                return;
            }
            Some(Ok(reading)) => {
                shared.counters.received.fetch_add(1, Ordering::SeqCst);
                if throttle.admit(Instant::now()) {
                    shared.enqueue(&outbox, reading);
                } else {
                    shared.counters.throttled.fetch_add(1, Ordering::SeqCst);
                    counter!("presence_samples_throttled_total").increment(1);
                }
            }
            Some(Err(LocationError::PermissionDenied)) => {
                shared.fail_permission();
                return;
            }
            Some(Err(e)) if mode == AccuracyMode::High && !downgraded => {
                info!(
                    assignment_id = %shared.context.assignment_id,
                    error = %e,
                    "Switching location watch to relaxed accuracy"
                );
                downgraded = true;
                mode = AccuracyMode::Relaxed;
                counter!("presence_accuracy_downgrades_total").increment(1);
                shared.close_watch();

                match shared.open_watch(shared.watch_options(mode)) {
                    Ok(Some(relaxed)) => watch = relaxed,
                    Ok(None) => return,
                    Err(LocationError::PermissionDenied) => {
                        shared.fail_permission();
                        return;
                    }
                    Err(e) => {
                        shared
                            .reporter
                            .on_error(&format!("Location tracking unavailable: {}", e));
                        shared.finish(StopReason::Unavailable);
                        return;
                    }
                }
                shared.set_state(TelemetryState::Streaming(mode));
                shared
                    .reporter
                    .on_status("Weak location signal, using approximate location");
            }
            Some(Err(e)) => {
                debug!(assignment_id = %shared.context.assignment_id, error = %e, "Transient location error");
                shared.reporter.on_status(&format!("Waiting for location: {}", e));
            }
        }
    }
}
