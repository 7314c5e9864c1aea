//! Scripted location source for development and testing.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use domain::models::PositionReading;
use tokio::sync::mpsc;

use super::{
    LocationError, LocationSource, PermissionState, PositionOptions, Watch, WatchEvent, WatchId,
};

/// A location source driven entirely by the caller.
///
/// One-shot reads pop from a queue of scripted results (an empty queue reads
/// as `Unavailable`). Watch events are pushed by hand into the most recently
/// opened watch. Every call is recorded for later assertions.
#[derive(Debug)]
pub struct ScriptedLocationSource {
    permission: PermissionState,
    state: Mutex<ScriptState>,
}

#[derive(Debug, Default)]
struct ScriptState {
    reads: VecDeque<WatchEvent>,
    read_calls: Vec<PositionOptions>,
    watch_calls: Vec<(WatchId, PositionOptions)>,
    open: Vec<(WatchId, mpsc::UnboundedSender<WatchEvent>)>,
    cancelled: Vec<WatchId>,
    next_id: u64,
}

impl ScriptedLocationSource {
    pub fn new() -> Self {
        Self::with_permission(PermissionState::Granted)
    }

    pub fn with_permission(permission: PermissionState) -> Self {
        Self {
            permission,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Queues the result of the next `read_once`.
    pub fn script_read(&self, result: WatchEvent) {
        self.lock().reads.push_back(result);
    }

    /// Delivers an event to the most recently opened watch.
    /// Returns false when no watch is open.
    pub fn push(&self, event: WatchEvent) -> bool {
        let state = self.lock();
        match state.open.last() {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn read_calls(&self) -> Vec<PositionOptions> {
        self.lock().read_calls.clone()
    }

    pub fn watch_calls(&self) -> Vec<(WatchId, PositionOptions)> {
        self.lock().watch_calls.clone()
    }

    pub fn cancelled(&self) -> Vec<WatchId> {
        self.lock().cancelled.clone()
    }

    pub fn open_watches(&self) -> usize {
        self.lock().open.len()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ScriptedLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LocationSource for ScriptedLocationSource {
    async fn permission(&self) -> PermissionState {
        self.permission
    }

    async fn read_once(&self, options: PositionOptions) -> Result<PositionReading, LocationError> {
        let mut state = self.lock();
        state.read_calls.push(options);
        state
            .reads
            .pop_front()
            .unwrap_or_else(|| Err(LocationError::Unavailable("no scripted reading".into())))
    }

    fn watch(&self, options: PositionOptions) -> Result<Watch, LocationError> {
        if self.permission == PermissionState::Denied {
            return Err(LocationError::PermissionDenied);
        }

        let mut state = self.lock();
        state.next_id += 1;
        let id = WatchId(state.next_id);
        let (tx, rx) = mpsc::unbounded_channel();
        state.watch_calls.push((id, options));
        state.open.push((id, tx));
        Ok(Watch { id, events: rx })
    }

    fn cancel(&self, id: WatchId) {
        let mut state = self.lock();
        let before = state.open.len();
        state.open.retain(|(open_id, _)| *open_id != id);
        if state.open.len() != before {
            state.cancelled.push(id);
        }
    }
}
