use std::time::Duration;

use tokio::time::Instant;

/// Drops work arriving more often than `interval`. Nothing is queued.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Returns true and records `now` if at least `interval` has passed since
    /// the last admitted emission.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// Records an emission that bypassed the check.
    pub fn stamp(&mut self, now: Instant) {
        self.last_emit = Some(now);
    }

    pub fn last_emit(&self) -> Option<Instant> {
        self.last_emit
    }
}
