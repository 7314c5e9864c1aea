//! Location source that replays a recorded track.
//!
//! A track is a JSON array of points with millisecond offsets from the start
//! of the recording. Watches deliver the points with their original spacing
//! divided by the playback speed and close once the track is exhausted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use domain::models::PositionReading;
use presence::location::{
    LocationError, LocationSource, PermissionState, PositionOptions, Watch, WatchId,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackPoint {
    #[serde(default)]
    pub offset_ms: u64,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub altitude_m: Option<f64>,
    #[serde(default)]
    pub is_mock: bool,
}

impl TrackPoint {
    /// The point as a fresh reading stamped now.
    fn reading(&self) -> PositionReading {
        PositionReading {
            lat: self.lat,
            lng: self.lng,
            accuracy_m: self.accuracy_m,
            speed_mps: self.speed_mps,
            heading_deg: self.heading_deg,
            altitude_m: self.altitude_m,
            is_mock: self.is_mock,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read track {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid track {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Track has no points")]
    Empty,

    #[error("Playback speed must be a positive number, got {0}")]
    InvalidSpeed(f64),
}

pub struct ReplayLocationSource {
    points: Arc<Vec<TrackPoint>>,
    playback_speed: f64,
    /// Index of the next point to deliver, shared by every watch.
    cursor: Arc<AtomicUsize>,
    next_id: AtomicU64,
    watches: Mutex<HashMap<WatchId, JoinHandle<()>>>,
}

impl ReplayLocationSource {
    pub fn new(mut points: Vec<TrackPoint>, playback_speed: f64) -> Result<Self, ReplayError> {
        if points.is_empty() {
            return Err(ReplayError::Empty);
        }
        if !(playback_speed.is_finite() && playback_speed > 0.0) {
            return Err(ReplayError::InvalidSpeed(playback_speed));
        }
        points.sort_by_key(|p| p.offset_ms);

        Ok(Self {
            points: Arc::new(points),
            playback_speed,
            cursor: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
            watches: Mutex::new(HashMap::new()),
        })
    }

    pub async fn load(path: impl AsRef<Path>, playback_speed: f64) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ReplayError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let points: Vec<TrackPoint> =
            serde_json::from_str(&text).map_err(|source| ReplayError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        let source = Self::new(points, playback_speed)?;
        info!(
            path = %path.display(),
            points = source.points.len(),
            playback_speed,
            "Loaded replay track"
        );
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn lock_watches(&self) -> MutexGuard<'_, HashMap<WatchId, JoinHandle<()>>> {
        self.watches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Spacing between point `index - 1` and point `index`, scaled.
fn gap(points: &[TrackPoint], index: usize, playback_speed: f64) -> Duration {
    if index == 0 {
        return Duration::ZERO;
    }
    let millis = points[index].offset_ms.saturating_sub(points[index - 1].offset_ms);
    Duration::from_millis(millis).div_f64(playback_speed)
}

#[async_trait::async_trait]
impl LocationSource for ReplayLocationSource {
    async fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    /// Delivers the next point, or times out once the track is exhausted.
    async fn read_once(&self, options: PositionOptions) -> Result<PositionReading, LocationError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        match self.points.get(index) {
            Some(point) => Ok(point.reading()),
            None => {
                self.cursor.store(self.points.len(), Ordering::SeqCst);
                tokio::time::sleep(options.timeout).await;
                Err(LocationError::Timeout)
            }
        }
    }

    fn watch(&self, options: PositionOptions) -> Result<Watch, LocationError> {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        let points = Arc::clone(&self.points);
        let cursor = Arc::clone(&self.cursor);
        let speed = self.playback_speed;

        let task = tokio::spawn(async move {
            loop {
                let index = cursor.load(Ordering::SeqCst);
                if index >= points.len() {
                    debug!(watch = %id, "Replay track finished");
                    break;
                }
                tokio::time::sleep(gap(&points, index, speed)).await;
                if tx.send(Ok(points[index].reading())).is_err() {
                    break;
                }
                cursor.store(index + 1, Ordering::SeqCst);
            }
        });

        debug!(watch = %id, high_accuracy = options.high_accuracy, "Replay watch opened");
        self.lock_watches().insert(id, task);
        Ok(Watch { id, events: rx })
    }

    fn cancel(&self, id: WatchId) {
        if let Some(task) = self.lock_watches().remove(&id) {
            task.abort();
            debug!(watch = %id, "Replay watch cancelled");
        }
    }
}

impl Drop for ReplayLocationSource {
    fn drop(&mut self) {
        for (_, task) in self.lock_watches().drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn point(offset_ms: u64, lat: f64) -> TrackPoint {
        TrackPoint {
            offset_ms,
            lat,
            lng: -1.5,
            accuracy_m: Some(6.0),
            speed_mps: None,
            heading_deg: None,
            altitude_m: None,
            is_mock: false,
        }
    }

    fn assert_elapsed(start: Instant, millis: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(millis) && elapsed < Duration::from_millis(millis + 10),
            "elapsed {:?}, expected about {}ms",
            elapsed,
            millis
        );
    }

    fn options() -> PositionOptions {
        PositionOptions::new(true, 25_000, 5_000)
    }

    #[test]
    fn test_rejects_empty_track_and_bad_speed() {
        assert!(matches!(
            ReplayLocationSource::new(Vec::new(), 1.0),
            Err(ReplayError::Empty)
        ));
        assert!(matches!(
            ReplayLocationSource::new(vec![point(0, 1.0)], 0.0),
            Err(ReplayError::InvalidSpeed(_))
        ));
    }

    #[test]
    fn test_parses_track_json() {
        let json = r#"[
            {"offset_ms": 2000, "lat": 51.51, "lng": -0.12},
            {"offset_ms": 0, "lat": 51.50, "lng": -0.12, "accuracy_m": 4.0, "is_mock": true}
        ]"#;
        let points: Vec<TrackPoint> = serde_json::from_str(json).unwrap();
        let source = ReplayLocationSource::new(points, 1.0).unwrap();

        assert_eq!(source.len(), 2);
        assert_eq!(source.points[0].lat, 51.50);
        assert!(source.points[0].is_mock);
        assert_eq!(source.points[1].accuracy_m, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_replays_with_scaled_spacing_then_closes() {
        let source =
            ReplayLocationSource::new(vec![point(0, 1.0), point(1_000, 2.0), point(3_000, 3.0)], 2.0)
                .unwrap();

        let first = source.read_once(options()).await.unwrap();
        assert_eq!(first.lat, 1.0);

        let mut watch = source.watch(options()).unwrap();
        let start = Instant::now();

        let second = watch.events.recv().await.unwrap().unwrap();
        assert_eq!(second.lat, 2.0);
        assert_elapsed(start, 500);

        let third = watch.events.recv().await.unwrap().unwrap();
        assert_eq!(third.lat, 3.0);
        assert_elapsed(start, 1_500);

        assert!(watch.events.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopened_watch_continues_where_the_last_stopped() {
        let source = ReplayLocationSource::new(
            vec![point(0, 1.0), point(100, 2.0), point(200, 3.0)],
            1.0,
        )
        .unwrap();

        let mut first = source.watch(options()).unwrap();
        assert_eq!(first.events.recv().await.unwrap().unwrap().lat, 1.0);
        assert_eq!(first.events.recv().await.unwrap().unwrap().lat, 2.0);
        source.cancel(first.id);

        let mut second = source.watch(options()).unwrap();
        assert_eq!(second.events.recv().await.unwrap().unwrap().lat, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_closes_channel() {
        let source =
            ReplayLocationSource::new(vec![point(0, 1.0), point(60_000, 2.0)], 1.0).unwrap();
        source.read_once(options()).await.unwrap();

        let mut watch = source.watch(options()).unwrap();
        source.cancel(watch.id);
        source.cancel(watch.id);

        assert!(watch.events.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_once_times_out_after_track_ends() {
        let source = ReplayLocationSource::new(vec![point(0, 1.0)], 1.0).unwrap();
        assert_eq!(source.read_once(options()).await.unwrap().lat, 1.0);

        let start = Instant::now();
        let err = source.read_once(options()).await.unwrap_err();
        assert_eq!(err, LocationError::Timeout);
        assert_elapsed(start, 25_000);

        let mut watch = source.watch(options()).unwrap();
        assert!(watch.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = ReplayLocationSource::load("/nonexistent/track.json", 1.0)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ReplayError::Io { .. }));
    }
}
