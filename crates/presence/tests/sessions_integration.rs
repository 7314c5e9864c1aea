//! End-to-end tests for the telemetry and presence capture sessions over HTTP.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{worker_identity, MockBackend};
use domain::models::{AssignmentContext, Direction, PositionReading};
use domain::services::RecordingStatusReporter;
use image::{Rgba, RgbaImage};
use presence::capture::{Camera, CapturePlatform, CaptureMode, InMemoryMediaStore, StaticFrameCamera, StaticPicker};
use presence::location::ScriptedLocationSource;
use presence::session::{PresenceCaptureSession, PresenceError, PresenceState};
use presence::telemetry::{TelemetryConfig, TelemetrySession, TelemetryState};
use serde_json::json;

fn context() -> AssignmentContext {
    AssignmentContext::new("acme", "asg-77", worker_identity())
}

async fn wait_for_requests(backend: &MockBackend, count: usize) {
    for _ in 0..500 {
        if backend.requests().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("backend never received {} requests", count);
}

#[tokio::test]
async fn test_initial_fix_is_posted_to_telemetry() {
    let backend = MockBackend::start().await;
    let source = Arc::new(ScriptedLocationSource::new());
    let mut reading = PositionReading::at(53.48, -2.24);
    reading.accuracy_m = Some(12.5);
    reading.is_mock = true;
    source.script_read(Ok(reading));

    let reporter = Arc::new(RecordingStatusReporter::new());
    let mut session = TelemetrySession::new(
        context(),
        TelemetryConfig::default(),
        source.clone(),
        Arc::new(backend.transport()),
        reporter.clone(),
    );
    session.start().unwrap();

    wait_for_requests(&backend, 1).await;
    let captured = &backend.requests()[0];
    assert_eq!(captured.path, "/telemetry");
    assert_eq!(captured.header("authorization"), Some("Bearer token-abc"));
    assert_eq!(captured.header("x-user-id"), Some("worker-7"));

    let body = captured.json();
    assert_eq!(body["company_id"], "acme");
    assert_eq!(body["assignment_id"], "asg-77");
    assert_eq!(body["lat"], 53.48);
    assert_eq!(body["accuracy_m"], 12.5);
    assert_eq!(body["speed_mps"], json!(null));
    assert_eq!(body["provider"], "device_gnss");
    assert_eq!(body["is_mock"], true);

    session.shutdown().await;
    assert_eq!(source.open_watches(), 0);
}

#[tokio::test]
async fn test_telemetry_failure_is_reported_and_streaming_continues() {
    let backend = MockBackend::start().await;
    backend.reply_json(500, json!({"error": "db down"}));
    let source = Arc::new(ScriptedLocationSource::new());
    source.script_read(Ok(PositionReading::at(1.0, 1.0)));

    let reporter = Arc::new(RecordingStatusReporter::new());
    let mut session = TelemetrySession::new(
        context(),
        TelemetryConfig::default(),
        source.clone(),
        Arc::new(backend.transport()),
        reporter.clone(),
    );
    session.start().unwrap();

    let mut states = session.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| matches!(s, TelemetryState::Streaming(_))),
    )
    .await
    .expect("session never started streaming")
    .unwrap();

    for _ in 0..500 {
        if session.stats().failed > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.stats().failed, 1);
    assert!(session.state().is_streaming());
    assert!(reporter.errors().iter().any(|e| e.contains("db down")));
    session.stop();
}

#[tokio::test]
async fn test_book_on_uploads_photo_and_keeps_it() {
    let backend = MockBackend::start().await;
    let camera = Arc::new(StaticFrameCamera::new(RgbaImage::from_pixel(
        16,
        16,
        Rgba([30, 60, 90, 255]),
    )));
    let store = Arc::new(InMemoryMediaStore::new());
    let session = PresenceCaptureSession::new(
        context(),
        CapturePlatform::new(
            true,
            Some(camera.clone() as Arc<dyn Camera>),
            Arc::new(StaticPicker::new()),
        ),
        Arc::new(backend.transport()),
        Arc::new(RecordingStatusReporter::new()),
        store.clone(),
    );

    assert_eq!(session.start().await, CaptureMode::Live);
    let handle = session.capture().await.unwrap();
    session.submit(Direction::On).await.unwrap();

    assert_eq!(session.state(), PresenceState::Recorded);
    assert_eq!(session.display_handle(), Some(handle));

    let captured = &backend.requests()[0];
    assert_eq!(captured.path, "/presence/book-on/asg-77");
    assert_eq!(captured.header("authorization"), Some("Bearer token-abc"));
    let body = String::from_utf8_lossy(&captured.body);
    assert!(body.contains("name=\"photo\""));
    assert!(body.contains("Content-Type: image/jpeg"));

    session.dispose().await;
    assert_eq!(camera.stopped(), 1);
    assert_eq!(store.live_count(), 0);
}

#[tokio::test]
async fn test_rejected_book_off_can_be_retried() {
    let backend = MockBackend::start().await;
    backend.reply_json(422, json!({"ok": false, "message": "Face not detected"}));
    let picker = Arc::new(StaticPicker::new());
    picker.push_file("me.png", "image/png", b"png-bytes");

    let reporter = Arc::new(RecordingStatusReporter::new());
    let session = PresenceCaptureSession::new(
        context(),
        CapturePlatform::picker_only(picker),
        Arc::new(backend.transport()),
        reporter.clone(),
        Arc::new(InMemoryMediaStore::new()),
    );

    session.capture().await.unwrap();
    let first = session.submit(Direction::Off).await;
    assert!(matches!(first, Err(PresenceError::Transport(_))));
    assert_eq!(session.state(), PresenceState::Captured);
    assert!(reporter.errors().iter().any(|e| e.contains("Face not detected")));

    session.submit(Direction::Off).await.unwrap();
    assert_eq!(session.state(), PresenceState::Recorded);
    assert_eq!(
        backend
            .requests()
            .iter()
            .map(|r| r.path.as_str())
            .collect::<Vec<_>>(),
        vec!["/presence/book-off/asg-77", "/presence/book-off/asg-77"]
    );
}
