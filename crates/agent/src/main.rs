use std::sync::Arc;

use anyhow::{Context, Result};
use domain::models::{AssignmentContext, Direction};
use domain::services::{StatusReporter, TracingStatusReporter};
use presence::api::PresenceApi;
use presence::capture::{CapturePlatform, InMemoryMediaStore};
use presence::session::PresenceCaptureSession;
use presence::telemetry::TelemetrySession;
use presence::transport::{HttpTransport, Transport};
use presence_agent::config::Config;
use presence_agent::disk_picker::DiskPicker;
use presence_agent::logging::init_logging;
use presence_agent::replay::ReplayLocationSource;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_logging(&config.logging);

    info!("Starting presence agent v{}", env!("CARGO_PKG_VERSION"));

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.transport_config())?);
    let context = config.assignment_context();

    if let (Some(direction), Some(photo_path)) = (config.capture.direction, &config.capture.photo_path) {
        let reporter = Arc::new(TracingStatusReporter::new("presence"));
        book(
            context.clone(),
            DiskPicker::new(photo_path),
            Arc::clone(&transport),
            reporter,
            direction,
        )
        .await?;
    }

    let source = ReplayLocationSource::load(&config.replay.track_path, config.replay.playback_speed)
        .await
        .context("Failed to load replay track")?;

    let mut session = TelemetrySession::new(
        context.clone(),
        config.telemetry_config(),
        Arc::new(source),
        Arc::clone(&transport),
        Arc::new(TracingStatusReporter::new("telemetry")),
    );
    session.start()?;

    let mut states = session.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
        _ = states.wait_for(|s| s.is_stopped()) => {}
    }
    info!(state = ?session.state(), "Stopping telemetry");

    let stats = session.stats();
    session.shutdown().await;
    info!(
        received = stats.received,
        sent = stats.sent,
        throttled = stats.throttled,
        dropped = stats.dropped,
        failed = stats.failed,
        "Telemetry session finished"
    );

    let api = PresenceApi::new(transport, context.identity.clone());
    match api.latest(&context.assignment_id).await {
        Ok(Some(sample)) => info!(lat = sample.lat, lng = sample.lng, recorded_at = %sample.recorded_at, "Latest sample on server"),
        Ok(None) => info!("Server has no sample for this assignment"),
        Err(e) => warn!(error = %e, "Could not fetch latest sample"),
    }

    Ok(())
}

/// Submits the configured photo as a book-on or book-off.
async fn book(
    context: AssignmentContext,
    picker: DiskPicker,
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn StatusReporter>,
    direction: Direction,
) -> Result<()> {
    let session = PresenceCaptureSession::new(
        context,
        CapturePlatform::picker_only(Arc::new(picker)),
        transport,
        reporter,
        Arc::new(InMemoryMediaStore::new()),
    );

    session.capture().await?;
    let result = session.submit(direction).await;
    session.dispose().await;
    result.with_context(|| format!("Book-{} failed", direction))
}
