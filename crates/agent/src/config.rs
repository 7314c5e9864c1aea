use std::path::PathBuf;
use std::time::Duration;

use domain::models::{AssignmentContext, Direction, Identity};
use presence::location::PositionOptions;
use presence::telemetry::TelemetryConfig;
use presence::transport::TransportConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    pub replay: ReplayConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Sent as the actor-id header alongside the bearer token.
    #[serde(default)]
    pub actor_id: Option<String>,
    pub company_id: String,
    pub assignment_id: String,
}

/// Telemetry timing. Timeouts and cached ages are in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "default_post_interval_ms")]
    pub post_interval_ms: u64,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_initial_high_timeout_ms")]
    pub initial_high_timeout_ms: u64,
    #[serde(default = "default_initial_relaxed_timeout_ms")]
    pub initial_relaxed_timeout_ms: u64,
    #[serde(default = "default_initial_relaxed_max_age_ms")]
    pub initial_relaxed_max_age_ms: u64,
    #[serde(default = "default_watch_high_timeout_ms")]
    pub watch_high_timeout_ms: u64,
    #[serde(default = "default_watch_high_max_age_ms")]
    pub watch_high_max_age_ms: u64,
    #[serde(default = "default_watch_relaxed_timeout_ms")]
    pub watch_relaxed_timeout_ms: u64,
    #[serde(default = "default_watch_relaxed_max_age_ms")]
    pub watch_relaxed_max_age_ms: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            post_interval_ms: default_post_interval_ms(),
            provider: default_provider(),
            initial_high_timeout_ms: default_initial_high_timeout_ms(),
            initial_relaxed_timeout_ms: default_initial_relaxed_timeout_ms(),
            initial_relaxed_max_age_ms: default_initial_relaxed_max_age_ms(),
            watch_high_timeout_ms: default_watch_high_timeout_ms(),
            watch_high_max_age_ms: default_watch_high_max_age_ms(),
            watch_relaxed_timeout_ms: default_watch_relaxed_timeout_ms(),
            watch_relaxed_max_age_ms: default_watch_relaxed_max_age_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// JSON track replayed as the device position.
    pub track_path: PathBuf,
    #[serde(default = "default_playback_speed")]
    pub playback_speed: f64,
}

/// Optional book-on/book-off performed before telemetry starts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub photo_path: Option<PathBuf>,
    #[serde(default)]
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_request_timeout_ms() -> u64 {
    15_000
}
fn default_post_interval_ms() -> u64 {
    10_000
}
fn default_provider() -> String {
    domain::models::location::DEFAULT_PROVIDER.to_string()
}
fn default_initial_high_timeout_ms() -> u64 {
    30_000
}
fn default_initial_relaxed_timeout_ms() -> u64 {
    40_000
}
fn default_initial_relaxed_max_age_ms() -> u64 {
    120_000
}
fn default_watch_high_timeout_ms() -> u64 {
    25_000
}
fn default_watch_high_max_age_ms() -> u64 {
    5_000
}
fn default_watch_relaxed_timeout_ms() -> u64 {
    40_000
}
fn default_watch_relaxed_max_age_ms() -> u64 {
    60_000
}
fn default_playback_speed() -> f64 {
    1.0
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with PRESENCE__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("PRESENCE").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides, without touching
    /// config files.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            base_url = "http://localhost:8080/api/v1"
            request_timeout_ms = 15000

            [identity]
            company_id = ""
            assignment_id = ""

            [telemetry]
            post_interval_ms = 10000
            provider = "device_gnss"

            [replay]
            track_path = "tracks/sample.json"
            playback_speed = 1.0

            [logging]
            level = "info"
            format = "json"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.base_url.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "PRESENCE__SERVER__BASE_URL must be set".to_string(),
            ));
        }

        if self.identity.company_id.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "PRESENCE__IDENTITY__COMPANY_ID must be set".to_string(),
            ));
        }

        if self.identity.assignment_id.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "PRESENCE__IDENTITY__ASSIGNMENT_ID must be set".to_string(),
            ));
        }

        if self.telemetry.post_interval_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "telemetry.post_interval_ms cannot be 0".to_string(),
            ));
        }

        if !(self.replay.playback_speed.is_finite() && self.replay.playback_speed > 0.0) {
            return Err(ConfigValidationError::InvalidValue(
                "replay.playback_speed must be a positive number".to_string(),
            ));
        }

        if self.capture.direction.is_some() && self.capture.photo_path.is_none() {
            return Err(ConfigValidationError::MissingRequired(
                "capture.photo_path is required when capture.direction is set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.server.base_url.clone(),
            timeout_ms: self.server.request_timeout_ms,
        }
    }

    pub fn assignment_context(&self) -> AssignmentContext {
        AssignmentContext::new(
            self.identity.company_id.trim(),
            self.identity.assignment_id.trim(),
            Identity::new(
                self.identity.bearer_token.clone(),
                self.identity.actor_id.clone(),
            ),
        )
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        let t = &self.telemetry;
        TelemetryConfig {
            post_interval: Duration::from_millis(t.post_interval_ms),
            provider: t.provider.clone(),
            initial_high: PositionOptions::new(true, t.initial_high_timeout_ms, 0),
            initial_relaxed: PositionOptions::new(
                false,
                t.initial_relaxed_timeout_ms,
                t.initial_relaxed_max_age_ms,
            ),
            watch_high: PositionOptions::new(true, t.watch_high_timeout_ms, t.watch_high_max_age_ms),
            watch_relaxed: PositionOptions::new(
                false,
                t.watch_relaxed_timeout_ms,
                t.watch_relaxed_max_age_ms,
            ),
        }
    }
}
