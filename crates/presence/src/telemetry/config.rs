use std::time::Duration;

use domain::models::location::DEFAULT_PROVIDER;

use crate::location::PositionOptions;

/// Timing and sensor options for a [`super::TelemetrySession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Minimum spacing between emitted watch samples.
    pub post_interval: Duration,
    /// Provider tag stamped on every sample.
    pub provider: String,
    pub initial_high: PositionOptions,
    pub initial_relaxed: PositionOptions,
    pub watch_high: PositionOptions,
    pub watch_relaxed: PositionOptions,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            post_interval: Duration::from_millis(10_000),
            provider: DEFAULT_PROVIDER.to_string(),
            initial_high: PositionOptions::new(true, 30_000, 0),
            initial_relaxed: PositionOptions::new(false, 40_000, 120_000),
            watch_high: PositionOptions::new(true, 25_000, 5_000),
            watch_relaxed: PositionOptions::new(false, 40_000, 60_000),
        }
    }
}

impl TelemetryConfig {
    pub fn with_post_interval(mut self, interval: Duration) -> Self {
        self.post_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let config = TelemetryConfig::default();
        assert_eq!(config.post_interval, Duration::from_secs(10));
        assert_eq!(config.provider, "device_gnss");
        assert!(config.initial_high.high_accuracy);
        assert!(!config.initial_relaxed.high_accuracy);
        assert_eq!(config.initial_relaxed.max_cached_age, Duration::from_secs(120));
        assert_eq!(config.watch_high.timeout, Duration::from_secs(25));
        assert_eq!(config.watch_relaxed.max_cached_age, Duration::from_secs(60));
    }
}
