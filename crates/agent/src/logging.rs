//! Logging initialization.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// HTTP client internals are only interesting when explicitly asked for.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

/// Filter directives for `level`, with noisy dependencies capped at `warn`.
fn directives(level: &str) -> String {
    format!("{},{}", level.trim(), QUIET_DEPENDENCIES)
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
///
/// `format` is `json` for log shipping, `compact` for single-line terminal
/// output, anything else for multi-line pretty output.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(&config.level)));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true);
            subscriber.with(json_layer).init();
        }
        "compact" => {
            subscriber.with(fmt::layer().compact().with_target(false)).init();
        }
        _ => {
            subscriber.with(fmt::layer().pretty().with_target(false)).init();
        }
    }
}
