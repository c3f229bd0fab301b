//! Logging setup
//!
//! Console logging through `tracing-subscriber`. `RUST_LOG` takes precedence
//! over the configured level; JSON output is meant for log collectors.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize console logging at `info`
pub fn init_logger() -> bool {
    init_logger_with("info", false)
}

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Log level or filter directive (e.g., "info", "territory_client=debug")
/// * `json_format` - JSON lines instead of the human-readable format
///
/// Returns false when a global subscriber was already installed.
pub fn init_logger_with(level: &str, json_format: bool) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    };
    result.is_ok()
}

/// Initialize from `LOG_LEVEL` (default `info`) and `LOG_JSON` (default false)
pub fn init_from_env() -> bool {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let json = std::env::var("LOG_JSON")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    init_logger_with(&level, json)
}
