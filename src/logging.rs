//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter applied when the configured level does not parse.
const DEFAULT_FILTER: &str = "price_stream=info";

/// Initialize logging with a configured level or directive string.
///
/// A bare level such as `debug` is scoped to this crate; anything else is
/// handed to `EnvFilter` as-is. Falls back to the default filter when the
/// directive does not parse.
pub fn init_with_filter(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_new(directive_for(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

fn directive_for(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        lvl @ ("error" | "warn" | "info" | "debug" | "trace") => {
            format!("price_stream={},tower_http={}", lvl, lvl)
        }
        _ => level.trim().to_string(),
    }
}
