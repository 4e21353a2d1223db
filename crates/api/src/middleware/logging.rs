//! Logging initialization.
//!
//! The daemon logs structured JSON in production so the poll loop's per-tick
//! fields (session counts, stop codes, job timings) stay machine-readable;
//! the pretty format is for local runs. `RUST_LOG` overrides the configured
//! level; otherwise chatty dependencies are capped at warn so tick logs stay
//! legible at debug.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::LoggingConfig;

/// Initializes the logging subsystem based on configuration.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_target(true);
            subscriber.with(json_layer).init();
        }
        _ => {
            let pretty_layer = fmt::layer().compact().with_target(false);
            subscriber.with(pretty_layer).init();
        }
    }
}

/// The configured level for the daemon's own crates, with HTTP and database
/// internals capped at warn.
fn default_directives(level: &str) -> String {
    format!("{level},hyper=warn,sqlx=warn,tower_http=info")
}
