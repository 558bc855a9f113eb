//! Telemetry and observability setup
//!
//! Configures structured logging with tracing and tracing-subscriber.
//! Logs always go to stderr so stdout stays valid JSON when piped.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Build the filter directive for a log level
///
/// The crate logs at `level`; noisy HTTP dependencies are held at `warn`.
pub fn filter_directive(level: &str) -> String {
    format!(
        "jarvis_orchestrator={level},jarvis_orchestrate={level},reqwest=warn,hyper=warn",
        level = level
    )
}

/// Initialize tracing subscriber for structured logging
///
/// This can only be called once per process. Subsequent calls are silently ignored.
///
/// Reads the filter from RUST_LOG if set, otherwise uses `default_level`
/// (already resolved from `LOG_LEVEL` or the config file).
///
/// # Examples
///
/// ```no_run
/// jarvis_orchestrator::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directive(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
