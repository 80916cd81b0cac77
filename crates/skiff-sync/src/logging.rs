//! Logging initialization.
//!
//! Filter comes from `SKIFF_LOG` (defaults to `info`). The JSON format is
//! meant for log collection; the plain format for interactive debugging.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Later calls are no-ops, so
/// tests may call this freely.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env("SKIFF_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // Err means a subscriber is already installed.
    let _ = result;
}
