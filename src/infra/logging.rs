//! Structured logging setup
//!
//! Level is taken from `RUST_LOG` when set, e.g. `RUST_LOG=debug` for full
//! event visibility or `RUST_LOG=presence_gateway=trace` for per-tick output.

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `default_level` applies when `RUST_LOG` is unset.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();
}
