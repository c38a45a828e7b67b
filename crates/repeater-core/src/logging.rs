//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The library only emits events. Binaries and tests opt in to a subscriber
//! through these helpers.
//!
//! Filter priority:
//! 1. `REPEATER_LOG` environment variable (`EnvFilter` syntax, e.g. "debug"
//!    or "repeater_core=trace")
//! 2. default to `info`

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*};

pub const LOG_ENV_VAR: &str = "REPEATER_LOG";

/// Install a global fmt subscriber writing to stderr.
///
/// Fails if another global subscriber is already installed.
pub fn init_logging() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
}

/// Subscriber for tests: output is captured by the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_test_writer())
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"))
}
