//! Structured telemetry initialisation for the watchdog binary.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Environment variable carrying the log filter expression.
pub const LOG_FILTER_ENV: &str = "WARDEND_LOG";

const DEFAULT_FILTER: &str = "info";

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: the first invocation installs the global
/// subscriber and subsequent invocations return without touching it.
pub fn initialise() -> Result<(), TelemetryError> {
    TELEMETRY_GUARD.get_or_try_init(install_subscriber).map(|_| ())
}

fn install_subscriber() -> Result<(), TelemetryError> {
    let directives =
        std::env::var(LOG_FILTER_ENV).unwrap_or_else(|_| String::from(DEFAULT_FILTER));
    let filter =
        EnvFilter::try_new(&directives).map_err(|error| TelemetryError::Filter(error.to_string()))?;

    // Logs go to stderr so the status and install flows own stdout.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
