//! Logging setup.
//!
//! The level comes from the `-q`/`-v` flags when given, otherwise from the
//! `[logging]` section of the configuration. `RUST_LOG` overrides both.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Warnings and above. Booking notices go to stdout, not the log.
    #[default]
    Normal,
    /// Debug and above, including every backend request.
    Verbose,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directive limiting output to this crate at this level.
    #[must_use]
    pub fn directive(&self) -> String {
        format!("{}={}", env!("CARGO_CRATE_NAME"), self.to_level_filter())
    }
}

/// Initialize the logging system.
///
/// Logs go to stderr so that JSON output on stdout stays parseable. Only the
/// first call installs a subscriber.
///
/// ```no_run
/// use panchakarma::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity != Verbosity::Normal);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

/// Initialize logging for tests.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(Verbosity::Normal.directive())
        .with_test_writer()
        .try_init();
}
