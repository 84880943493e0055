//! Stderr logging for the command line host.
//!
//! `RUST_LOG` wins over the level chosen from the flags, so
//! `RUST_LOG=bmlt_transport=trace bmlt search` works as expected.

use std::io;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{CliError, CliResult};

/// How log lines are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// One JSON object per line
    pub structured: bool,
}

impl LoggingConfig {
    /// Level and layout for the given flags
    #[must_use]
    pub fn from_flags(verbose: bool, json: bool) -> Self {
        Self {
            level: if verbose { "debug" } else { "warn" }.to_string(),
            structured: json,
        }
    }

    /// Install the global subscriber.
    ///
    /// # Errors
    ///
    /// Fails if a subscriber is already installed.
    pub fn init(&self) -> CliResult<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let subscriber = tracing_subscriber::registry().with(filter);

        if self.structured {
            subscriber
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .map_err(|e| CliError::Logging(e.to_string()))
        } else {
            subscriber
                .with(fmt::layer().with_writer(io::stderr))
                .try_init()
                .map_err(|e| CliError::Logging(e.to_string()))
        }
    }
}
