//! # BMLT CLI
//!
//! Command line host for a BMLT Root Server session. Every invocation
//! bootstraps a fresh session, runs one command, and shuts the session down.
//!
//! ## Usage
//!
//! ```bash
//! export BMLT_ROOT_URI=https://example.org/main_server
//!
//! # Server capabilities
//! bmlt validate
//!
//! # Tuesday and Thursday meetings within 5 units of a point
//! bmlt search -w 3 -w 5 --lat 40.71 --lon -74.0 --radius 5
//!
//! # Formats used by published meetings, as JSON
//! bmlt --json formats --used
//!
//! # Last week's changes in one service body
//! BMLT_ADMIN_USER=me BMLT_ADMIN_PASSWORD=... \
//!   bmlt changes --service-body 3 --from 2024-05-01 --to 2024-05-07
//! ```
//!
//! Logging goes to stderr. `-v` raises the default level from `warn` to
//! `debug`; `RUST_LOG` overrides both.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

pub mod cli;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod logging;

use bmlt_client::SessionConfig;
use clap::Parser;

pub use cli::{ChangeArgs, Cli, Commands, OutputFormat, SearchArgs};
pub use error::{CliError, CliResult};
pub use executor::CommandExecutor;
pub use formatter::Formatter;

/// Parse arguments from the process and run the chosen command
///
/// # Errors
///
/// Failures are printed with suggestions and end the process with status 1.
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let formatter = Formatter::new(cli.output_format(), !cli.no_color);

    if let Err(e) = run_with(cli).await {
        formatter.display_error(&e);
        std::process::exit(1);
    }

    Ok(())
}

/// Run an already parsed command line
///
/// # Errors
///
/// Configuration, bootstrap, and command failures.
pub async fn run_with(cli: Cli) -> CliResult<()> {
    logging::LoggingConfig::from_flags(cli.verbose, cli.json).init()?;

    let config = match &cli.config {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::from_env()?,
    };
    let root_uri = cli.root_uri.clone().ok_or(CliError::MissingRootUri)?;
    let formatter = Formatter::new(cli.output_format(), !cli.no_color);
    let executor = CommandExecutor::new(formatter, config, root_uri);

    tokio::select! {
        result = executor.execute(cli.command) => result,
        _ = tokio::signal::ctrl_c() => Err(CliError::Interrupted),
    }
}
