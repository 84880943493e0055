//! Error types for CLI operations

use bmlt_client::ConfigError;
use bmlt_protocol::{BmltError, ErrorKind};
use thiserror::Error;

/// CLI-specific errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CliError {
    /// Session or server failure
    #[error("{0}")]
    Bmlt(#[from] BmltError),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid command arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Neither `--root-uri` nor `BMLT_ROOT_URI` was given
    #[error("No root server URI; pass --root-uri or set BMLT_ROOT_URI")]
    MissingRootUri,

    /// The session stopped delivering notifications
    #[error("Session closed before `{0}` completed")]
    SessionClosed(&'static str),

    /// Logging could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Ctrl-C
    #[error("Interrupted")]
    Interrupted,
}

impl CliError {
    /// Hints shown under the error in human output
    #[must_use]
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Bmlt(error) => match error.kind {
                ErrorKind::InvalidUri => vec![
                    "The root URI must use https",
                    "Point at the server root, such as https://example.org/main_server",
                ],
                ErrorKind::TransportFailure => vec![
                    "Check network connectivity",
                    "Raise gateway.timeout.request in the config file",
                ],
                ErrorKind::ServerIncompatible => {
                    vec!["The server is older than the supported minimum version"]
                }
                ErrorKind::Unauthorized => vec![
                    "Check BMLT_ADMIN_USER and BMLT_ADMIN_PASSWORD",
                    "Semantic administration must be enabled on the server",
                ],
                _ => vec![],
            },
            Self::MissingRootUri => vec!["export BMLT_ROOT_URI=https://example.org/main_server"],
            Self::Config(_) => vec!["Supported config extensions are .toml, .yaml, .yml and .json"],
            _ => vec![],
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
