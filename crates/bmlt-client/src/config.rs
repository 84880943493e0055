//! Session configuration.
//!
//! Loaded from TOML, YAML, or JSON with environment overrides:
//!
//! ```toml
//! minimum_server_version = 2008012
//! search_timeout = 60
//!
//! [gateway.timeout]
//! connect = 10
//! request = 30
//!
//! [gateway.tls]
//! min_version = "Tls12"
//! ```
//!
//! `BMLT__GATEWAY__TIMEOUT__REQUEST=5` overrides the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bmlt_protocol::MINIMUM_SERVER_VERSION;
use bmlt_transport::GatewayConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "BMLT";

/// Configuration loading errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported configuration file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

/// Everything a session needs besides the root URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HTTPS gateway settings
    pub gateway: GatewayConfig,
    /// Oldest accepted server, packed as `major * 1_000_000 + minor * 1000 + patch`
    pub minimum_server_version: u32,
    /// Request timeout for searches, in seconds; `None` uses the gateway's
    #[serde(with = "opt_duration_secs")]
    pub search_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            minimum_server_version: MINIMUM_SERVER_VERSION,
            search_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Load from a file, with `BMLT__...` environment variables on top.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::FileNotFound`] if the path does not exist
    /// - [`ConfigError::UnsupportedFormat`] for unknown extensions
    /// - [`ConfigError::ParseError`] if the content does not deserialize
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Defaults with `BMLT__...` environment variables applied.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ParseError`] if a variable does not deserialize.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Replace the gateway settings
    #[must_use]
    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }
}

fn environment() -> config::Environment {
    // BMLT__GATEWAY__TIMEOUT__REQUEST -> gateway.timeout.request
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
