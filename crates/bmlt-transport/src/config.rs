//! Gateway configuration types.
//!
//! Durations are written in whole seconds so the same structs load from
//! TOML, YAML, JSON, or `BMLT__...` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TlsVersion {
    /// TLS 1.2; many Root Servers run on shared hosting that stops here
    #[default]
    Tls12,
    /// TLS 1.3
    Tls13,
}

/// TLS policy for the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Minimum TLS protocol version to accept.
    pub min_version: TlsVersion,

    /// Whether to validate server certificates.
    pub validate_certificates: bool,

    /// Accept `http://` root URIs whose host is `localhost`, `127.0.0.0/8`,
    /// or `::1`. Any other plain-HTTP host is still refused.
    pub allow_loopback_http: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::default(),
            validate_certificates: true,
            allow_loopback_http: false,
        }
    }
}

impl TlsConfig {
    /// TLS 1.3 only, certificates validated.
    #[must_use]
    pub const fn modern() -> Self {
        Self {
            min_version: TlsVersion::Tls13,
            validate_certificates: true,
            allow_loopback_http: false,
        }
    }

    /// Skip certificate validation.
    ///
    /// **Warning**: only honored when `BMLT_ALLOW_INSECURE_TLS=1` is set in
    /// the environment. Use for local test servers only.
    #[must_use]
    pub const fn insecure() -> Self {
        Self {
            min_version: TlsVersion::Tls12,
            validate_certificates: false,
            allow_loopback_http: false,
        }
    }

    /// Local development against a plain-HTTP server on this machine.
    #[must_use]
    pub const fn loopback() -> Self {
        Self {
            min_version: TlsVersion::Tls12,
            validate_certificates: true,
            allow_loopback_http: true,
        }
    }

    /// Check if certificate validation is skipped.
    #[must_use]
    pub const fn is_insecure(&self) -> bool {
        !self.validate_certificates
    }
}

/// Request timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout, in seconds on the wire.
    #[serde(with = "duration_secs")]
    pub connect: Duration,

    /// Whole-request timeout, in seconds on the wire.
    #[serde(with = "duration_secs")]
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    /// Short timeouts for a server on a fast local link.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            connect: Duration::from_secs(3),
            request: Duration::from_secs(10),
        }
    }

    /// Long timeouts for large searches against slow shared hosting.
    #[must_use]
    pub const fn patient() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: Duration::from_secs(120),
        }
    }
}

/// Everything the HTTPS gateway needs besides the root URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// TLS policy
    pub tls: TlsConfig,
    /// Timeouts
    pub timeout: TimeoutConfig,
    /// `User-Agent` header
    pub user_agent: String,
    /// Largest accepted response body in bytes; `None` = unlimited
    pub max_response_size: Option<usize>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tls: TlsConfig::default(),
            timeout: TimeoutConfig::default(),
            user_agent: format!("bmlt-client/{}", env!("CARGO_PKG_VERSION")),
            max_response_size: Some(32 * 1024 * 1024), // 32MB; full-region searches are large
        }
    }
}

impl GatewayConfig {
    /// Replace the TLS policy
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Replace the timeouts
    #[must_use]
    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
