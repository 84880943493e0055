//! Root URI validation.
//!
//! Every session needs an encrypted channel. The check happens here, before
//! a single byte is sent, so an `http://` URI never reaches the network.

use std::fmt;
use std::net::IpAddr;

use bmlt_protocol::Operation;
use url::{Host, Url};

use crate::config::TlsConfig;
use crate::error::{TransportError, TransportResult};

/// Validated base address of a Root Server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootUri {
    url: Url,
}

impl RootUri {
    /// Parse and validate a root URI.
    ///
    /// Input without a scheme is taken as `https://`. Trailing slashes are
    /// dropped from the stored form.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidUri`] when the input is empty, unparseable,
    ///   has no host, or uses a scheme other than `http`/`https`
    /// - [`TransportError::InsecureUri`] for `http` unless the TLS policy
    ///   allows loopback HTTP and the host is a loopback address
    pub fn parse(input: &str, tls: &TlsConfig) -> TransportResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "empty"));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let mut url = Url::parse(&candidate).map_err(|e| invalid(input, &e.to_string()))?;
        if url.host().is_none() {
            return Err(invalid(input, "no host"));
        }

        match url.scheme() {
            "https" => {}
            "http" if tls.allow_loopback_http && is_loopback(&url) => {
                tracing::warn!(uri = %url, "Using unencrypted loopback root URI");
            }
            "http" => return Err(TransportError::InsecureUri(trimmed.to_string())),
            other => return Err(invalid(input, &format!("unsupported scheme `{other}`"))),
        }

        url.set_query(None);
        url.set_fragment(None);
        let path = url.path().trim_end_matches('/').to_string();
        url.set_path(&path);

        Ok(Self { url })
    }

    /// The stored URI, without a trailing slash
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    /// Host name or address
    #[must_use]
    pub fn host(&self) -> String {
        self.url.host_str().unwrap_or_default().to_string()
    }

    /// Whether traffic to this URI is encrypted
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Full endpoint for an operation, selector pair included.
    ///
    /// # Errors
    ///
    /// Fails only if the operation path cannot be joined onto the root.
    pub fn endpoint(&self, operation: Operation) -> TransportResult<Url> {
        let mut base = self.url.clone();
        let dir = format!("{}/", base.path().trim_end_matches('/'));
        base.set_path(&dir);

        let mut endpoint = base
            .join(operation.path())
            .map_err(|e| TransportError::ConfigurationError(e.to_string()))?;
        if let Some((key, value)) = operation.selector() {
            endpoint.query_pairs_mut().append_pair(key, value);
        }
        Ok(endpoint)
    }
}

impl fmt::Display for RootUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn invalid(uri: &str, reason: &str) -> TransportError {
    TransportError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => IpAddr::V4(addr).is_loopback(),
        Some(Host::Ipv6(addr)) => IpAddr::V6(addr).is_loopback(),
        None => false,
    }
}
