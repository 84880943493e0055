//! The gateway seam between sessions and the network.
//!
//! Sessions only ever talk to `dyn Gateway`, so tests and embedders can put
//! any transport behind a session. [`HttpsGateway`](crate::HttpsGateway) is
//! the production implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bmlt_protocol::{Operation, Params};
use serde_json::Value;

use crate::error::{TransportError, TransportResult};
use crate::metrics::GatewayMetrics;
use crate::uri::RootUri;

/// Boxed future returned by [`Gateway`] methods
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Carries one request to the Root Server and returns the decoded body.
///
/// Implementations must be safe to call concurrently; a session issues
/// searches and admin actions in parallel.
pub trait Gateway: Send + Sync + fmt::Debug {
    /// Root Server this gateway talks to
    fn root_uri(&self) -> &RootUri;

    /// Perform one request.
    ///
    /// Non-success statuses, timeouts, and connect failures all surface as a
    /// [`TransportError`]; the body is never partially returned.
    fn request(&self, request: GatewayRequest) -> BoxFuture<'_, TransportResult<Payload>>;

    /// Snapshot of request counters
    fn metrics(&self) -> GatewayMetrics {
        GatewayMetrics::default()
    }
}

/// One outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    /// Operation to perform
    pub operation: Operation,
    /// Ordered parameters
    pub params: Params,
    /// Session cookie for admin operations
    pub credential: Option<Credential>,
    /// Overrides the gateway's request timeout
    pub timeout: Option<Duration>,
}

impl GatewayRequest {
    /// Create an anonymous request
    #[must_use]
    pub fn new(operation: Operation, params: Params) -> Self {
        Self {
            operation,
            params,
            credential: None,
            timeout: None,
        }
    }

    /// Attach a credential, if any
    #[must_use]
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// Override the request timeout, if any
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Opaque session credential (cookie pairs).
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw `Cookie` header value
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Collect `name=value` pairs from `Set-Cookie` header values.
    ///
    /// Attributes (`Path`, `HttpOnly`, ...) are discarded. Returns `None`
    /// when no header carries a pair.
    pub fn from_set_cookie<'a>(headers: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let pairs: Vec<&str> = headers
            .into_iter()
            .filter_map(|header| header.split(';').next())
            .map(str::trim)
            .filter(|pair| pair.contains('=') && !pair.starts_with('='))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(Self(pairs.join("; ")))
        }
    }

    /// Raw `Cookie` header value
    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadBody {
    /// Body parsed as JSON
    Json(Value),
    /// Body that is not JSON, trimmed (`OK`, `NOT AUTHORIZED`, ...)
    Text(String),
}

/// Response body plus any credential the server set
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Decoded body
    pub body: PayloadBody,
    /// Credential from `Set-Cookie`, if present
    pub credential: Option<Credential>,
}

impl Payload {
    /// JSON payload without credential
    #[must_use]
    pub fn json(value: Value) -> Self {
        Self {
            body: PayloadBody::Json(value),
            credential: None,
        }
    }

    /// Text payload without credential
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            body: PayloadBody::Text(text.into()),
            credential: None,
        }
    }

    /// Decode a raw body: JSON if it parses, trimmed text otherwise
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) if !trimmed.is_empty() => Self::json(value),
            _ => Self::text(trimmed),
        }
    }

    /// Attach a credential
    #[must_use]
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// JSON body, if the body was JSON
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match &self.body {
            PayloadBody::Json(value) => Some(value),
            PayloadBody::Text(_) => None,
        }
    }

    /// Take the JSON body.
    ///
    /// # Errors
    ///
    /// [`TransportError::MalformedPayload`] when the body was plain text.
    pub fn into_json(self) -> TransportResult<Value> {
        match self.body {
            PayloadBody::Json(value) => Ok(value),
            PayloadBody::Text(text) => Err(TransportError::MalformedPayload(format!(
                "expected JSON, got `{}`",
                text.chars().take(64).collect::<String>()
            ))),
        }
    }

    /// Body as a short status string.
    ///
    /// Admin answers like `OK` arrive as text, while `1` or `"OK"` parse as
    /// JSON scalars; both read the same here. Structured bodies give `None`.
    #[must_use]
    pub fn status_text(&self) -> Option<String> {
        match &self.body {
            PayloadBody::Text(text) => Some(text.clone()),
            PayloadBody::Json(Value::String(s)) => Some(s.trim().to_string()),
            PayloadBody::Json(Value::Number(n)) => Some(n.to_string()),
            PayloadBody::Json(Value::Bool(b)) => Some(if *b { "1" } else { "0" }.to_string()),
            PayloadBody::Json(_) => None,
        }
    }
}
