//! Transport error types.

use std::time::Duration;

use bmlt_protocol::{BmltError, ErrorCode, ErrorKind, Operation};
use thiserror::Error;

/// Result alias for gateway operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Failures raised between the session and the Root Server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The root URI could not be parsed
    #[error("Invalid root URI `{uri}`: {reason}")]
    InvalidUri {
        /// The rejected input
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// The root URI is not encrypted
    #[error("Refusing unencrypted root URI `{0}`; the Root Server must be reached over HTTPS")]
    InsecureUri(String),

    /// Connect or I/O failure
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No answer within the configured timeout
    #[error("Request timed out after {timeout:?} for operation: {operation}")]
    RequestTimeout {
        /// Operation that timed out
        operation: Operation,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Handshake or certificate failure
    #[error("TLS failure: {0}")]
    Tls(String),

    /// Non-success HTTP status
    #[error("HTTP status {status} for operation: {operation}")]
    HttpStatus {
        /// Operation that failed
        operation: Operation,
        /// Status code
        status: u16,
    },

    /// Body could not be read or decoded
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Body larger than the configured limit
    #[error("Response of {size} bytes exceeds the {limit} byte limit")]
    ResponseTooLarge {
        /// Received size
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Client could not be built from the configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl TransportError {
    /// Whether retrying the same request could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::RequestTimeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<TransportError> for BmltError {
    fn from(err: TransportError) -> Self {
        let message = err.to_string();
        match err {
            TransportError::InvalidUri { .. } | TransportError::InsecureUri(_) => {
                Self::invalid_uri(message)
            }
            TransportError::MalformedPayload(_) | TransportError::ResponseTooLarge { .. } => {
                Self::malformed(message).with_code(ErrorCode::BadData)
            }
            TransportError::HttpStatus {
                status: 401 | 403, ..
            } => Self::new(ErrorKind::Unauthorized, message),
            _ => Self::transport(message),
        }
    }
}
