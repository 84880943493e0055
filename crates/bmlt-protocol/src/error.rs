//! Unified error type for Root Server operations.
//!
//! Every failure surfaced to a host carries an [`ErrorKind`] for programmatic
//! handling, a human-readable message, a legacy numeric [`ErrorCode`], and a
//! localization key the host can use to look up display text.
//!
//! ```rust
//! use bmlt_protocol::{BmltError, ErrorKind};
//!
//! let err = BmltError::not_found("meeting 42");
//! assert_eq!(err.kind, ErrorKind::NotFound);
//! assert_eq!(err.localization_key(), "BMLTClientError-NotFound");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for Root Server operations
pub type BmltResult<T> = std::result::Result<T, BmltError>;

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    /// The root URI is malformed or not served over encrypted transport
    InvalidUri,
    /// Network, timeout, or TLS failure
    TransportFailure,
    /// Version or key-set mismatch detected during bootstrap
    ServerIncompatible,
    /// The server answered with something that could not be decoded
    MalformedPayload,
    /// Credential or privilege failure
    Unauthorized,
    /// Unknown meeting, or rollback beyond the retained change depth
    NotFound,
    /// The server (or a local pre-check) refused submitted field values
    ValidationRejected,
    /// The session is not ready, or has been invalidated
    SessionUnavailable,
}

impl ErrorKind {
    /// Localization key for this kind
    #[must_use]
    pub const fn localization_key(self) -> &'static str {
        match self {
            Self::InvalidUri => "BMLTClientError-InvalidUri",
            Self::TransportFailure => "BMLTClientError-TransportFailure",
            Self::ServerIncompatible => "BMLTClientError-ServerIncompatible",
            Self::MalformedPayload => "BMLTClientError-MalformedPayload",
            Self::Unauthorized => "BMLTClientError-Unauthorized",
            Self::NotFound => "BMLTClientError-NotFound",
            Self::ValidationRejected => "BMLTClientError-ValidationRejected",
            Self::SessionUnavailable => "BMLTClientError-SessionUnavailable",
        }
    }

    /// Legacy numeric code reported when no more specific code applies
    #[must_use]
    pub const fn default_code(self) -> ErrorCode {
        match self {
            Self::TransportFailure | Self::NotFound => ErrorCode::NoData,
            Self::ServerIncompatible | Self::MalformedPayload => ErrorCode::BadData,
            Self::Unauthorized => ErrorCode::IncorrectCredentials,
            Self::InvalidUri | Self::ValidationRejected | Self::SessionUnavailable => {
                ErrorCode::GeneralError
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidUri => "invalid URI",
            Self::TransportFailure => "transport failure",
            Self::ServerIncompatible => "server incompatible",
            Self::MalformedPayload => "malformed payload",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not found",
            Self::ValidationRejected => "validation rejected",
            Self::SessionUnavailable => "session unavailable",
        };
        f.write_str(name)
    }
}

/// Numeric error codes shared with other Root Server clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Unclassified failure
    GeneralError,
    /// No data was received
    NoData,
    /// Data was received but could not be used
    BadData,
    /// Login name or password was refused
    IncorrectCredentials,
    /// The contact message could not be sent for an unknown reason
    SendingUnknown,
    /// The sender address of a contact message is invalid
    InvalidFrom,
    /// The contact message was classified as spam
    Spam,
}

impl ErrorCode {
    /// Numeric value of the code
    #[must_use]
    pub const fn value(self) -> u32 {
        match self {
            Self::GeneralError => 101_000,
            Self::NoData => 101_010,
            Self::BadData => 101_020,
            Self::IncorrectCredentials => 201_000,
            Self::SendingUnknown => 301_000,
            Self::InvalidFrom => 301_020,
            Self::Spam => 301_030,
        }
    }
}

/// Why a server failed the bootstrap handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum BootstrapFailure {
    /// The URI could not be used
    BadUri,
    /// The server version is below the supported minimum
    WrongVersion,
    /// The server lacks one or more standard meeting keys
    MissingFields,
    /// The server returned no usable service bodies
    NoServiceBodies,
    /// The server returned no formats
    NoFormats,
    /// The server returned no languages
    NoLanguages,
    /// A network call failed mid-handshake
    CommError,
    /// An answer could not be decoded
    BadData,
}

impl BootstrapFailure {
    /// Localization key describing the reason
    #[must_use]
    pub const fn localization_key(self) -> &'static str {
        match self {
            Self::BadUri => "BMLTClientBadTestReason-BadUri",
            Self::WrongVersion => "BMLTClientBadTestReason-WrongVersion",
            Self::MissingFields => "BMLTClientBadTestReason-MissingFields",
            Self::NoServiceBodies => "BMLTClientBadTestReason-NoServiceBodies",
            Self::NoFormats => "BMLTClientBadTestReason-NoFormats",
            Self::NoLanguages => "BMLTClientBadTestReason-NoLanguages",
            Self::CommError => "BMLTClientBadTestReason-CommError",
            Self::BadData => "BMLTClientBadTestReason-BadData",
        }
    }
}

/// Unified error type
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct BmltError {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Legacy numeric code
    pub code: ErrorCode,
    localization_key: String,
}

impl BmltError {
    /// Create an error with the kind's default code and localization key
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: kind.default_code(),
            localization_key: kind.localization_key().to_string(),
        }
    }

    /// Bad or insecure root URI
    #[must_use]
    pub fn invalid_uri(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidUri, message)
    }

    /// Network, timeout, or TLS failure
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportFailure, message)
    }

    /// Undecodable server answer
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedPayload, message)
    }

    /// Credential or privilege failure
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// Missing entity or history entry
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Refused field values
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationRejected, message)
    }

    /// Operation issued to a session that cannot accept it
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionUnavailable, message)
    }

    /// Bootstrap failure with a specific reason.
    ///
    /// The localization key is the reason's key, so hosts can explain why a
    /// server was refused.
    #[must_use]
    pub fn bootstrap(kind: ErrorKind, reason: BootstrapFailure, message: impl Into<String>) -> Self {
        Self::new(kind, message).with_localization_key(reason.localization_key())
    }

    /// Replace the legacy code
    #[must_use]
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    /// Replace the localization key
    #[must_use]
    pub fn with_localization_key(mut self, key: impl Into<String>) -> Self {
        self.localization_key = key.into();
        self
    }

    /// Localization key for display text
    #[must_use]
    pub fn localization_key(&self) -> &str {
        &self.localization_key
    }

    /// Whether the error came from the network layer
    #[must_use]
    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::TransportFailure
    }
}

impl From<serde_json::Error> for BmltError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_codes_follow_kind() {
        assert_eq!(
            BmltError::unauthorized("x").code,
            ErrorCode::IncorrectCredentials
        );
        assert_eq!(BmltError::malformed("x").code.value(), 101_020);
        assert_eq!(BmltError::transport("x").code.value(), 101_010);
    }

    #[test]
    fn bootstrap_error_uses_reason_key() {
        let err = BmltError::bootstrap(
            ErrorKind::ServerIncompatible,
            BootstrapFailure::WrongVersion,
            "2.6.0 is too old",
        );
        assert_eq!(err.kind, ErrorKind::ServerIncompatible);
        assert_eq!(
            err.localization_key(),
            "BMLTClientBadTestReason-WrongVersion"
        );
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = BmltError::rejected("no fields").with_code(ErrorCode::InvalidFrom);
        assert_eq!(err.to_string(), "validation rejected: no fields");
        assert_eq!(err.code.value(), 301_020);
    }
}
