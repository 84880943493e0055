//! Bootstrap handshake.
//!
//! ```text
//! Uninitialized → ValidatingUri → LoadingCapabilities → LoadingFormats
//!               → LoadingServiceBodies → LoadingLanguages → Ready | Invalid
//! ```
//!
//! Steps run strictly in sequence. The first failure ends the run in
//! `Invalid`; nothing is cached until the last step has succeeded, at which
//! point the whole [`ReferenceCache`] is assembled at once.

use std::fmt;
use std::sync::Arc;

use bmlt_protocol::{
    BmltError, BmltResult, BootstrapFailure, ErrorKind, Operation, Params, ServerInfo,
    ServiceBodyTree, decode_formats, decode_languages, decode_service_bodies,
};
use bmlt_transport::{Gateway, GatewayRequest, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::ReferenceCache;

/// Position in the bootstrap state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BootstrapState {
    /// Session created, nothing started
    Uninitialized,
    /// Checking the root URI
    ValidatingUri,
    /// Fetching server info
    LoadingCapabilities,
    /// Fetching the format catalog
    LoadingFormats,
    /// Fetching and linking service bodies
    LoadingServiceBodies,
    /// Fetching languages
    LoadingLanguages,
    /// Terminal success; operations accepted
    Ready,
    /// Terminal failure, or shut down
    Invalid,
}

impl BootstrapState {
    /// Whether no further transitions will happen
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Invalid)
    }
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::ValidatingUri => "validating_uri",
            Self::LoadingCapabilities => "loading_capabilities",
            Self::LoadingFormats => "loading_formats",
            Self::LoadingServiceBodies => "loading_service_bodies",
            Self::LoadingLanguages => "loading_languages",
            Self::Ready => "ready",
            Self::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Runs the loading steps against a gateway, reporting each transition
pub(crate) struct Bootstrapper<'a, F>
where
    F: Fn(BootstrapState),
{
    gateway: &'a dyn Gateway,
    minimum_version: u32,
    on_transition: F,
}

impl<'a, F> Bootstrapper<'a, F>
where
    F: Fn(BootstrapState),
{
    pub(crate) fn new(gateway: &'a dyn Gateway, minimum_version: u32, on_transition: F) -> Self {
        Self {
            gateway,
            minimum_version,
            on_transition,
        }
    }

    /// Run every loading step; the cache exists only if all succeed
    pub(crate) async fn run(&self) -> BmltResult<Arc<ReferenceCache>> {
        self.enter(BootstrapState::LoadingCapabilities);
        let info = self.load_capabilities().await?;

        self.enter(BootstrapState::LoadingFormats);
        let formats = decode_formats(&self.fetch(Operation::Formats).await?).map_err(bad_data)?;
        if formats.is_empty() {
            return Err(incompatible(BootstrapFailure::NoFormats, "server defines no formats"));
        }

        self.enter(BootstrapState::LoadingServiceBodies);
        let bodies = decode_service_bodies(&self.fetch(Operation::ServiceBodies).await?)
            .map_err(bad_data)?;
        if bodies.is_empty() {
            return Err(incompatible(
                BootstrapFailure::NoServiceBodies,
                "server has no service bodies",
            ));
        }
        let tree = ServiceBodyTree::build(bodies).map_err(|e| bad_data(e.into()))?;

        self.enter(BootstrapState::LoadingLanguages);
        let languages = decode_languages(
            &self.fetch(Operation::Languages).await?,
            &info.native_language,
        )
        .map_err(bad_data)?;
        if languages.is_empty() {
            return Err(incompatible(BootstrapFailure::NoLanguages, "server offers no languages"));
        }

        debug!(
            formats = formats.len(),
            service_bodies = tree.len(),
            languages = languages.len(),
            "Reference data loaded"
        );
        Ok(Arc::new(ReferenceCache::new(info, formats, tree, languages)))
    }

    async fn load_capabilities(&self) -> BmltResult<ServerInfo> {
        let info = ServerInfo::decode(&self.fetch(Operation::ServerInfo).await?).map_err(bad_data)?;

        if !info.meets_version(self.minimum_version) {
            return Err(incompatible(
                BootstrapFailure::WrongVersion,
                format!(
                    "server version {} ({}) is older than the required {}",
                    info.version, info.version_int, self.minimum_version
                ),
            ));
        }

        let missing = info.available_keys.missing_standard();
        if !missing.is_empty() {
            return Err(incompatible(
                BootstrapFailure::MissingFields,
                format!("server does not publish: {}", missing.join(", ")),
            ));
        }

        info!(
            version = %info.version,
            change_depth = info.change_depth,
            admin = info.admin_available,
            "Root Server capabilities accepted"
        );
        Ok(info)
    }

    async fn fetch(&self, operation: Operation) -> BmltResult<Value> {
        self.gateway
            .request(GatewayRequest::new(operation, Params::new()))
            .await
            .map_err(comm_error)?
            .into_json()
            .map_err(|e| bad_data(e.into()))
    }

    fn enter(&self, state: BootstrapState) {
        debug!(%state, "Bootstrap step");
        (self.on_transition)(state);
    }
}

/// Error for a root URI the gateway refused
pub(crate) fn uri_error(err: TransportError) -> BmltError {
    match err {
        TransportError::InvalidUri { .. } | TransportError::InsecureUri(_) => {
            BmltError::bootstrap(ErrorKind::InvalidUri, BootstrapFailure::BadUri, err.to_string())
        }
        other => comm_error(other),
    }
}

fn comm_error(err: TransportError) -> BmltError {
    let err: BmltError = err.into();
    let kind = match err.kind {
        ErrorKind::MalformedPayload => ErrorKind::MalformedPayload,
        _ => ErrorKind::TransportFailure,
    };
    let reason = match kind {
        ErrorKind::MalformedPayload => BootstrapFailure::BadData,
        _ => BootstrapFailure::CommError,
    };
    BmltError::bootstrap(kind, reason, err.message)
}

fn bad_data(err: BmltError) -> BmltError {
    BmltError::bootstrap(ErrorKind::MalformedPayload, BootstrapFailure::BadData, err.message)
        .with_code(err.code)
}

fn incompatible(reason: BootstrapFailure, message: impl Into<String>) -> BmltError {
    BmltError::bootstrap(ErrorKind::ServerIncompatible, reason, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(BootstrapState::Ready.is_terminal());
        assert!(BootstrapState::Invalid.is_terminal());
        assert!(!BootstrapState::LoadingFormats.is_terminal());
        assert_eq!(BootstrapState::LoadingServiceBodies.to_string(), "loading_service_bodies");
    }

    #[test]
    fn uri_errors_carry_bad_uri_reason() {
        let err = uri_error(TransportError::InsecureUri("http://x".into()));
        assert_eq!(err.kind, ErrorKind::InvalidUri);
        assert_eq!(err.localization_key(), "BMLTClientBadTestReason-BadUri");

        let err = uri_error(TransportError::ConfigurationError("no tls".into()));
        assert_eq!(err.kind, ErrorKind::TransportFailure);
        assert_eq!(err.localization_key(), "BMLTClientBadTestReason-CommError");
    }
}
