//! Admin login state machine.
//!
//! ```text
//! LoggedOut → LoggingIn → LoggedIn → LoggingOut → LoggedOut
//!                 └──(refused)──► LoggedOut
//! ```
//!
//! Transitions are serialized: a second login or logout waits for the one
//! in progress to settle. The credential lives only in memory and is never
//! logged.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use bmlt_protocol::{
    BmltError, BmltResult, ErrorCode, Operation, Params, PrivilegeLevel, ServiceBodyId,
    ServiceBodyPermission, decode_permissions,
};
use bmlt_transport::{Credential, Gateway, GatewayRequest, Payload};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Answer the admin interface gives to a refused call
pub(crate) const NOT_AUTHORIZED: &str = "NOT AUTHORIZED";

/// Admin login state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoginState {
    /// No credential held
    #[default]
    LoggedOut,
    /// Login request in flight
    LoggingIn,
    /// Credential held and confirmed
    LoggedIn,
    /// Logout request in flight
    LoggingOut,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoggedOut => "logged_out",
            Self::LoggingIn => "logging_in",
            Self::LoggedIn => "logged_in",
            Self::LoggingOut => "logging_out",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct AdminState {
    login: LoginState,
    credential: Option<Credential>,
    user: Option<String>,
}

/// Login state, credential, and privilege checks
#[derive(Debug, Default)]
pub(crate) struct AdminSession {
    state: Mutex<AdminState>,
    transition: tokio::sync::Mutex<()>,
    /// Set when the server ended the admin session behind the host's back
    expired: AtomicBool,
}

impl AdminSession {
    pub(crate) fn login_state(&self) -> LoginState {
        self.state.lock().login
    }

    pub(crate) fn is_logged_in(&self) -> bool {
        self.login_state() == LoginState::LoggedIn
    }

    /// Credential, only while logged in
    pub(crate) fn credential(&self) -> Option<Credential> {
        let state = self.state.lock();
        match state.login {
            LoginState::LoggedIn => state.credential.clone(),
            _ => None,
        }
    }

    pub(crate) fn user(&self) -> Option<String> {
        self.state.lock().user.clone()
    }

    /// Credential or `Unauthorized`
    pub(crate) fn require_login(&self) -> BmltResult<Option<Credential>> {
        if self.is_logged_in() {
            Ok(self.credential())
        } else {
            Err(BmltError::unauthorized("not logged in as an administrator"))
        }
    }

    /// Whether the server dropped the login since the last call; clears the
    /// flag
    pub(crate) fn take_expired(&self) -> bool {
        self.expired.swap(false, Ordering::AcqRel)
    }

    fn set_login(&self, login: LoginState) {
        debug!(state = %login, "Admin login state");
        self.state.lock().login = login;
    }

    /// Log in.
    ///
    /// Succeeds only on an explicit `OK` followed by a non-empty permission
    /// list. Calling while logged in is a successful no-op.
    pub(crate) async fn login(
        &self,
        gateway: &dyn Gateway,
        admin_available: bool,
        user: &str,
        password: &str,
    ) -> BmltResult<()> {
        let _guard = self.transition.lock().await;
        self.expired.store(false, Ordering::Release);

        if self.is_logged_in() {
            debug!("Login requested while already logged in");
            return Ok(());
        }
        if !admin_available {
            return Err(BmltError::unauthorized(
                "semantic administration is not enabled on this server",
            ));
        }

        self.set_login(LoginState::LoggingIn);
        match self.try_login(gateway, user, password).await {
            Ok((credential, permissions)) => {
                let mut state = self.state.lock();
                state.login = LoginState::LoggedIn;
                state.credential = credential;
                state.user = Some(user.to_string());
                info!(user, service_bodies = permissions.len(), "Admin login succeeded");
                Ok(())
            }
            Err(err) => {
                *self.state.lock() = AdminState::default();
                warn!(user, error = %err, "Admin login failed");
                Err(err)
            }
        }
    }

    async fn try_login(
        &self,
        gateway: &dyn Gateway,
        user: &str,
        password: &str,
    ) -> BmltResult<(Option<Credential>, Vec<ServiceBodyPermission>)> {
        let params = Params::new()
            .with("c_comdef_admin_login", user)
            .with("c_comdef_admin_password", password);
        let payload = gateway
            .request(GatewayRequest::new(Operation::Login, params))
            .await?;

        match payload.status_text().as_deref() {
            Some("OK") => {}
            Some(NOT_AUTHORIZED) => {
                return Err(BmltError::unauthorized("login name or password refused")
                    .with_code(ErrorCode::IncorrectCredentials));
            }
            _ => return Err(BmltError::malformed("unexpected login answer")),
        }

        let credential = payload.credential;
        let permissions = fetch_permissions(gateway, credential.clone()).await?;
        if permissions.is_empty() {
            return Err(BmltError::unauthorized("account has no service body permissions")
                .with_code(ErrorCode::IncorrectCredentials));
        }
        Ok((credential, permissions))
    }

    /// Log out. Local state always ends `LoggedOut`; the result says whether
    /// the server acknowledged.
    pub(crate) async fn logout(&self, gateway: &dyn Gateway) -> BmltResult<()> {
        let _guard = self.transition.lock().await;
        self.expired.store(false, Ordering::Release);

        let credential = {
            let mut state = self.state.lock();
            if state.login == LoginState::LoggedOut {
                debug!("Logout requested while logged out");
                return Ok(());
            }
            state.login = LoginState::LoggingOut;
            state.user = None;
            state.credential.take()
        };

        let result = gateway
            .request(GatewayRequest::new(Operation::Logout, Params::new()).with_credential(credential))
            .await
            .map_err(BmltError::from)
            .and_then(|payload| match payload.status_text().as_deref() {
                Some(NOT_AUTHORIZED) => Err(BmltError::unauthorized("server refused the logout")),
                _ => Ok(()),
            });

        self.set_login(LoginState::LoggedOut);
        match &result {
            Ok(()) => info!("Admin logged out"),
            Err(err) => warn!(error = %err, "Logged out locally; server did not acknowledge"),
        }
        result
    }

    /// Current permissions, fetched fresh from the server.
    ///
    /// A `NOT AUTHORIZED` answer means the server dropped the session; the
    /// local state follows it to `LoggedOut` and [`Self::take_expired`]
    /// reports it once.
    pub(crate) async fn permissions(&self, gateway: &dyn Gateway) -> BmltResult<Vec<ServiceBodyPermission>> {
        let credential = self.require_login()?;
        match fetch_permissions(gateway, credential).await {
            Err(err) if err.kind == bmlt_protocol::ErrorKind::Unauthorized => {
                warn!("Server no longer recognizes the admin session");
                let mut state = self.state.lock();
                if state.login == LoginState::LoggedIn {
                    self.expired.store(true, Ordering::Release);
                }
                *state = AdminState::default();
                Err(err)
            }
            other => other,
        }
    }

    /// Require at least `Editor` over `service_body_id`, checked against the
    /// server now
    pub(crate) async fn require_editor(
        &self,
        gateway: &dyn Gateway,
        service_body_id: ServiceBodyId,
    ) -> BmltResult<PrivilegeLevel> {
        let level = self
            .permissions(gateway)
            .await?
            .into_iter()
            .find(|p| p.service_body_id == service_body_id)
            .map(|p| p.level)
            .unwrap_or_default();

        if level.can_edit() {
            Ok(level)
        } else {
            Err(BmltError::unauthorized(format!(
                "no edit privilege for service body {service_body_id}"
            )))
        }
    }
}

async fn fetch_permissions(
    gateway: &dyn Gateway,
    credential: Option<Credential>,
) -> BmltResult<Vec<ServiceBodyPermission>> {
    let payload = gateway
        .request(GatewayRequest::new(Operation::Permissions, Params::new()).with_credential(credential))
        .await?;
    let value = refuse_not_authorized(payload)?.into_json()?;
    decode_permissions(&value)
}

/// Turn a `NOT AUTHORIZED` answer into an error
pub(crate) fn refuse_not_authorized(payload: Payload) -> BmltResult<Payload> {
    if payload.status_text().as_deref() == Some(NOT_AUTHORIZED) {
        Err(BmltError::unauthorized("the server refused the request"))
    } else {
        Ok(payload)
    }
}
