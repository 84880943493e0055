//! The session orchestrator.
//!
//! A [`Session`] owns one bootstrap state machine, one reference cache, one
//! set of search criteria, one admin login, and one notification dispatcher.
//! Network operations are spawned onto the tokio runtime and return an
//! [`OperationId`] immediately; their results arrive through the observer in
//! completion order.
//!
//! ```no_run
//! use std::sync::Arc;
//! use bmlt_client::{ChannelObserver, Session};
//!
//! # async fn demo() -> bmlt_protocol::BmltResult<()> {
//! let (observer, mut notifications) = ChannelObserver::new();
//! let session = Session::builder()
//!     .observer(Arc::new(observer))
//!     .connect("https://bmlt.example.org/main_server");
//!
//! session.wait_ready().await?;
//! session.search()?;
//! while let Some(notification) = notifications.recv().await {
//!     println!("{:?}", notification.event);
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bmlt_protocol::{
    BmltError, BmltResult, ChangeListFilter, ChangeNode, ChangeSet, DimensionKind,
    EditableMeetingNode, MeetingId, ResultExtent, SearchCriteria, SearchDimension,
};
use bmlt_transport::{Gateway, GatewayMetrics, HttpsGateway};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span};

use crate::admin::{AdminSession, LoginState};
use crate::bootstrap::{BootstrapState, Bootstrapper, uri_error};
use crate::cache::ReferenceCache;
use crate::config::SessionConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::edit::{EditContext, EditEngine};
use crate::notification::{Event, OperationId, SessionId, SessionObserver, TracingObserver};
use crate::search::{SearchEngine, SearchRequest};

/// Ticket of the bootstrap run
pub const BOOTSTRAP_OPERATION: OperationId = OperationId::new(1);

/// Builds a [`Session`]
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl SessionBuilder {
    /// Use `config` instead of the defaults
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Deliver notifications to `observer`; defaults to [`TracingObserver`]
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Start bootstrapping against `root_uri` over HTTPS.
    ///
    /// Returns at once; the outcome arrives as `server_validated`. A URI
    /// the gateway refuses ends the session in `Invalid` without any
    /// network traffic. Must be called from within a tokio runtime.
    pub fn connect(self, root_uri: &str) -> Session {
        let gateway = HttpsGateway::new(root_uri, self.config.gateway.clone())
            .map(|g| Arc::new(g) as Arc<dyn Gateway>)
            .map_err(uri_error);
        self.launch(gateway)
    }

    /// Start bootstrapping through an existing gateway.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect_via(self, gateway: Arc<dyn Gateway>) -> Session {
        self.launch(Ok(gateway))
    }

    fn launch(self, gateway: BmltResult<Arc<dyn Gateway>>) -> Session {
        let observer = self.observer.unwrap_or_else(|| Arc::new(TracingObserver));
        let (state, _) = watch::channel(BootstrapState::Uninitialized);
        let inner = Arc::new(SessionInner {
            id: SessionId::new(),
            config: self.config,
            gateway: gateway.as_ref().ok().cloned(),
            state,
            cache: RwLock::new(None),
            failure: RwLock::new(None),
            search: SearchEngine::default(),
            admin: AdminSession::default(),
            edits: EditEngine::default(),
            dispatcher: NotificationDispatcher::new(observer),
            publish_lock: Mutex::new(()),
            next_operation: AtomicU64::new(BOOTSTRAP_OPERATION.value() + 1),
        });

        let span = info_span!("bootstrap", session = %inner.id);
        tokio::spawn(SessionInner::bootstrap(Arc::clone(&inner), gateway).instrument(span));
        Session { inner }
    }
}

struct SessionInner {
    id: SessionId,
    config: SessionConfig,
    gateway: Option<Arc<dyn Gateway>>,
    state: watch::Sender<BootstrapState>,
    cache: RwLock<Option<Arc<ReferenceCache>>>,
    failure: RwLock<Option<BmltError>>,
    search: SearchEngine,
    admin: AdminSession,
    edits: EditEngine,
    dispatcher: Arc<NotificationDispatcher>,
    /// Held while a terminal state is entered and while a batch is
    /// published, so nothing issued after `Ready` can be delivered before
    /// `server_validated`
    publish_lock: Mutex<()>,
    next_operation: AtomicU64,
}

impl std::fmt::Debug for SessionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInner")
            .field("id", &self.id)
            .field("state", &*self.state.borrow())
            .field("login", &self.admin.login_state())
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    /// Move to `next` unless a terminal state was already reached.
    ///
    /// `on_enter` runs under the state lock, so nothing observes `next`
    /// before it has finished.
    fn advance(&self, next: BootstrapState, on_enter: impl FnOnce()) -> bool {
        let mut on_enter = Some(on_enter);
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            if let Some(enter) = on_enter.take() {
                enter();
            }
            *state = next;
            true
        })
    }

    fn set_state(&self, state: BootstrapState) {
        self.advance(state, || ());
    }

    async fn bootstrap(inner: Arc<Self>, gateway: BmltResult<Arc<dyn Gateway>>) {
        inner.set_state(BootstrapState::ValidatingUri);
        let outcome = match gateway {
            Ok(gateway) => {
                debug!(root = %gateway.root_uri().as_str(), "Root URI accepted");
                Bootstrapper::new(
                    gateway.as_ref(),
                    inner.config.minimum_server_version,
                    |state| inner.set_state(state),
                )
                .run()
                .await
            }
            Err(err) => Err(err),
        };

        let _publishing = inner.publish_lock.lock();
        let events = match outcome {
            Ok(cache) => {
                info!(
                    version = %cache.server_info().version,
                    formats = cache.formats().len(),
                    service_bodies = cache.service_bodies().len(),
                    "Session ready"
                );
                let entered = inner.advance(BootstrapState::Ready, || {
                    *inner.cache.write() = Some(cache);
                });
                if !entered {
                    debug!("Session shut down during bootstrap; reference data discarded");
                    return;
                }
                vec![Event::ServerValidated(true)]
            }
            Err(err) => {
                error!(kind = %err.kind, key = err.localization_key(), "Bootstrap failed: {}", err.message);
                let entered = inner.advance(BootstrapState::Invalid, || {
                    *inner.failure.write() = Some(err.clone());
                });
                if !entered {
                    return;
                }
                vec![Event::ErrorOccurred(err), Event::ServerValidated(false)]
            }
        };
        inner.dispatcher.publish(inner.id, BOOTSTRAP_OPERATION, events);
    }

    fn publish(&self, operation: OperationId, events: Vec<Event>) {
        let _publishing = self.publish_lock.lock();
        self.dispatcher.publish(self.id, operation, events);
    }

    /// Gateway and cache, or `SessionUnavailable` unless `Ready`
    fn ready(&self) -> BmltResult<(Arc<dyn Gateway>, Arc<ReferenceCache>)> {
        let state = *self.state.borrow();
        if state != BootstrapState::Ready {
            return Err(BmltError::unavailable(format!("session is {state}, not ready")));
        }
        match (&self.gateway, self.cache.read().as_ref()) {
            (Some(gateway), Some(cache)) => Ok((Arc::clone(gateway), Arc::clone(cache))),
            _ => Err(BmltError::unavailable("session has no reference data")),
        }
    }

    fn edit_context<'a>(&'a self, gateway: &'a dyn Gateway, cache: &'a ReferenceCache) -> EditContext<'a> {
        EditContext {
            gateway,
            cache,
            admin: &self.admin,
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}

/// Turn an operation result into its notification batch.
///
/// Failures produce `error_occurred` followed by the operation's own event
/// carrying an empty payload, so every operation ends with exactly one
/// terminal event.
fn settle<T, E>(result: BmltResult<T>, event: E, empty: T) -> Vec<Event>
where
    E: FnOnce(T) -> Event,
{
    match result {
        Ok(value) => vec![event(value)],
        Err(err) => {
            debug!(kind = %err.kind, "Operation failed: {}", err.message);
            vec![Event::ErrorOccurred(err), event(empty)]
        }
    }
}

/// Handle to a Root Server session.
///
/// Clones share the same session. The dispatcher stops when the last handle
/// and every in-flight operation are gone, or on [`Session::shutdown`].
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Start configuring a session
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Session id carried by every notification
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Configuration the session was built with
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current bootstrap state
    #[must_use]
    pub fn state(&self) -> BootstrapState {
        *self.inner.state.borrow()
    }

    /// Reference data, once `Ready`
    #[must_use]
    pub fn cache(&self) -> Option<Arc<ReferenceCache>> {
        self.inner.cache.read().clone()
    }

    /// Wait until bootstrap has finished.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap failure when the session ended `Invalid`, or
    /// `SessionUnavailable` when it was shut down first.
    pub async fn wait_ready(&self) -> BmltResult<Arc<ReferenceCache>> {
        let mut receiver = self.inner.state.subscribe();
        let state = *receiver
            .wait_for(|state| state.is_terminal())
            .await
            .map_err(|_| BmltError::unavailable("session closed during bootstrap"))?;

        match (state, self.cache()) {
            (BootstrapState::Ready, Some(cache)) => Ok(cache),
            _ => Err(self
                .inner
                .failure
                .read()
                .clone()
                .unwrap_or_else(|| BmltError::unavailable("session was shut down"))),
        }
    }

    /// Transport counters of the underlying gateway
    #[must_use]
    pub fn gateway_metrics(&self) -> Option<GatewayMetrics> {
        self.inner.gateway.as_ref().map(|g| g.metrics())
    }

    /// Stop accepting operations and stop the dispatcher once queued
    /// notifications are delivered. Operations already in flight still run,
    /// but their notifications are dropped.
    pub fn shutdown(&self) {
        info!(session = %self.inner.id, "Session shutting down");
        self.inner.state.send_replace(BootstrapState::Invalid);
        self.inner.dispatcher.shutdown();
    }

    // ----- search criteria (local, synchronous) -----

    /// Set one search dimension, replacing any earlier value
    pub fn set_criterion(&self, dimension: SearchDimension) {
        self.inner.search.set_criterion(dimension);
    }

    /// Remove one search dimension
    pub fn unset_criterion(&self, kind: DimensionKind) {
        self.inner.search.unset_criterion(kind);
    }

    /// Reset the criteria to "everything"
    pub fn clear_criteria(&self) {
        self.inner.search.clear_criteria();
    }

    /// Copy of the current criteria
    #[must_use]
    pub fn criteria(&self) -> SearchCriteria {
        self.inner.search.snapshot()
    }

    // ----- login state (local, synchronous) -----

    /// Whether an admin is logged in
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.inner.admin.is_logged_in()
    }

    /// Admin login state
    #[must_use]
    pub fn login_state(&self) -> LoginState {
        self.inner.admin.login_state()
    }

    /// Login name of the current admin
    #[must_use]
    pub fn admin_user(&self) -> Option<String> {
        self.inner.admin.user()
    }

    // ----- network operations -----

    fn run<F, Fut>(&self, name: &'static str, work: F) -> BmltResult<OperationId>
    where
        F: FnOnce(Arc<SessionInner>, Arc<dyn Gateway>, Arc<ReferenceCache>) -> Fut,
        Fut: Future<Output = Vec<Event>> + Send + 'static,
    {
        let (gateway, cache) = self.inner.ready()?;
        let operation = OperationId::new(self.inner.next_operation.fetch_add(1, Ordering::Relaxed));
        let span = info_span!("operation", session = %self.inner.id, %operation, name);
        debug!(parent: &span, "Operation issued");

        let inner = Arc::clone(&self.inner);
        let future = work(Arc::clone(&self.inner), gateway, cache);
        tokio::spawn(
            async move {
                let mut events = future.await;
                if inner.admin.take_expired() {
                    events.push(Event::LoginStateChanged(false));
                }
                inner.publish(operation, events);
            }
            .instrument(span),
        );
        Ok(operation)
    }

    /// Search with the current criteria; answers `search_results_ready`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn search(&self) -> BmltResult<OperationId> {
        self.search_with_extent(ResultExtent::MeetingsOnly)
    }

    /// Search and also return the formats the results use.
    ///
    /// Meetings-and-formats answers `search_results_ready` then
    /// `format_search_results_ready`; formats-only answers only the latter.
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn search_with_extent(&self, extent: ResultExtent) -> BmltResult<OperationId> {
        let criteria = self.inner.search.snapshot();
        self.run("search", move |inner, gateway, cache| async move {
            let request = SearchRequest {
                gateway: gateway.as_ref(),
                cache: &cache,
                credential: inner.admin.credential(),
                timeout: inner.config.search_timeout,
            };
            match request.execute(&criteria, extent).await {
                Ok(outcome) => {
                    let mut events = Vec::with_capacity(2);
                    if extent != ResultExtent::FormatsOnly {
                        events.push(Event::SearchResultsReady(outcome.meetings));
                    }
                    if let Some(formats) = outcome.formats {
                        events.push(Event::FormatSearchResultsReady {
                            formats,
                            all_used: false,
                        });
                    }
                    events
                }
                Err(err) => {
                    let terminal = match extent {
                        ResultExtent::FormatsOnly => Event::FormatSearchResultsReady {
                            formats: Vec::new(),
                            all_used: false,
                        },
                        _ => Event::SearchResultsReady(Vec::new()),
                    };
                    vec![Event::ErrorOccurred(err), terminal]
                }
            }
        })
    }

    /// Reload every format any meeting uses; answers
    /// `format_search_results_ready` with `all_used` set
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn fetch_all_used_formats(&self) -> BmltResult<OperationId> {
        self.run("fetch_all_used_formats", |inner, gateway, cache| async move {
            let request = SearchRequest {
                gateway: gateway.as_ref(),
                cache: &cache,
                credential: None,
                timeout: inner.config.search_timeout,
            };
            let result = request
                .execute(&SearchCriteria::new(), ResultExtent::FormatsOnly)
                .await
                .map(|outcome| {
                    let formats = outcome.formats.unwrap_or_default();
                    cache.set_used_formats(formats.clone());
                    formats
                });
            settle(
                result,
                |formats| Event::FormatSearchResultsReady {
                    formats,
                    all_used: true,
                },
                Vec::new(),
            )
        })
    }

    /// Log in as an administrator; answers `login_state_changed`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn login(&self, user: impl Into<String>, password: impl Into<String>) -> BmltResult<OperationId> {
        let user = user.into();
        let password = password.into();
        self.run("login", move |inner, gateway, cache| async move {
            let result = inner
                .admin
                .login(gateway.as_ref(), cache.server_info().admin_available, &user, &password)
                .await;
            let logged_in = inner.admin.is_logged_in();
            settle(result.map(|()| logged_in), Event::LoginStateChanged, logged_in)
        })
    }

    /// Log out; answers `login_state_changed(false)`, preceded by
    /// `error_occurred` when the server did not acknowledge
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn logout(&self) -> BmltResult<OperationId> {
        self.run("logout", |inner, gateway, _cache| async move {
            let result = inner.admin.logout(gateway.as_ref()).await;
            settle(result.map(|()| false), Event::LoginStateChanged, false)
        })
    }

    /// Create a meeting; answers `meeting_added`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn add_meeting(&self, meeting: EditableMeetingNode) -> BmltResult<OperationId> {
        self.run("add_meeting", move |inner, gateway, cache| async move {
            let ctx = inner.edit_context(gateway.as_ref(), &cache);
            let result = inner.edits.add_meeting(ctx, &meeting).await;
            settle(result.map(Some), Event::MeetingAdded, None)
        })
    }

    /// Add an unpublished copy of `meeting`; answers `meeting_added`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn save_meeting_as_copy(&self, meeting: EditableMeetingNode) -> BmltResult<OperationId> {
        self.run("save_meeting_as_copy", move |inner, gateway, cache| async move {
            let ctx = inner.edit_context(gateway.as_ref(), &cache);
            let result = inner.edits.save_as_copy(ctx, &meeting).await;
            settle(result.map(Some), Event::MeetingAdded, None)
        })
    }

    /// Undelete a meeting; answers `meeting_added`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn restore_deleted_meeting(&self, meeting_id: MeetingId) -> BmltResult<OperationId> {
        self.run("restore_deleted_meeting", move |inner, gateway, cache| async move {
            let ctx = inner.edit_context(gateway.as_ref(), &cache);
            let result = inner.edits.restore_deleted_meeting(ctx, meeting_id).await;
            settle(result.map(Some), Event::MeetingAdded, None)
        })
    }

    /// Commit field changes to a meeting; answers `meeting_edit_committed`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn commit_edit(&self, meeting_id: MeetingId, changes: ChangeSet) -> BmltResult<OperationId> {
        self.run("commit_edit", move |inner, gateway, cache| async move {
            let ctx = inner.edit_context(gateway.as_ref(), &cache);
            let result = inner.edits.commit_edit(ctx, meeting_id, &changes).await;
            settle(result.map(Some), Event::MeetingEditCommitted, None)
        })
    }

    /// Delete a meeting; answers `meeting_deleted`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn delete_meeting(&self, meeting_id: MeetingId) -> BmltResult<OperationId> {
        self.run("delete_meeting", move |inner, gateway, cache| async move {
            let ctx = inner.edit_context(gateway.as_ref(), &cache);
            let result = inner.edits.delete_meeting(ctx, meeting_id).await;
            settle(result.map(|()| true), Event::MeetingDeleted, false)
        })
    }

    /// Revert a meeting to the state before `change`; answers
    /// `meeting_rolled_back`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn rollback_meeting(&self, meeting_id: MeetingId, change: ChangeNode) -> BmltResult<OperationId> {
        self.run("rollback_meeting", move |inner, gateway, cache| async move {
            let ctx = inner.edit_context(gateway.as_ref(), &cache);
            let result = inner.edits.rollback_meeting(ctx, meeting_id, &change).await;
            settle(result.map(Some), Event::MeetingRolledBack, None)
        })
    }

    /// Load change history, newest first; answers `change_list_ready`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn fetch_change_list(&self, filter: ChangeListFilter) -> BmltResult<OperationId> {
        self.run("fetch_change_list", move |inner, gateway, cache| async move {
            let ctx = inner.edit_context(gateway.as_ref(), &cache);
            let result = inner.edits.fetch_change_list(ctx, filter).await;
            settle(result, Event::ChangeListReady, Vec::new())
        })
    }

    /// Load restorable deleted meetings; answers `deleted_meetings_ready`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn fetch_deleted_meetings(&self, filter: ChangeListFilter) -> BmltResult<OperationId> {
        self.run("fetch_deleted_meetings", move |inner, gateway, cache| async move {
            let ctx = inner.edit_context(gateway.as_ref(), &cache);
            let result = inner.edits.fetch_deleted_meetings(ctx, filter).await;
            settle(result, Event::DeletedMeetingsReady, Vec::new())
        })
    }

    /// Email a meeting's contact; answers `message_send_completed`
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` unless the session is `Ready`.
    pub fn send_message(
        &self,
        meeting_id: MeetingId,
        from: impl Into<String>,
        message: impl Into<String>,
    ) -> BmltResult<OperationId> {
        let from = from.into();
        let message = message.into();
        self.run("send_message", move |inner, gateway, cache| async move {
            let ctx = inner.edit_context(gateway.as_ref(), &cache);
            let result = inner.edits.send_message(ctx, meeting_id, &from, &message).await;
            settle(result.map(|()| true), Event::MessageSendCompleted, false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmlt_protocol::ErrorKind;

    #[test]
    fn settle_reports_one_terminal_event() {
        let ok = settle(Ok(true), Event::MeetingDeleted, false);
        assert_eq!(ok, vec![Event::MeetingDeleted(true)]);

        let err = settle(Err(BmltError::unauthorized("nope")), Event::MeetingDeleted, false);
        assert_eq!(err.len(), 2);
        assert!(matches!(&err[0], Event::ErrorOccurred(e) if e.kind == ErrorKind::Unauthorized));
        assert_eq!(err[1], Event::MeetingDeleted(false));
    }

    #[tokio::test]
    async fn refused_uri_invalidates_without_traffic() {
        let session = Session::builder().connect("ftp://example.org");
        let err = session.wait_ready().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidUri);
        assert_eq!(session.state(), BootstrapState::Invalid);
        assert!(session.cache().is_none());
        assert_eq!(session.search().unwrap_err().kind, ErrorKind::SessionUnavailable);
    }
}
