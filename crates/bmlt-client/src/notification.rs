//! Notification contract between a session and its host.
//!
//! Every completed operation produces one batch of [`Notification`]s. A
//! batch holds at most one error followed by exactly one terminal event, and
//! batches reach the [`SessionObserver`] one at a time in completion order.
//!
//! Only [`SessionObserver::server_validated`] and
//! [`SessionObserver::error_occurred`] must be implemented; every other
//! event has an empty default.
//!
//! ```rust
//! use async_trait::async_trait;
//! use bmlt_client::{BmltError, MeetingNode, NotificationContext, SessionObserver};
//!
//! #[derive(Debug)]
//! struct Printer;
//!
//! #[async_trait]
//! impl SessionObserver for Printer {
//!     async fn server_validated(&self, _ctx: NotificationContext, valid: bool) {
//!         println!("server valid: {valid}");
//!     }
//!
//!     async fn error_occurred(&self, ctx: NotificationContext, error: BmltError) {
//!         eprintln!("{} failed: {}", ctx.operation, error);
//!     }
//!
//!     async fn search_results_ready(&self, _ctx: NotificationContext, meetings: Vec<MeetingNode>) {
//!         println!("{} meetings", meetings.len());
//!     }
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use bmlt_protocol::{
    BmltError, ChangeNode, ChangedMeeting, EditableMeetingNode, FormatNode, MeetingNode,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity of one session instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ticket returned by every issued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Sequence number within the session; the bootstrap is `1`
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Where a notification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationContext {
    /// Originating session
    pub session: SessionId,
    /// Operation that completed
    pub operation: OperationId,
}

/// Payload of one notification
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// Bootstrap finished; exactly once per session
    ServerValidated(bool),
    /// An operation failed
    ErrorOccurred(BmltError),
    /// Search results; empty on failure
    SearchResultsReady(Vec<MeetingNode>),
    /// Format list from a search
    FormatSearchResultsReady {
        /// Formats found
        formats: Vec<FormatNode>,
        /// Whether this is the "all used formats" list
        all_used: bool,
    },
    /// Change history, newest first; empty on failure
    ChangeListReady(Vec<ChangeNode>),
    /// Latest delete of each meeting that no longer exists
    DeletedMeetingsReady(Vec<ChangeNode>),
    /// Result of a login or logout call
    LoginStateChanged(bool),
    /// Created or restored meeting; `None` on failure
    MeetingAdded(Option<MeetingNode>),
    /// Meeting after a rollback; `None` on failure
    MeetingRolledBack(Option<EditableMeetingNode>),
    /// Server-confirmed edit; `None` on failure
    MeetingEditCommitted(Option<ChangedMeeting>),
    /// Whether the delete succeeded
    MeetingDeleted(bool),
    /// Whether the contact message was sent
    MessageSendCompleted(bool),
}

impl Event {
    /// Short name used in logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ServerValidated(_) => "server_validated",
            Self::ErrorOccurred(_) => "error_occurred",
            Self::SearchResultsReady(_) => "search_results_ready",
            Self::FormatSearchResultsReady { .. } => "format_search_results_ready",
            Self::ChangeListReady(_) => "change_list_ready",
            Self::DeletedMeetingsReady(_) => "deleted_meetings_ready",
            Self::LoginStateChanged(_) => "login_state_changed",
            Self::MeetingAdded(_) => "meeting_added",
            Self::MeetingRolledBack(_) => "meeting_rolled_back",
            Self::MeetingEditCommitted(_) => "meeting_edit_committed",
            Self::MeetingDeleted(_) => "meeting_deleted",
            Self::MessageSendCompleted(_) => "message_send_completed",
        }
    }
}

/// One delivered notification
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Originating session and operation
    pub context: NotificationContext,
    /// What happened
    pub event: Event,
}

/// Host-side receiver of session notifications.
///
/// Calls never overlap: the next notification is delivered only after the
/// previous call returns.
#[async_trait]
pub trait SessionObserver: Send + Sync + fmt::Debug {
    /// Bootstrap outcome; fires exactly once per session
    async fn server_validated(&self, ctx: NotificationContext, valid: bool);

    /// An operation failed
    async fn error_occurred(&self, ctx: NotificationContext, error: BmltError);

    /// Meetings found by a search
    async fn search_results_ready(&self, _ctx: NotificationContext, _meetings: Vec<MeetingNode>) {}

    /// Formats found by a search
    async fn format_search_results_ready(
        &self,
        _ctx: NotificationContext,
        _formats: Vec<FormatNode>,
        _all_used: bool,
    ) {
    }

    /// Change history
    async fn change_list_ready(&self, _ctx: NotificationContext, _changes: Vec<ChangeNode>) {}

    /// Deleted meetings that can be restored
    async fn deleted_meetings_ready(&self, _ctx: NotificationContext, _changes: Vec<ChangeNode>) {}

    /// Login state after a login or logout call
    async fn login_state_changed(&self, _ctx: NotificationContext, _logged_in: bool) {}

    /// Meeting created or restored
    async fn meeting_added(&self, _ctx: NotificationContext, _meeting: Option<MeetingNode>) {}

    /// Meeting rolled back
    async fn meeting_rolled_back(&self, _ctx: NotificationContext, _meeting: Option<EditableMeetingNode>) {}

    /// Edit committed
    async fn meeting_edit_committed(&self, _ctx: NotificationContext, _changed: Option<ChangedMeeting>) {}

    /// Delete finished
    async fn meeting_deleted(&self, _ctx: NotificationContext, _deleted: bool) {}

    /// Contact message finished
    async fn message_send_completed(&self, _ctx: NotificationContext, _sent: bool) {}

    /// Route a notification to its method.
    ///
    /// Override to receive every notification in one place.
    async fn notify(&self, notification: Notification) {
        let ctx = notification.context;
        match notification.event {
            Event::ServerValidated(valid) => self.server_validated(ctx, valid).await,
            Event::ErrorOccurred(error) => self.error_occurred(ctx, error).await,
            Event::SearchResultsReady(meetings) => self.search_results_ready(ctx, meetings).await,
            Event::FormatSearchResultsReady { formats, all_used } => {
                self.format_search_results_ready(ctx, formats, all_used).await;
            }
            Event::ChangeListReady(changes) => self.change_list_ready(ctx, changes).await,
            Event::DeletedMeetingsReady(changes) => self.deleted_meetings_ready(ctx, changes).await,
            Event::LoginStateChanged(logged_in) => self.login_state_changed(ctx, logged_in).await,
            Event::MeetingAdded(meeting) => self.meeting_added(ctx, meeting).await,
            Event::MeetingRolledBack(meeting) => self.meeting_rolled_back(ctx, meeting).await,
            Event::MeetingEditCommitted(changed) => self.meeting_edit_committed(ctx, changed).await,
            Event::MeetingDeleted(deleted) => self.meeting_deleted(ctx, deleted).await,
            Event::MessageSendCompleted(sent) => self.message_send_completed(ctx, sent).await,
        }
    }
}

/// Observer that logs every notification through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

#[async_trait]
impl SessionObserver for TracingObserver {
    async fn server_validated(&self, ctx: NotificationContext, valid: bool) {
        if valid {
            info!(session = %ctx.session, "Root Server validated");
        } else {
            warn!(session = %ctx.session, "Root Server rejected");
        }
    }

    async fn error_occurred(&self, ctx: NotificationContext, error: BmltError) {
        warn!(
            session = %ctx.session,
            operation = %ctx.operation,
            kind = %error.kind,
            key = error.localization_key(),
            "{}",
            error.message
        );
    }

    async fn notify(&self, notification: Notification) {
        let ctx = notification.context;
        match notification.event {
            Event::ServerValidated(valid) => self.server_validated(ctx, valid).await,
            Event::ErrorOccurred(error) => self.error_occurred(ctx, error).await,
            other => debug!(
                session = %ctx.session,
                operation = %ctx.operation,
                event = other.name(),
                "Session notification"
            ),
        }
    }
}

/// Observer that forwards every notification into a channel.
///
/// Useful for hosts that prefer pulling from a stream over implementing
/// callbacks.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelObserver {
    /// Create the observer and its receiving end
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl SessionObserver for ChannelObserver {
    async fn server_validated(&self, ctx: NotificationContext, valid: bool) {
        self.notify(Notification {
            context: ctx,
            event: Event::ServerValidated(valid),
        })
        .await;
    }

    async fn error_occurred(&self, ctx: NotificationContext, error: BmltError) {
        self.notify(Notification {
            context: ctx,
            event: Event::ErrorOccurred(error),
        })
        .await;
    }

    async fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            debug!("Notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NotificationContext {
        NotificationContext {
            session: SessionId::new(),
            operation: OperationId::new(3),
        }
    }

    #[tokio::test]
    async fn channel_observer_forwards_everything() {
        let (observer, mut rx) = ChannelObserver::new();
        let ctx = ctx();

        observer.server_validated(ctx, true).await;
        observer
            .notify(Notification {
                context: ctx,
                event: Event::MeetingDeleted(false),
            })
            .await;

        assert_eq!(rx.recv().await.unwrap().event, Event::ServerValidated(true));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event, Event::MeetingDeleted(false));
        assert_eq!(second.context.operation.value(), 3);
    }

    #[derive(Debug, Default)]
    struct Counting {
        deleted: parking_lot::Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl SessionObserver for Counting {
        async fn server_validated(&self, _ctx: NotificationContext, _valid: bool) {}
        async fn error_occurred(&self, _ctx: NotificationContext, _error: BmltError) {}
        async fn meeting_deleted(&self, _ctx: NotificationContext, deleted: bool) {
            self.deleted.lock().push(deleted);
        }
    }

    #[tokio::test]
    async fn default_notify_routes_to_methods() {
        let observer = Counting::default();
        observer
            .notify(Notification {
                context: ctx(),
                event: Event::MeetingDeleted(true),
            })
            .await;
        // Unhandled events fall through to the empty defaults
        observer
            .notify(Notification {
                context: ctx(),
                event: Event::SearchResultsReady(Vec::new()),
            })
            .await;
        assert_eq!(*observer.deleted.lock(), vec![true]);
    }

    #[test]
    fn ids_display() {
        assert_eq!(OperationId::new(7).to_string(), "op#7");
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
