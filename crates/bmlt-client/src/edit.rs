//! Versioned edits through semantic administration.
//!
//! Every mutation re-checks the admin's privilege over the owning service
//! body against the server before it is sent. Commits are last-write-wins:
//! only changed fields go out, without a version precondition, and the
//! values the server reports back are authoritative.
//!
//! Rollback depth is enforced locally. The engine remembers the newest-first
//! change ids of each meeting whose full history it has seen; a change that
//! is not among the newest `change_depth` entries is refused with
//! `NotFound` before any mutating request is made.

use std::collections::HashMap;

use bmlt_protocol::{
    BmltError, BmltResult, ChangeId, ChangeListFilter, ChangeNode, ChangeSet, ChangedMeeting,
    EditableMeetingNode, ErrorCode, MeetingId, MeetingNode, Operation, Params, ServiceBodyId,
    decode_changes, deleted_meetings,
};
use bmlt_transport::{Credential, Gateway, GatewayRequest};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::admin::{AdminSession, refuse_not_authorized};
use crate::cache::ReferenceCache;
use crate::search::SearchRequest;

/// Everything an edit needs from the session
#[derive(Debug, Clone, Copy)]
pub(crate) struct EditContext<'a> {
    pub(crate) gateway: &'a dyn Gateway,
    pub(crate) cache: &'a ReferenceCache,
    pub(crate) admin: &'a AdminSession,
}

impl EditContext<'_> {
    fn search(&self, credential: Option<Credential>) -> SearchRequest<'_> {
        SearchRequest {
            gateway: self.gateway,
            cache: self.cache,
            credential,
            timeout: None,
        }
    }

    async fn send(
        &self,
        operation: Operation,
        params: Params,
        credential: Option<Credential>,
    ) -> BmltResult<Value> {
        debug!(%operation, params = params.len(), "Sending admin request");
        let payload = self
            .gateway
            .request(GatewayRequest::new(operation, params).with_credential(credential))
            .await?;
        Ok(refuse_not_authorized(payload)?.into_json()?)
    }
}

/// Change history bookkeeping plus the edit operations
#[derive(Debug, Default)]
pub(crate) struct EditEngine {
    history: Mutex<HashMap<MeetingId, Vec<ChangeId>>>,
}

impl EditEngine {
    /// Create a meeting from every field of `meeting`
    pub(crate) async fn add_meeting(
        &self,
        ctx: EditContext<'_>,
        meeting: &EditableMeetingNode,
    ) -> BmltResult<MeetingNode> {
        let credential = ctx.admin.require_login()?;
        let submission = meeting.submission();
        reject_unknown_keys(ctx.cache, &submission)?;

        let service_body_id = meeting.service_body_id();
        if service_body_id == 0 {
            return Err(BmltError::rejected("a new meeting needs an owning service body"));
        }
        ctx.admin.require_editor(ctx.gateway, service_body_id).await?;

        let value = ctx
            .send(Operation::AddMeeting, submission.to_params(), credential.clone())
            .await?;
        let id = answered_id(value.get("newMeeting").unwrap_or(&Value::Null))
            .ok_or_else(|| BmltError::rejected("the server did not create the meeting"))?;

        info!(meeting_id = id, service_body_id, "Meeting added");
        ctx.search(credential).fetch_meeting(id).await
    }

    /// Add an unpublished duplicate of `meeting`
    pub(crate) async fn save_as_copy(
        &self,
        ctx: EditContext<'_>,
        meeting: &EditableMeetingNode,
    ) -> BmltResult<MeetingNode> {
        self.add_meeting(ctx, &meeting.as_copy()).await
    }

    /// Undelete a meeting and return it as it now stands
    pub(crate) async fn restore_deleted_meeting(
        &self,
        ctx: EditContext<'_>,
        meeting_id: MeetingId,
    ) -> BmltResult<MeetingNode> {
        let credential = ctx.admin.require_login()?;
        let history = self
            .load_history(ctx, ChangeListFilter::for_meeting(meeting_id), credential.clone())
            .await?;
        let deletion = deleted_meetings(&history)
            .into_iter()
            .find(|c| c.meeting_id == meeting_id)
            .ok_or_else(|| BmltError::not_found(format!("meeting {meeting_id} is not deleted")))?;
        ctx.admin.require_editor(ctx.gateway, deletion.service_body_id).await?;

        let value = ctx
            .send(
                Operation::RestoreDeletedMeeting,
                Params::new().with("meeting_id", meeting_id),
                credential.clone(),
            )
            .await?;
        expect_same_id(&value, meeting_id, "restore")?;
        self.forget(meeting_id);

        info!(meeting_id, "Meeting restored");
        ctx.search(credential).fetch_meeting(meeting_id).await
    }

    /// Submit `changes` to an existing meeting
    pub(crate) async fn commit_edit(
        &self,
        ctx: EditContext<'_>,
        meeting_id: MeetingId,
        changes: &ChangeSet,
    ) -> BmltResult<ChangedMeeting> {
        let credential = ctx.admin.require_login()?;
        if changes.is_empty() {
            return Err(BmltError::rejected("nothing to commit"));
        }
        reject_unknown_keys(ctx.cache, changes)?;

        let current = ctx.search(credential.clone()).fetch_meeting(meeting_id).await?;
        ctx.admin.require_editor(ctx.gateway, current.service_body_id).await?;
        // Moving a meeting needs rights over the destination too.
        if let Some(target) = changes.get("service_body_bigint").and_then(|v| v.trim().parse::<ServiceBodyId>().ok())
            && target != current.service_body_id
        {
            ctx.admin.require_editor(ctx.gateway, target).await?;
        }

        let mut params = Params::new().with("meeting_id", meeting_id);
        params.extend(changes.to_params());
        let value = ctx.send(Operation::ModifyMeeting, params, credential).await?;
        self.forget(meeting_id);

        let changed = ChangedMeeting::decode(&value)?.ok_or_else(|| {
            BmltError::rejected(format!("the server did not apply the edit to meeting {meeting_id}"))
        })?;
        info!(meeting_id, fields = changed.changes.len(), "Meeting edit committed");
        Ok(changed)
    }

    /// Delete a meeting
    pub(crate) async fn delete_meeting(&self, ctx: EditContext<'_>, meeting_id: MeetingId) -> BmltResult<()> {
        let credential = ctx.admin.require_login()?;
        let current = ctx.search(credential.clone()).fetch_meeting(meeting_id).await?;
        ctx.admin.require_editor(ctx.gateway, current.service_body_id).await?;

        let value = ctx
            .send(
                Operation::DeleteMeeting,
                Params::new().with("meeting_id", meeting_id),
                credential,
            )
            .await?;
        expect_same_id(&value, meeting_id, "delete")?;
        self.forget(meeting_id);
        info!(meeting_id, "Meeting deleted");
        Ok(())
    }

    /// Revert `meeting_id` to the state before `change`
    pub(crate) async fn rollback_meeting(
        &self,
        ctx: EditContext<'_>,
        meeting_id: MeetingId,
        change: &ChangeNode,
    ) -> BmltResult<EditableMeetingNode> {
        let credential = ctx.admin.require_login()?;
        if change.meeting_id != meeting_id {
            return Err(BmltError::rejected(format!(
                "change {} belongs to meeting {}, not {meeting_id}",
                change.change_id, change.meeting_id
            )));
        }
        if !change.can_roll_back() {
            return Err(BmltError::rejected(format!(
                "change {} has no earlier state to restore",
                change.change_id
            )));
        }

        let known = self.history_of(meeting_id);
        let ids = match known {
            Some(ids) => ids,
            None => {
                self.load_history(ctx, ChangeListFilter::for_meeting(meeting_id), credential.clone())
                    .await?;
                self.history_of(meeting_id).unwrap_or_default()
            }
        };
        check_depth(&ids, change.change_id, ctx.cache.change_depth())?;
        let current = ctx.search(credential.clone()).fetch_meeting(meeting_id).await?;
        ctx.admin.require_editor(ctx.gateway, current.service_body_id).await?;

        let params = Params::new()
            .with("meeting_id", meeting_id)
            .with("change_id", change.change_id);
        let value = ctx.send(Operation::RollbackMeeting, params, credential.clone()).await?;
        expect_same_id(&value, meeting_id, "rollback")?;
        self.forget(meeting_id);

        info!(meeting_id, change_id = change.change_id, "Meeting rolled back");
        let restored = ctx.search(credential).fetch_meeting(meeting_id).await?;
        Ok(EditableMeetingNode::new(restored))
    }

    /// Change history, newest first
    pub(crate) async fn fetch_change_list(
        &self,
        ctx: EditContext<'_>,
        filter: ChangeListFilter,
    ) -> BmltResult<Vec<ChangeNode>> {
        let credential = ctx.admin.require_login()?;
        self.load_history(ctx, filter, credential).await
    }

    /// Latest deletion of each meeting that no longer exists
    pub(crate) async fn fetch_deleted_meetings(
        &self,
        ctx: EditContext<'_>,
        filter: ChangeListFilter,
    ) -> BmltResult<Vec<ChangeNode>> {
        Ok(deleted_meetings(&self.fetch_change_list(ctx, filter).await?))
    }

    /// Send `message` to the contact of `meeting_id` through the server's
    /// contact form
    pub(crate) async fn send_message(
        &self,
        ctx: EditContext<'_>,
        meeting_id: MeetingId,
        from: &str,
        message: &str,
    ) -> BmltResult<()> {
        let credential = ctx.admin.require_login()?;
        if !ctx.cache.server_info().email_contacts_enabled {
            return Err(BmltError::unauthorized("meeting contact email is disabled on this server"));
        }
        let from = from.trim();
        if !is_plausible_address(from) {
            return Err(BmltError::rejected(format!("`{from}` is not a usable sender address"))
                .with_code(ErrorCode::InvalidFrom));
        }

        let meeting = ctx.search(credential).fetch_meeting(meeting_id).await?;
        let params = Params::new()
            .with("meeting_id", meeting_id)
            .with("service_body_id", meeting.service_body_id)
            .with("from_address", from)
            .with("message", message);
        debug!(meeting_id, "Sending contact message");
        let payload = ctx
            .gateway
            .request(GatewayRequest::new(Operation::SendMessage, params))
            .await?;

        match payload.status_text().as_deref().map(str::trim) {
            Some("1") => {
                info!(meeting_id, "Contact message sent");
                Ok(())
            }
            Some("-2" | "-3") => {
                warn!(meeting_id, "Contact message refused as spam");
                Err(BmltError::rejected("the server refused the message as spam").with_code(ErrorCode::Spam))
            }
            _ => Err(BmltError::rejected("the server did not confirm the message")
                .with_code(ErrorCode::SendingUnknown)),
        }
    }

    async fn load_history(
        &self,
        ctx: EditContext<'_>,
        filter: ChangeListFilter,
        credential: Option<Credential>,
    ) -> BmltResult<Vec<ChangeNode>> {
        let value = ctx
            .send(Operation::AdminChanges, filter.to_params(), credential)
            .await?;
        let changes = decode_changes(&value)?;
        // Date-bounded lists are partial histories; positions in them say
        // nothing about depth.
        if filter.start_date.is_none() && filter.end_date.is_none() {
            self.record(&changes);
        }
        debug!(changes = changes.len(), "Change list loaded");
        Ok(changes)
    }

    fn record(&self, changes: &[ChangeNode]) {
        let mut grouped: HashMap<MeetingId, Vec<ChangeId>> = HashMap::new();
        for change in changes {
            grouped.entry(change.meeting_id).or_default().push(change.change_id);
        }
        self.history.lock().extend(grouped);
    }

    fn history_of(&self, meeting_id: MeetingId) -> Option<Vec<ChangeId>> {
        self.history.lock().get(&meeting_id).cloned()
    }

    fn forget(&self, meeting_id: MeetingId) {
        self.history.lock().remove(&meeting_id);
    }
}

/// `change_id` must be among the newest `depth` entries of `newest_first`
fn check_depth(newest_first: &[ChangeId], change_id: ChangeId, depth: u32) -> BmltResult<()> {
    let depth = usize::try_from(depth).unwrap_or(usize::MAX);
    match newest_first.iter().position(|id| *id == change_id) {
        Some(index) if index < depth => Ok(()),
        Some(index) => Err(BmltError::not_found(format!(
            "change {change_id} is {} versions back; the server keeps {depth}",
            index + 1
        ))),
        None => Err(BmltError::not_found(format!(
            "change {change_id} is not in the retained history"
        ))),
    }
}

fn reject_unknown_keys(cache: &ReferenceCache, changes: &ChangeSet) -> BmltResult<()> {
    let unknown = changes.unknown_keys(cache.available_keys());
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(BmltError::rejected(format!(
            "the server does not accept these fields: {}",
            unknown.join(", ")
        )))
    }
}

/// Id in an `{"id": ..}` or `{"meeting_id": ..}` answer; `0` counts as none
fn answered_id(value: &Value) -> Option<MeetingId> {
    let raw = value.get("id").or_else(|| value.get("meeting_id"))?;
    let id = match raw {
        Value::String(s) => s.trim().parse().ok()?,
        Value::Number(n) => n.as_u64()?,
        _ => return None,
    };
    (id != 0).then_some(id)
}

fn expect_same_id(value: &Value, meeting_id: MeetingId, action: &str) -> BmltResult<()> {
    match answered_id(value) {
        Some(id) if id == meeting_id => Ok(()),
        _ => Err(BmltError::rejected(format!(
            "the server refused to {action} meeting {meeting_id}"
        ))),
    }
}

fn is_plausible_address(address: &str) -> bool {
    let Some((local, domain)) = address.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !address.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmlt_protocol::ErrorKind;
    use serde_json::json;

    #[test]
    fn depth_bounds_rollback_targets() {
        let history = [50, 40, 30, 20, 10];
        assert!(check_depth(&history, 50, 5).is_ok());
        assert!(check_depth(&history, 10, 5).is_ok());
        assert_eq!(check_depth(&history, 10, 4).unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(check_depth(&history, 99, 5).unwrap_err().kind, ErrorKind::NotFound);
        assert!(check_depth(&history, 50, 0).is_err());
    }

    #[test]
    fn answered_ids() {
        assert_eq!(answered_id(&json!({"id": "42"})), Some(42));
        assert_eq!(answered_id(&json!({"meeting_id": 7})), Some(7));
        assert_eq!(answered_id(&json!({"meeting_id": "0"})), None);
        assert_eq!(answered_id(&json!("OK")), None);
        assert!(expect_same_id(&json!({"meeting_id": "8"}), 9, "delete").is_err());
    }

    #[test]
    fn sender_addresses() {
        assert!(is_plausible_address("someone@example.org"));
        assert!(!is_plausible_address(""));
        assert!(!is_plausible_address("someone"));
        assert!(!is_plausible_address("@example.org"));
        assert!(!is_plausible_address("someone@localhost"));
        assert!(!is_plausible_address("some one@example.org"));
    }

    #[test]
    fn history_is_grouped_per_meeting() {
        let engine = EditEngine::default();
        let change = |change_id, meeting_id| ChangeNode {
            change_id,
            meeting_id,
            service_body_id: 1,
            timestamp: chrono::DateTime::from_timestamp(change_id as i64, 0).unwrap_or_default(),
            user_name: String::new(),
            details: String::new(),
            meeting_exists: true,
            change_type: bmlt_protocol::ChangeType::Edit,
            before: Some(Default::default()),
            after: Some(Default::default()),
        };
        engine.record(&[change(9, 1), change(8, 2), change(7, 1)]);
        assert_eq!(engine.history_of(1), Some(vec![9, 7]));
        assert_eq!(engine.history_of(2), Some(vec![8]));
        engine.forget(1);
        assert_eq!(engine.history_of(1), None);
    }
}
