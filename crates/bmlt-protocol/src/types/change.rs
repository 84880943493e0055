//! Change history and committed-edit results.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::meeting::MeetingId;
use super::service_body::ServiceBodyId;
use crate::error::{BmltError, BmltResult};
use crate::operation::Params;
use crate::wire;

/// Server-assigned change id
pub type ChangeId = u64;

/// What a change did to its meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The meeting was created
    Add,
    /// Fields of the meeting changed
    Edit,
    /// The meeting was deleted
    Delete,
    /// The meeting was reverted to an earlier state
    Rollback,
}

/// Before/after values of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Meeting value key
    pub key: String,
    /// Value before the change, if the field existed
    pub before: Option<String>,
    /// Value after the change, if the field still exists
    pub after: Option<String>,
}

/// One entry of a meeting's change history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNode {
    /// Change id
    pub change_id: ChangeId,
    /// Meeting the change applies to
    pub meeting_id: MeetingId,
    /// Service body owning the meeting at the time of the change
    pub service_body_id: ServiceBodyId,
    /// When the change was made
    pub timestamp: DateTime<Utc>,
    /// Admin who made the change
    pub user_name: String,
    /// Server-written summary
    pub details: String,
    /// Whether the meeting still exists on the server
    pub meeting_exists: bool,
    /// Kind of change
    pub change_type: ChangeType,
    /// Meeting fields before the change; absent for creations
    pub before: Option<BTreeMap<String, String>>,
    /// Meeting fields after the change; absent for deletions
    pub after: Option<BTreeMap<String, String>>,
}

impl ChangeNode {
    fn from_wire(object: &Map<String, Value>) -> BmltResult<Self> {
        let id = |key: &str| -> BmltResult<u64> {
            let raw = wire::required(object, key)?;
            wire::parse_id(&raw)
                .ok_or_else(|| BmltError::malformed(format!("`{key}` value `{raw}` is not numeric")))
        };
        let change_id = id("change_id")?;
        let meeting_id = id("meeting_id")?;
        let epoch: i64 = wire::optional(object, "date_int").trim().parse().unwrap_or(0);
        let timestamp = DateTime::from_timestamp(epoch, 0)
            .ok_or_else(|| BmltError::malformed(format!("change date `{epoch}` is out of range")))?;

        let snapshot = |key: &str| -> Option<BTreeMap<String, String>> {
            object
                .get("json_data")
                .and_then(Value::as_object)
                .and_then(|data| data.get(key))
                .and_then(Value::as_object)
                .map(|fields| wire::object_to_strings(fields).into_iter().collect())
        };
        let before = snapshot("before");
        let after = snapshot("after");
        let details = wire::optional(object, "details");

        let change_type = match (&before, &after) {
            (None, _) => ChangeType::Add,
            (Some(_), None) => ChangeType::Delete,
            _ if details.to_ascii_lowercase().contains("rolled back") => ChangeType::Rollback,
            _ => ChangeType::Edit,
        };

        Ok(Self {
            change_id,
            meeting_id,
            service_body_id: wire::parse_id(&wire::optional(object, "service_body_id")).unwrap_or(0),
            timestamp,
            user_name: wire::optional(object, "user_name"),
            details,
            meeting_exists: wire::is_truthy(&wire::optional(object, "meeting_exists")),
            change_type,
            before,
            after,
        })
    }

    /// Fields whose value differs between `before` and `after`, restricted
    /// to `keys` (the server's available keys plus `published`)
    #[must_use]
    pub fn field_changes<'a, I>(&self, keys: I) -> Vec<FieldChange>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let lookup = |side: &Option<BTreeMap<String, String>>, key: &str| {
            side.as_ref().and_then(|m| m.get(key)).cloned()
        };
        keys.into_iter()
            .chain(std::iter::once("published"))
            .filter_map(|key| {
                let before = lookup(&self.before, key);
                let after = lookup(&self.after, key);
                (before != after).then(|| FieldChange {
                    key: key.to_string(),
                    before,
                    after,
                })
            })
            .collect()
    }

    /// Whether this change can be reverted: it must have a prior state
    #[must_use]
    pub fn can_roll_back(&self) -> bool {
        self.before.is_some()
    }
}

/// Decode a change list and order it newest first
///
/// # Errors
///
/// Fails when an entry lacks its change or meeting id.
pub fn decode_changes(value: &Value) -> BmltResult<Vec<ChangeNode>> {
    let list = match value {
        Value::Object(object) => object.get("changes").unwrap_or(value),
        other => other,
    };
    let mut changes = wire::one_or_many(list)?
        .into_iter()
        .map(ChangeNode::from_wire)
        .collect::<BmltResult<Vec<_>>>()?;
    sort_newest_first(&mut changes);
    Ok(changes)
}

/// Order changes newest first; ties fall back to the higher change id
pub fn sort_newest_first(changes: &mut [ChangeNode]) {
    changes.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then(b.change_id.cmp(&a.change_id))
    });
}

/// Reduce a change list to the final deletion of each meeting that no
/// longer exists
#[must_use]
pub fn deleted_meetings(changes: &[ChangeNode]) -> Vec<ChangeNode> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<ChangeNode> = changes
        .iter()
        .filter(|c| c.change_type == ChangeType::Delete && !c.meeting_exists)
        .cloned()
        .collect();
    sort_newest_first(&mut out);
    out.retain(|c| seen.insert(c.meeting_id));
    out
}

/// Server-confirmed result of a committed edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedMeeting {
    /// Edited meeting
    pub meeting_id: MeetingId,
    /// Fields the server changed, with old and new values
    pub changes: Vec<FieldChange>,
}

impl ChangedMeeting {
    /// Decode the `modify_meeting` answer.
    ///
    /// `Ok(None)` means the server accepted the request but reported no
    /// change.
    ///
    /// # Errors
    ///
    /// Fails when the answer is not an object.
    pub fn decode(value: &Value) -> BmltResult<Option<Self>> {
        let object = value
            .as_object()
            .ok_or_else(|| BmltError::malformed("edit answer is not an object"))?;
        let Some(meeting_id) = object
            .get("changeMeeting")
            .and_then(Value::as_object)
            .and_then(|c| c.get("id"))
            .and_then(wire::scalar_to_string)
            .and_then(|id| wire::parse_id(&id))
        else {
            return Ok(None);
        };
        let Some(fields) = object.get("field") else {
            return Ok(None);
        };

        let changes = wire::one_or_many(fields)?
            .into_iter()
            .filter_map(|field| {
                let key = field
                    .get("key")
                    .or_else(|| field.get("@attributes").and_then(|a| a.get("key")))
                    .and_then(wire::scalar_to_string)?;
                Some(FieldChange {
                    key,
                    before: field.get("oldValue").and_then(wire::scalar_to_string),
                    after: field.get("newValue").and_then(wire::scalar_to_string),
                })
            })
            .collect::<Vec<_>>();

        Ok((!changes.is_empty()).then_some(Self {
            meeting_id,
            changes,
        }))
    }

    /// Confirmed new values keyed by field
    #[must_use]
    pub fn new_values(&self) -> BTreeMap<&str, &str> {
        self.changes
            .iter()
            .filter_map(|c| Some((c.key.as_str(), c.after.as_deref()?)))
            .collect()
    }
}

/// Which history entries to retrieve
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeListFilter {
    /// Only this meeting
    pub meeting_id: Option<MeetingId>,
    /// Only meetings of this service body
    pub service_body_id: Option<ServiceBodyId>,
    /// Changes on or after this day
    pub start_date: Option<NaiveDate>,
    /// Changes on or before this day
    pub end_date: Option<NaiveDate>,
}

impl ChangeListFilter {
    /// History of one meeting
    #[must_use]
    pub fn for_meeting(meeting_id: MeetingId) -> Self {
        Self {
            meeting_id: Some(meeting_id),
            ..Self::default()
        }
    }

    /// Encode as request parameters
    #[must_use]
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        if let Some(id) = self.meeting_id {
            params.push("meeting_id", id);
        }
        if let Some(id) = self.service_body_id {
            params.push("service_body_id", id);
        }
        if let Some(date) = self.start_date {
            params.push("start_date", date.format("%Y-%m-%d"));
        }
        if let Some(date) = self.end_date {
            params.push("end_date", date.format("%Y-%m-%d"));
        }
        params
    }
}
