//! Meetings, editable meetings, and change sets.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::format::{FormatLookup, FormatNode};
use super::server_info::{AvailableKeys, Coordinate};
use super::service_body::ServiceBodyId;
use crate::error::{BmltError, BmltResult};
use crate::operation::Params;
use crate::wire;

/// Server-assigned meeting id; `0` marks a meeting not yet saved
pub type MeetingId = u64;

/// Day of the week, numbered the way the server numbers it (Sunday = 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Weekday {
    /// 1
    Sunday = 1,
    /// 2
    Monday = 2,
    /// 3
    Tuesday = 3,
    /// 4
    Wednesday = 4,
    /// 5
    Thursday = 5,
    /// 6
    Friday = 6,
    /// 7
    Saturday = 7,
}

impl Weekday {
    /// Every day, Sunday first
    pub const ALL: [Weekday; 7] = [
        Self::Sunday,
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
    ];

    /// Day for a server index in `1..=7`
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index).checked_sub(1)?).copied()
    }

    /// Server index in `1..=7`
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Address fields of a meeting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Venue name
    pub text: String,
    /// Extra venue directions
    pub info: String,
    /// Street address
    pub street: String,
    /// Borough or city subsection
    pub city_subsection: String,
    /// Neighborhood
    pub neighborhood: String,
    /// Town
    pub municipality: String,
    /// County
    pub sub_province: String,
    /// State or province
    pub province: String,
    /// Postal code
    pub postal_code: String,
    /// Country
    pub nation: String,
    /// Geographic position, when the server has one
    pub coordinate: Option<Coordinate>,
}

impl Location {
    fn from_fields(fields: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
        let lat = fields.get("latitude").and_then(|v| v.trim().parse().ok());
        let lon = fields.get("longitude").and_then(|v| v.trim().parse().ok());
        let coordinate = match (lat, lon) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)).filter(Coordinate::is_valid),
            _ => None,
        };
        Self {
            text: get("location_text"),
            info: get("location_info"),
            street: get("location_street"),
            city_subsection: get("location_city_subsection"),
            neighborhood: get("location_neighborhood"),
            municipality: get("location_municipality"),
            sub_province: get("location_sub_province"),
            province: get("location_province"),
            postal_code: get("location_postal_code_1"),
            nation: get("location_nation"),
            coordinate,
        }
    }
}

/// A meeting as returned by a search; an immutable snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeetingNode {
    /// Meeting id
    pub id: MeetingId,
    /// Owning service body
    pub service_body_id: ServiceBodyId,
    /// Day of the week
    pub weekday: Option<Weekday>,
    /// Local start time
    pub start_time: Option<NaiveTime>,
    /// Duration in minutes
    pub duration_minutes: Option<u32>,
    /// Meeting name
    pub name: String,
    /// Whether the meeting is visible to the public
    pub published: bool,
    /// Address fields
    pub location: Location,
    /// Resolved formats; unresolved ids appear as placeholders
    pub formats: Vec<FormatNode>,
    /// Every published key/value pair of the meeting, as sent by the server
    pub fields: BTreeMap<String, String>,
}

impl MeetingNode {
    /// Decode one meeting object.
    ///
    /// Keys outside `keys` are dropped; format references are resolved
    /// through `formats`.
    ///
    /// # Errors
    ///
    /// Fails when the object has no numeric `id_bigint`.
    pub fn decode<F>(object: &Map<String, Value>, keys: &AvailableKeys, formats: &F) -> BmltResult<Self>
    where
        F: FormatLookup + ?Sized,
    {
        let mut fields = BTreeMap::new();
        for (key, value) in wire::object_to_strings(object) {
            if keys.accepts(&key) {
                fields.insert(key, value);
            } else {
                tracing::trace!(key = %key, "dropping meeting key the server does not publish");
            }
        }

        let raw_id = wire::required(object, "id_bigint")?;
        let id = wire::parse_id(&raw_id)
            .ok_or_else(|| BmltError::malformed(format!("meeting id `{raw_id}` is not numeric")))?;
        let number = |key: &str| fields.get(key).and_then(|v| wire::parse_id(v));

        Ok(Self {
            id,
            service_body_id: number("service_body_bigint").unwrap_or(0),
            weekday: number("weekday_tinyint")
                .and_then(|d| u8::try_from(d).ok())
                .and_then(Weekday::from_index),
            start_time: fields.get("start_time").and_then(|t| parse_clock(t)),
            duration_minutes: fields
                .get("duration_time")
                .and_then(|t| parse_clock(t))
                .map(|t| minutes_of(t)),
            name: fields.get("meeting_name").cloned().unwrap_or_default(),
            published: fields.get("published").is_none_or(|p| wire::is_truthy(p)),
            location: Location::from_fields(&fields),
            formats: resolve_formats(&fields, formats),
            fields,
        })
    }

    /// Raw value of a field
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn minutes_of(time: NaiveTime) -> u32 {
    use chrono::Timelike;
    time.hour() * 60 + time.minute()
}

fn resolve_formats<F>(fields: &BTreeMap<String, String>, catalog: &F) -> Vec<FormatNode>
where
    F: FormatLookup + ?Sized,
{
    if let Some(ids) = fields.get("format_shared_id_list").filter(|s| !s.trim().is_empty()) {
        return wire::split_csv(ids)
            .iter()
            .filter_map(|id| wire::parse_id(id))
            .map(|id| {
                catalog
                    .format_by_id(id)
                    .cloned()
                    .unwrap_or_else(|| FormatNode::unknown(id))
            })
            .collect();
    }
    fields
        .get("formats")
        .map(|keys| {
            wire::split_csv(keys)
                .iter()
                .map(|key| {
                    catalog
                        .format_by_key(key)
                        .cloned()
                        .unwrap_or_else(|| FormatNode::unknown_key(key))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a meeting list: a bare array or an object holding `meetings`
///
/// # Errors
///
/// Fails when any entry is not a meeting object.
pub fn decode_meetings<F>(value: &Value, keys: &AvailableKeys, formats: &F) -> BmltResult<Vec<MeetingNode>>
where
    F: FormatLookup + ?Sized,
{
    let list = match value {
        Value::Object(object) if object.contains_key("meetings") => object.get("meetings"),
        Value::Object(object) if object.contains_key("formats") => return Ok(Vec::new()),
        other => Some(other),
    };
    match list {
        Some(list) => wire::one_or_many(list)?
            .into_iter()
            .map(|m| MeetingNode::decode(m, keys, formats))
            .collect(),
        None => Ok(Vec::new()),
    }
}

/// Field changes not yet committed, keyed by meeting value key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet(BTreeMap<String, String>);

impl ChangeSet {
    /// Empty change set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Drop a field
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Pending value of a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate over pending fields
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pending fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys the server would not accept
    #[must_use]
    pub fn unknown_keys(&self, keys: &AvailableKeys) -> Vec<&str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|k| !keys.accepts(k))
            .collect()
    }

    /// Encode as `meeting_field[]=key,value` pairs
    #[must_use]
    pub fn to_params(&self) -> Params {
        self.0
            .iter()
            .map(|(k, v)| ("meeting_field[]", format!("{k},{v}")))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A meeting plus local, uncommitted edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditableMeetingNode {
    meeting: MeetingNode,
    pending: ChangeSet,
}

impl EditableMeetingNode {
    /// Start editing an existing meeting
    #[must_use]
    pub fn new(meeting: MeetingNode) -> Self {
        Self {
            meeting,
            pending: ChangeSet::new(),
        }
    }

    /// A new, unsaved meeting owned by `service_body_id`
    #[must_use]
    pub fn blank(service_body_id: ServiceBodyId) -> Self {
        let mut node = Self::new(MeetingNode::default());
        node.set("service_body_bigint", service_body_id.to_string());
        node
    }

    /// Meeting id; `0` until saved
    #[must_use]
    pub fn id(&self) -> MeetingId {
        self.meeting.id
    }

    /// Whether the meeting has never been saved
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.meeting.id == 0
    }

    /// The snapshot edits are applied on top of
    #[must_use]
    pub fn meeting(&self) -> &MeetingNode {
        &self.meeting
    }

    /// Service body the meeting will belong to after the edits
    #[must_use]
    pub fn service_body_id(&self) -> ServiceBodyId {
        self.value("service_body_bigint")
            .and_then(wire::parse_id)
            .unwrap_or(self.meeting.service_body_id)
    }

    /// Current value of a field, pending edits first
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.pending.get(key).or_else(|| self.meeting.field(key))
    }

    /// Stage a field value; setting a field back to its saved value
    /// unstages it
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        if !self.is_new() && self.meeting.field(&key) == Some(value.as_str()) {
            self.pending.remove(&key);
        } else {
            self.pending.insert(key, value);
        }
        self
    }

    /// Staged edits
    #[must_use]
    pub fn changes(&self) -> &ChangeSet {
        &self.pending
    }

    /// Whether anything is staged
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Discard staged edits
    pub fn revert(&mut self) {
        self.pending = ChangeSet::new();
    }

    /// An unsaved, unpublished duplicate carrying every current value
    #[must_use]
    pub fn as_copy(&self) -> Self {
        let mut copy = Self::new(MeetingNode::default());
        for (key, value) in &self.meeting.fields {
            if key != "id_bigint" {
                copy.pending.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in self.pending.iter() {
            copy.pending.insert(key, value);
        }
        copy.pending.insert("published", "0");
        copy
    }

    /// Fields to submit: everything for a new meeting, only staged edits
    /// otherwise
    #[must_use]
    pub fn submission(&self) -> ChangeSet {
        if self.is_new() {
            let mut all: ChangeSet = self
                .meeting
                .fields
                .iter()
                .filter(|(k, _)| k.as_str() != "id_bigint")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, value) in self.pending.iter() {
                all.insert(key, value);
            }
            all
        } else {
            self.pending.clone()
        }
    }
}

impl From<MeetingNode> for EditableMeetingNode {
    fn from(meeting: MeetingNode) -> Self {
        Self::new(meeting)
    }
}
