//! Search criteria and their request encoding.
//!
//! [`SearchCriteria`] holds one value per [`SearchDimension`]. An empty
//! criteria set is valid and asks for every published meeting.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::operation::Params;
use crate::types::{Coordinate, DistanceUnits, FormatId, MeetingId, ServiceBodyId, Weekday};

/// Include/exclude sets for one id dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdFilter<T: Ord> {
    /// Ids a meeting must match one of
    pub include: BTreeSet<T>,
    /// Ids a meeting must match none of
    pub exclude: BTreeSet<T>,
}

impl<T: Ord> Default for IdFilter<T> {
    fn default() -> Self {
        Self {
            include: BTreeSet::new(),
            exclude: BTreeSet::new(),
        }
    }
}

impl<T: Ord> IdFilter<T> {
    /// Filter matching any of `ids`
    pub fn including(ids: impl IntoIterator<Item = T>) -> Self {
        Self {
            include: ids.into_iter().collect(),
            exclude: BTreeSet::new(),
        }
    }

    /// Filter rejecting all of `ids`
    pub fn excluding(ids: impl IntoIterator<Item = T>) -> Self {
        Self {
            include: BTreeSet::new(),
            exclude: ids.into_iter().collect(),
        }
    }

    /// Whether the filter constrains nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Search radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Radius {
    /// Distance in the server's units
    Distance(f64),
    /// Let the server widen the circle until it holds about this many meetings
    MeetingCount(u32),
}

impl Radius {
    fn encode(self) -> String {
        match self {
            Self::Distance(d) => d.to_string(),
            Self::MeetingCount(n) => format!("-{n}"),
        }
    }
}

/// Free-text search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSearch {
    /// Search text
    pub text: String,
    /// Geocode the text and search around the resulting location
    pub as_address: bool,
    /// Match the text exactly
    pub exact: bool,
    /// Require every word
    pub all_words: bool,
    /// Radius around a geocoded address
    pub address_radius: Option<Radius>,
}

impl TextSearch {
    /// Plain substring search
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            as_address: false,
            exact: false,
            all_words: false,
            address_radius: None,
        }
    }

    /// Search around a geocoded address
    pub fn address(text: impl Into<String>, radius: Radius) -> Self {
        Self {
            as_address: true,
            address_radius: Some(radius),
            ..Self::new(text)
        }
    }
}

/// Circle around a coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoArea {
    /// Center
    pub center: Coordinate,
    /// Radius
    pub radius: Radius,
}

/// Match on a single meeting field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    /// Meeting value key
    pub key: String,
    /// Value to match
    pub value: String,
    /// Compare case-sensitively
    pub case_sensitive: bool,
    /// Accept values containing `value` rather than equal to it
    pub contains: bool,
}

/// Publication state filter; only honored for logged-in admins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Publication {
    /// Published meetings only
    #[default]
    Published,
    /// Unpublished meetings only
    Unpublished,
    /// Both
    Both,
}

/// What a search returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResultExtent {
    /// Meetings
    #[default]
    MeetingsOnly,
    /// Meetings, plus the formats they use
    MeetingsAndFormats,
    /// Only the formats the matching meetings use
    FormatsOnly,
}

/// One search dimension and its value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SearchDimension {
    /// Free text
    Text(TextSearch),
    /// Days of the week
    Weekdays(IdFilter<Weekday>),
    /// Owning service bodies
    ServiceBodies(IdFilter<ServiceBodyId>),
    /// Formats
    Formats(IdFilter<FormatId>),
    /// Geographic circle
    Area(GeoArea),
    /// Start time strictly after
    StartsAfter(NaiveTime),
    /// Start time strictly before
    StartsBefore(NaiveTime),
    /// End time before
    EndsBefore(NaiveTime),
    /// Minimum duration in minutes
    MinDuration(u32),
    /// Maximum duration in minutes
    MaxDuration(u32),
    /// Single-field match
    Field(FieldMatch),
    /// Specific meetings
    MeetingIds(BTreeSet<MeetingId>),
    /// Publication state
    Publication(Publication),
}

impl SearchDimension {
    /// The dimension this value belongs to
    #[must_use]
    pub fn kind(&self) -> DimensionKind {
        match self {
            Self::Text(_) => DimensionKind::Text,
            Self::Weekdays(_) => DimensionKind::Weekdays,
            Self::ServiceBodies(_) => DimensionKind::ServiceBodies,
            Self::Formats(_) => DimensionKind::Formats,
            Self::Area(_) => DimensionKind::Area,
            Self::StartsAfter(_) => DimensionKind::StartsAfter,
            Self::StartsBefore(_) => DimensionKind::StartsBefore,
            Self::EndsBefore(_) => DimensionKind::EndsBefore,
            Self::MinDuration(_) => DimensionKind::MinDuration,
            Self::MaxDuration(_) => DimensionKind::MaxDuration,
            Self::Field(_) => DimensionKind::Field,
            Self::MeetingIds(_) => DimensionKind::MeetingIds,
            Self::Publication(_) => DimensionKind::Publication,
        }
    }
}

/// Dimension names, for clearing one dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum DimensionKind {
    Text,
    Weekdays,
    ServiceBodies,
    Formats,
    Area,
    StartsAfter,
    StartsBefore,
    EndsBefore,
    MinDuration,
    MaxDuration,
    Field,
    MeetingIds,
    Publication,
}

/// Current search criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    text: Option<TextSearch>,
    weekdays: IdFilter<Weekday>,
    service_bodies: IdFilter<ServiceBodyId>,
    formats: IdFilter<FormatId>,
    area: Option<GeoArea>,
    starts_after: Option<NaiveTime>,
    starts_before: Option<NaiveTime>,
    ends_before: Option<NaiveTime>,
    min_duration: Option<u32>,
    max_duration: Option<u32>,
    field: Option<FieldMatch>,
    meeting_ids: BTreeSet<MeetingId>,
    publication: Option<Publication>,
}

impl SearchCriteria {
    /// Empty criteria
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set)
    #[must_use]
    pub fn with(mut self, dimension: SearchDimension) -> Self {
        self.set(dimension);
        self
    }

    /// Replace the value of one dimension
    pub fn set(&mut self, dimension: SearchDimension) {
        match dimension {
            SearchDimension::Text(t) => self.text = Some(t),
            SearchDimension::Weekdays(w) => self.weekdays = w,
            SearchDimension::ServiceBodies(s) => self.service_bodies = s,
            SearchDimension::Formats(f) => self.formats = f,
            SearchDimension::Area(a) => self.area = Some(a),
            SearchDimension::StartsAfter(t) => self.starts_after = Some(t),
            SearchDimension::StartsBefore(t) => self.starts_before = Some(t),
            SearchDimension::EndsBefore(t) => self.ends_before = Some(t),
            SearchDimension::MinDuration(m) => self.min_duration = Some(m),
            SearchDimension::MaxDuration(m) => self.max_duration = Some(m),
            SearchDimension::Field(f) => self.field = Some(f),
            SearchDimension::MeetingIds(ids) => self.meeting_ids = ids,
            SearchDimension::Publication(p) => self.publication = Some(p),
        }
    }

    /// Reset one dimension
    pub fn unset(&mut self, kind: DimensionKind) {
        match kind {
            DimensionKind::Text => self.text = None,
            DimensionKind::Weekdays => self.weekdays = IdFilter::default(),
            DimensionKind::ServiceBodies => self.service_bodies = IdFilter::default(),
            DimensionKind::Formats => self.formats = IdFilter::default(),
            DimensionKind::Area => self.area = None,
            DimensionKind::StartsAfter => self.starts_after = None,
            DimensionKind::StartsBefore => self.starts_before = None,
            DimensionKind::EndsBefore => self.ends_before = None,
            DimensionKind::MinDuration => self.min_duration = None,
            DimensionKind::MaxDuration => self.max_duration = None,
            DimensionKind::Field => self.field = None,
            DimensionKind::MeetingIds => self.meeting_ids.clear(),
            DimensionKind::Publication => self.publication = None,
        }
    }

    /// Reset every dimension
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether no dimension is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Text dimension
    #[must_use]
    pub fn text(&self) -> Option<&TextSearch> {
        self.text.as_ref()
    }

    /// Weekday dimension
    #[must_use]
    pub fn weekdays(&self) -> &IdFilter<Weekday> {
        &self.weekdays
    }

    /// Service body dimension
    #[must_use]
    pub fn service_bodies(&self) -> &IdFilter<ServiceBodyId> {
        &self.service_bodies
    }

    /// Format dimension
    #[must_use]
    pub fn formats(&self) -> &IdFilter<FormatId> {
        &self.formats
    }

    /// Geographic dimension
    #[must_use]
    pub fn area(&self) -> Option<&GeoArea> {
        self.area.as_ref()
    }

    /// Meeting-id dimension
    #[must_use]
    pub fn meeting_ids(&self) -> &BTreeSet<MeetingId> {
        &self.meeting_ids
    }

    /// Encode as `GetSearchResults` parameters.
    ///
    /// `admin` controls whether the publication filter is sent; the server
    /// ignores it for anonymous callers.
    #[must_use]
    pub fn to_params(&self, units: DistanceUnits, extent: ResultExtent, admin: bool) -> Params {
        let mut params = Params::new();

        encode_ids(&mut params, "services[]", &self.service_bodies, |id| *id as i64);
        encode_ids(&mut params, "formats[]", &self.formats, |id| *id as i64);
        encode_ids(&mut params, "weekdays[]", &self.weekdays, |d| i64::from(d.index()));

        for id in &self.meeting_ids {
            params.push("meeting_ids[]", id);
        }

        if let Some(text) = &self.text {
            params.push("SearchString", &text.text);
            if text.as_address {
                params.push("StringSearchIsAnAddress", 1);
                if let Some(radius) = text.address_radius {
                    params.push("SearchStringRadius", radius.encode());
                }
            }
            if text.exact {
                params.push("SearchStringExact", 1);
            }
            if text.all_words {
                params.push("SearchStringAll", 1);
            }
        }

        if let Some(area) = &self.area {
            params.push("lat_val", area.center.latitude);
            params.push("long_val", area.center.longitude);
            let width_key = match (area.radius, units) {
                (Radius::Distance(_), DistanceUnits::Km) => "geo_width_km",
                _ => "geo_width",
            };
            params.push(width_key, area.radius.encode());
        }

        encode_time(&mut params, "StartsAfter", self.starts_after);
        encode_time(&mut params, "StartsBefore", self.starts_before);
        encode_time(&mut params, "EndsBefore", self.ends_before);
        encode_minutes(&mut params, "MinDuration", self.min_duration);
        encode_minutes(&mut params, "MaxDuration", self.max_duration);

        if let Some(field) = &self.field {
            params.push("meeting_key", &field.key);
            params.push("meeting_key_value", &field.value);
            if field.case_sensitive {
                params.push("meeting_key_match_case", 1);
            }
            if !field.contains {
                params.push("meeting_key_contains", 0);
            }
        }

        if admin && let Some(publication) = self.publication {
            let value = match publication {
                Publication::Published => 1,
                Publication::Both => 0,
                Publication::Unpublished => -1,
            };
            params.push("advanced_published", value);
        }

        match extent {
            ResultExtent::MeetingsOnly => {}
            ResultExtent::MeetingsAndFormats => params.push("get_used_formats", 1),
            ResultExtent::FormatsOnly => params.push("get_formats_only", 1),
        }
        params
    }
}

fn encode_ids<T: Ord>(params: &mut Params, key: &str, filter: &IdFilter<T>, to_int: impl Fn(&T) -> i64) {
    for id in &filter.include {
        params.push(key, to_int(id));
    }
    for id in &filter.exclude {
        params.push(key, -to_int(id));
    }
}

fn encode_time(params: &mut Params, prefix: &str, time: Option<NaiveTime>) {
    if let Some(time) = time {
        params.push(format!("{prefix}H"), time.hour());
        params.push(format!("{prefix}M"), time.minute());
    }
}

fn encode_minutes(params: &mut Params, prefix: &str, minutes: Option<u32>) {
    if let Some(minutes) = minutes {
        params.push(format!("{prefix}H"), minutes / 60);
        params.push(format!("{prefix}M"), minutes % 60);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_criteria_encode_only_the_extent() {
        let criteria = SearchCriteria::new();
        assert!(criteria.is_empty());
        assert!(
            criteria
                .to_params(DistanceUnits::Mi, ResultExtent::MeetingsOnly, false)
                .is_empty()
        );
        let formats = criteria.to_params(DistanceUnits::Mi, ResultExtent::FormatsOnly, false);
        assert_eq!(formats.get("get_formats_only"), Some("1"));
    }

    #[test]
    fn exclusions_are_negative() {
        let criteria = SearchCriteria::new()
            .with(SearchDimension::Weekdays(IdFilter {
                include: [Weekday::Monday].into(),
                exclude: [Weekday::Sunday].into(),
            }))
            .with(SearchDimension::ServiceBodies(IdFilter::excluding([9])));
        let params = criteria.to_params(DistanceUnits::Mi, ResultExtent::MeetingsOnly, false);
        assert_eq!(params.get_all("weekdays[]").collect::<Vec<_>>(), ["2", "-1"]);
        assert_eq!(params.get_all("services[]").collect::<Vec<_>>(), ["-9"]);
    }

    #[test]
    fn area_uses_server_units() {
        let area = GeoArea {
            center: Coordinate::new(40.5, -73.25),
            radius: Radius::Distance(10.0),
        };
        let criteria = SearchCriteria::new().with(SearchDimension::Area(area));
        let km = criteria.to_params(DistanceUnits::Km, ResultExtent::MeetingsOnly, false);
        assert_eq!(km.get("geo_width_km"), Some("10"));
        assert_eq!(km.get("lat_val"), Some("40.5"));
        let mi = criteria.to_params(DistanceUnits::Mi, ResultExtent::MeetingsOnly, false);
        assert_eq!(mi.get("geo_width"), Some("10"));

        let auto = SearchCriteria::new().with(SearchDimension::Area(GeoArea {
            radius: Radius::MeetingCount(10),
            ..area
        }));
        let params = auto.to_params(DistanceUnits::Km, ResultExtent::MeetingsOnly, false);
        assert_eq!(params.get("geo_width"), Some("-10"));
    }

    #[test]
    fn times_and_durations_split_into_hours_and_minutes() {
        let criteria = SearchCriteria::new()
            .with(SearchDimension::StartsAfter(NaiveTime::from_hms_opt(18, 15, 0).unwrap()))
            .with(SearchDimension::MaxDuration(90));
        let params = criteria.to_params(DistanceUnits::Mi, ResultExtent::MeetingsOnly, false);
        assert_eq!(params.get("StartsAfterH"), Some("18"));
        assert_eq!(params.get("StartsAfterM"), Some("15"));
        assert_eq!(params.get("MaxDurationH"), Some("1"));
        assert_eq!(params.get("MaxDurationM"), Some("30"));
    }

    #[test]
    fn publication_filter_is_admin_only() {
        let criteria = SearchCriteria::new().with(SearchDimension::Publication(Publication::Unpublished));
        let anon = criteria.to_params(DistanceUnits::Mi, ResultExtent::MeetingsOnly, false);
        assert!(!anon.contains_key("advanced_published"));
        let admin = criteria.to_params(DistanceUnits::Mi, ResultExtent::MeetingsOnly, true);
        assert_eq!(admin.get("advanced_published"), Some("-1"));
    }

    #[test]
    fn text_modifiers() {
        let criteria = SearchCriteria::new().with(SearchDimension::Text(TextSearch {
            exact: true,
            ..TextSearch::address("1 Main St", Radius::MeetingCount(5))
        }));
        let params = criteria.to_params(DistanceUnits::Mi, ResultExtent::MeetingsAndFormats, false);
        assert_eq!(params.get("SearchString"), Some("1 Main St"));
        assert_eq!(params.get("StringSearchIsAnAddress"), Some("1"));
        assert_eq!(params.get("SearchStringRadius"), Some("-5"));
        assert_eq!(params.get("SearchStringExact"), Some("1"));
        assert_eq!(params.get("get_used_formats"), Some("1"));
    }

    #[test]
    fn unset_and_clear() {
        let mut criteria = SearchCriteria::new()
            .with(SearchDimension::MinDuration(30))
            .with(SearchDimension::MeetingIds([1, 2].into()));
        criteria.unset(DimensionKind::MinDuration);
        assert_eq!(criteria.meeting_ids().len(), 2);
        criteria.clear();
        assert!(criteria.is_empty());
    }
}
