//! Server capabilities reported by `GetServerInfo`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{BmltError, BmltResult};
use crate::wire;

/// Oldest server release (2.8.12) that speaks the semantic interface this
/// crate expects
pub const MINIMUM_SERVER_VERSION: u32 = 2_008_012;

/// Meeting keys every compatible server must publish
pub const STANDARD_MEETING_KEYS: [&str; 19] = [
    "id_bigint",
    "service_body_bigint",
    "weekday_tinyint",
    "start_time",
    "duration_time",
    "formats",
    "longitude",
    "latitude",
    "meeting_name",
    "location_text",
    "location_info",
    "location_street",
    "location_city_subsection",
    "location_neighborhood",
    "location_municipality",
    "location_sub_province",
    "location_province",
    "location_postal_code_1",
    "comments",
];

/// Keys accepted on meetings even when the server does not list them
const IMPLICIT_MEETING_KEYS: [&str; 3] = ["published", "format_shared_id_list", "root_server_id"];

/// Unit the server measures search radii in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnits {
    /// Statute miles
    #[default]
    Mi,
    /// Kilometers
    Km,
}

impl fmt::Display for DistanceUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mi => "mi",
            Self::Km => "km",
        })
    }
}

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude
    pub latitude: f64,
    /// Longitude
    pub longitude: f64,
}

impl Coordinate {
    /// New coordinate
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and in range
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// The meeting value keys a server publishes.
///
/// Dynamic meeting fields are checked against this set when decoded and
/// before edits are submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableKeys(BTreeSet<String>);

impl AvailableKeys {
    /// Build from any list of keys
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    /// The standard key set
    #[must_use]
    pub fn standard() -> Self {
        Self::new(STANDARD_MEETING_KEYS)
    }

    /// Whether a meeting may carry `key`
    #[must_use]
    pub fn accepts(&self, key: &str) -> bool {
        self.0.contains(key) || IMPLICIT_MEETING_KEYS.contains(&key)
    }

    /// Standard keys this set lacks
    #[must_use]
    pub fn missing_standard(&self) -> Vec<&'static str> {
        STANDARD_MEETING_KEYS
            .iter()
            .copied()
            .filter(|k| !self.0.contains(*k))
            .collect()
    }

    /// Iterate over the published keys
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of published keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no keys are published
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capabilities and defaults of one Root Server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Version string, such as `2.16.4`
    pub version: String,
    /// Version packed as `major * 1_000_000 + minor * 1_000 + patch`
    pub version_int: u32,
    /// Meeting value keys the server publishes
    pub available_keys: AvailableKeys,
    /// Historical versions retained per meeting
    pub change_depth: u32,
    /// Unit for search radii
    pub distance_units: DistanceUnits,
    /// Map center the server is configured for
    pub default_location: Coordinate,
    /// Map zoom the server is configured for
    pub center_zoom: u8,
    /// Default meeting duration, `HH:MM:SS`
    pub default_duration: String,
    /// Native language code
    pub native_language: String,
    /// Language codes the server lists
    pub languages: Vec<String>,
    /// Geocoding region bias
    pub region_bias: String,
    /// Character set of text fields
    pub char_set: String,
    /// Whether semantic administration is enabled
    pub admin_available: bool,
    /// Whether meeting contacts can be emailed
    pub email_contacts_enabled: bool,
    /// Whether service body admins are copied on contact emails
    pub email_service_body_admins_enabled: bool,
}

impl ServerInfo {
    /// Decode the `GetServerInfo` answer, an array with one object
    ///
    /// # Errors
    ///
    /// Returns a malformed-payload error when the answer has no object or no
    /// usable version.
    pub fn decode(value: &Value) -> BmltResult<Self> {
        let object = match value {
            Value::Array(items) => items.first().and_then(Value::as_object),
            Value::Object(object) => Some(object),
            _ => None,
        }
        .ok_or_else(|| BmltError::malformed("server info is not an object"))?;
        Self::from_object(object)
    }

    fn from_object(object: &Map<String, Value>) -> BmltResult<Self> {
        let version = wire::optional(object, "version");
        let version_int = wire::optional(object, "versionInt")
            .trim()
            .parse()
            .ok()
            .or_else(|| pack_version(&version))
            .ok_or_else(|| BmltError::malformed("server info lacks a version"))?;

        let float = |key: &str| wire::optional(object, key).trim().parse::<f64>().unwrap_or(0.0);
        let flag = |key: &str| wire::is_truthy(&wire::optional(object, key));

        Ok(Self {
            version,
            version_int,
            available_keys: AvailableKeys::new(wire::split_csv(&wire::optional(
                object,
                "available_keys",
            ))),
            change_depth: wire::optional(object, "changesPerMeeting")
                .trim()
                .parse()
                .unwrap_or(0),
            distance_units: match wire::optional(object, "distanceUnits").trim() {
                "km" | "KM" => DistanceUnits::Km,
                _ => DistanceUnits::Mi,
            },
            default_location: Coordinate::new(float("centerLatitude"), float("centerLongitude")),
            center_zoom: wire::optional(object, "centerZoom")
                .trim()
                .parse()
                .unwrap_or(0),
            default_duration: wire::optional(object, "defaultDuration"),
            native_language: wire::optional(object, "nativeLang"),
            languages: wire::split_csv(&wire::optional(object, "langs")),
            region_bias: wire::optional(object, "regionBias"),
            char_set: wire::optional(object, "charSet"),
            admin_available: flag("semanticAdmin"),
            email_contacts_enabled: flag("emailEnabled"),
            email_service_body_admins_enabled: flag("emailIncludesServiceBodies"),
        })
    }

    /// Whether the server is at least `minimum`
    #[must_use]
    pub fn meets_version(&self, minimum: u32) -> bool {
        self.version_int >= minimum
    }
}

/// Pack `major.minor.patch` into the integer form the server reports
#[must_use]
pub fn pack_version(version: &str) -> Option<u32> {
    let mut parts = version.trim().split('.').map(|p| p.parse::<u32>().ok());
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    if minor >= 1_000 || patch >= 1_000 {
        return None;
    }
    major.checked_mul(1_000_000)?.checked_add(minor * 1_000 + patch)
}
