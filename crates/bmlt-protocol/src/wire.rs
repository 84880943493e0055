//! Lenient scalar decoding.
//!
//! The Root Server encodes almost every value as a JSON string, but older
//! releases emit bare numbers and booleans for some fields. These helpers
//! normalize both shapes.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{BmltError, BmltResult};

/// Render a scalar as the string the server would have sent
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Null => None,
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => None,
    }
}

/// Serde adapter accepting a string, number, or bool
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value).unwrap_or_default())
}

/// `"1"`, `"true"` and friends
pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}

/// Parse a numeric id; `None` for empty or non-numeric text
pub(crate) fn parse_id(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

/// Split a comma-separated list, dropping empty entries
pub(crate) fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Flatten an object of scalars into string pairs
pub(crate) fn object_to_strings(object: &Map<String, Value>) -> Vec<(String, String)> {
    object
        .iter()
        .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
        .collect()
}

/// Accept either an array of objects or a single object.
///
/// Several admin answers collapse one-element lists into a bare object.
pub(crate) fn one_or_many(value: &Value) -> BmltResult<Vec<&Map<String, Value>>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| BmltError::malformed("expected an array of objects"))
            })
            .collect(),
        Value::Object(object) => Ok(vec![object]),
        Value::Null => Ok(Vec::new()),
        _ => Err(BmltError::malformed("expected an object or an array")),
    }
}

/// Required string field of an object
pub(crate) fn required(object: &Map<String, Value>, key: &str) -> BmltResult<String> {
    object
        .get(key)
        .and_then(scalar_to_string)
        .ok_or_else(|| BmltError::malformed(format!("missing field `{key}`")))
}

/// Optional string field of an object, empty when absent
pub(crate) fn optional(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(scalar_to_string)
        .unwrap_or_default()
}
