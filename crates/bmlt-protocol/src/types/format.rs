//! Meeting formats.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BmltError, BmltResult};
use crate::wire;

/// Server-assigned format id
pub type FormatId = u64;

/// Key used for formats a meeting references but the catalog lacks
pub const UNKNOWN_FORMAT_KEY: &str = "?";

/// A tag describing a meeting attribute, in one language
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatNode {
    /// Format id; identical across the translations of one format
    pub id: FormatId,
    /// Short key, such as `O` or `WC`
    pub key: String,
    /// Display name in `language`
    pub name: String,
    /// Longer description in `language`
    pub description: String,
    /// Language code of `name` and `description`
    pub language: String,
    /// Cross-server grouping id for equivalent formats
    pub shared_id: Option<String>,
}

impl FormatNode {
    /// Placeholder for a format id the catalog does not contain
    #[must_use]
    pub fn unknown(id: FormatId) -> Self {
        Self {
            id,
            key: UNKNOWN_FORMAT_KEY.to_string(),
            name: "Unknown format".to_string(),
            description: String::new(),
            language: String::new(),
            shared_id: None,
        }
    }

    /// Placeholder for a format key the catalog does not contain
    #[must_use]
    pub fn unknown_key(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::unknown(0)
        }
    }

    /// Whether this is an unresolved placeholder
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.name == "Unknown format" && self.language.is_empty()
    }

    fn from_wire(object: &Map<String, Value>) -> BmltResult<Self> {
        let raw_id = wire::required(object, "id")?;
        let id = wire::parse_id(&raw_id)
            .ok_or_else(|| BmltError::malformed(format!("format id `{raw_id}` is not numeric")))?;
        let shared_id = wire::optional(object, "world_id");
        Ok(Self {
            id,
            key: wire::optional(object, "key_string"),
            name: wire::optional(object, "name_string"),
            description: wire::optional(object, "description_string"),
            language: wire::optional(object, "lang"),
            shared_id: (!shared_id.is_empty()).then_some(shared_id),
        })
    }
}

/// Decode a format list.
///
/// Accepts a bare array, or an object holding the array under `formats`.
pub fn decode_formats(value: &Value) -> BmltResult<Vec<FormatNode>> {
    let list = match value {
        Value::Object(object) => object.get("formats").unwrap_or(value),
        other => other,
    };
    wire::one_or_many(list)?
        .into_iter()
        .map(FormatNode::from_wire)
        .collect()
}

/// Format lookup used while decoding meetings
pub trait FormatLookup {
    /// Format with this id, preferring the server's native language
    fn format_by_id(&self, id: FormatId) -> Option<&FormatNode>;

    /// Format with this key string
    fn format_by_key(&self, key: &str) -> Option<&FormatNode>;
}

impl FormatLookup for [FormatNode] {
    fn format_by_id(&self, id: FormatId) -> Option<&FormatNode> {
        self.iter().find(|f| f.id == id)
    }

    fn format_by_key(&self, key: &str) -> Option<&FormatNode> {
        self.iter().find(|f| f.key == key)
    }
}
