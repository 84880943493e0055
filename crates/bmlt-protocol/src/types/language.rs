//! Server languages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BmltError, BmltResult};
use crate::wire;

/// A language the server can localize into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageNode {
    /// Language code, such as `en`
    #[serde(deserialize_with = "wire::lenient_string")]
    pub key: String,
    /// Display name
    #[serde(default, deserialize_with = "wire::lenient_string")]
    pub name: String,
    /// Whether this is the server's native language
    #[serde(default, rename = "default", deserialize_with = "lenient_bool")]
    pub is_default: bool,
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(wire::scalar_to_string(&value).is_some_and(|s| wire::is_truthy(&s)))
}

/// Decode the language list.
///
/// `native` marks the matching entry as default when the server does not
/// flag one itself.
pub fn decode_languages(value: &Value, native: &str) -> BmltResult<Vec<LanguageNode>> {
    let list = match value {
        Value::Object(object) => object
            .get("languages")
            .ok_or_else(|| BmltError::malformed("language answer lacks `languages`"))?,
        other => other,
    };
    let mut languages: Vec<LanguageNode> = serde_json::from_value(list.clone())?;
    if !languages.iter().any(|l| l.is_default) {
        for language in &mut languages {
            language.is_default = language.key == native;
        }
    }
    Ok(languages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn native_language_becomes_default() {
        let langs = decode_languages(
            &json!({"languages": [{"key": "en", "name": "English"}, {"key": "de", "name": "Deutsch"}]}),
            "de",
        )
        .unwrap();
        assert!(!langs[0].is_default);
        assert!(langs[1].is_default);
    }

    #[test]
    fn server_flag_wins() {
        let langs = decode_languages(
            &json!([{"key": "en", "name": "English", "default": true}, {"key": "fr", "name": "Français"}]),
            "fr",
        )
        .unwrap();
        assert!(langs[0].is_default);
        assert!(!langs[1].is_default);
    }

    #[test]
    fn missing_wrapper_key_is_malformed() {
        assert!(decode_languages(&json!({"langs": []}), "en").is_err());
    }
}
