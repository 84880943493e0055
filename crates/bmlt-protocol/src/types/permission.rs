//! Admin privileges per service body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::service_body::ServiceBodyId;
use crate::error::{BmltError, BmltResult};
use crate::wire;

/// Privilege an admin holds over one service body
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PrivilegeLevel {
    /// No access
    #[default]
    None = 0,
    /// May see unpublished meetings and history
    Observer = 1,
    /// May edit meetings
    Editor = 2,
    /// May edit meetings and the service body itself
    Administrator = 3,
}

impl PrivilegeLevel {
    /// Level for the server's numeric code
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Observer),
            2 => Some(Self::Editor),
            3 => Some(Self::Administrator),
            _ => None,
        }
    }

    /// Whether meetings may be added, edited, deleted, or rolled back
    #[must_use]
    pub fn can_edit(self) -> bool {
        self >= Self::Editor
    }
}

/// One row of the `get_permissions` answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBodyPermission {
    /// Service body id
    pub service_body_id: ServiceBodyId,
    /// Service body name
    pub name: String,
    /// Granted level
    pub level: PrivilegeLevel,
}

/// Decode the permission list.
///
/// Rows with unknown levels are skipped; a single row may arrive as a bare
/// object.
///
/// # Errors
///
/// Fails when the answer is neither an object nor an array.
pub fn decode_permissions(value: &Value) -> BmltResult<Vec<ServiceBodyPermission>> {
    let rows = match value {
        Value::Object(object) if object.contains_key("service_body") => {
            object.get("service_body").unwrap_or(&Value::Null)
        }
        Value::Object(object) if object.is_empty() => return Ok(Vec::new()),
        Value::Array(_) | Value::Object(_) | Value::Null => value,
        _ => return Err(BmltError::malformed("permission answer is not structured")),
    };
    Ok(wire::one_or_many(rows)?
        .into_iter()
        .filter_map(|row| {
            let service_body_id = wire::parse_id(&wire::optional(row, "id"))?;
            let code = wire::optional(row, "permissions").trim().parse().ok()?;
            Some(ServiceBodyPermission {
                service_body_id,
                name: wire::optional(row, "name"),
                level: PrivilegeLevel::from_code(code)?,
            })
        })
        .collect())
}
