//! Operation identifiers and request parameters.
//!
//! A request to the Root Server is an [`Operation`] plus an ordered list of
//! key/value [`Params`]. Keys may repeat (`services[]=1&services[]=4`), so
//! parameters are kept as a sequence rather than a map.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Path of the public semantic interface
const CLIENT_JSON: &str = "client_interface/json/";
/// Path of the semantic administration interface
const ADMIN_JSON: &str = "local_server/server_admin/json.php";

/// A well-known Root Server operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Operation {
    /// Server capabilities
    ServerInfo,
    /// Format catalog
    Formats,
    /// Flat service body list
    ServiceBodies,
    /// Available languages
    Languages,
    /// Meeting search
    Search,
    /// Public change history
    Changes,
    /// Admin login
    Login,
    /// Admin logout
    Logout,
    /// Per-service-body privilege list
    Permissions,
    /// Change fields of an existing meeting
    ModifyMeeting,
    /// Create a meeting
    AddMeeting,
    /// Delete a meeting
    DeleteMeeting,
    /// Undelete a meeting
    RestoreDeletedMeeting,
    /// Revert a meeting to the state before a change
    RollbackMeeting,
    /// Change history including admin-only detail
    AdminChanges,
    /// Contact form for meeting contacts
    SendMessage,
}

impl Operation {
    /// Path relative to the root URI
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Languages => "client_interface/json/GetLangs.php",
            Self::SendMessage => "client_interface/contact.php",
            Self::ServerInfo
            | Self::Formats
            | Self::ServiceBodies
            | Self::Search
            | Self::Changes => CLIENT_JSON,
            _ => ADMIN_JSON,
        }
    }

    /// Query pair identifying the operation on a shared path
    #[must_use]
    pub const fn selector(self) -> Option<(&'static str, &'static str)> {
        let pair = match self {
            Self::ServerInfo => ("switcher", "GetServerInfo"),
            Self::Formats => ("switcher", "GetFormats"),
            Self::ServiceBodies => ("switcher", "GetServiceBodies"),
            Self::Search => ("switcher", "GetSearchResults"),
            Self::Changes => ("switcher", "GetChanges"),
            Self::Login => ("admin_action", "login"),
            Self::Logout => ("admin_action", "logout"),
            Self::Permissions => ("admin_action", "get_permissions"),
            Self::ModifyMeeting => ("admin_action", "modify_meeting"),
            Self::AddMeeting => ("admin_action", "add_meeting"),
            Self::DeleteMeeting => ("admin_action", "delete_meeting"),
            Self::RestoreDeletedMeeting => ("admin_action", "restore_deleted_meeting"),
            Self::RollbackMeeting => ("admin_action", "rollback_meeting_to_before_change"),
            Self::AdminChanges => ("admin_action", "get_changes"),
            Self::Languages | Self::SendMessage => return None,
        };
        Some(pair)
    }

    /// Whether the operation goes through semantic administration
    #[must_use]
    pub const fn is_admin(self) -> bool {
        !matches!(
            self,
            Self::ServerInfo
                | Self::Formats
                | Self::ServiceBodies
                | Self::Languages
                | Self::Search
                | Self::Changes
                | Self::SendMessage
        )
    }

    /// Short name used in logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ServerInfo => "server_info",
            Self::Formats => "formats",
            Self::ServiceBodies => "service_bodies",
            Self::Languages => "languages",
            Self::Search => "search",
            Self::Changes => "changes",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Permissions => "permissions",
            Self::ModifyMeeting => "modify_meeting",
            Self::AddMeeting => "add_meeting",
            Self::DeleteMeeting => "delete_meeting",
            Self::RestoreDeletedMeeting => "restore_deleted_meeting",
            Self::RollbackMeeting => "rollback_meeting",
            Self::AdminChanges => "admin_changes",
            Self::SendMessage => "send_message",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered request parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Empty parameter list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// Append a pair; existing pairs with the same key are kept
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.push((key.into(), value.to_string()));
    }

    /// Append every pair of `other`
    pub fn extend(&mut self, other: Params) {
        self.0.extend(other.0);
    }

    /// First value for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in insertion order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether any pair uses `key`
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Iterate over pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no pairs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow as a slice, the shape HTTP query builders accept
    #[must_use]
    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}
