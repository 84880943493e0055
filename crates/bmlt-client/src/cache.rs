//! Reference data loaded during bootstrap.
//!
//! A [`ReferenceCache`] only exists once every bootstrap step has
//! succeeded; it is built in one go and then shared read-only. The one
//! mutable part is the "all used formats" list, which is refreshed on
//! demand and kept apart from the full format catalog.

use bmlt_protocol::{
    AvailableKeys, FormatId, FormatLookup, FormatNode, LanguageNode, ServerInfo, ServiceBodyTree,
};
use parking_lot::RwLock;

/// Formats, service bodies, languages, and capabilities of one server
#[derive(Debug)]
pub struct ReferenceCache {
    server_info: ServerInfo,
    formats: Vec<FormatNode>,
    service_bodies: ServiceBodyTree,
    languages: Vec<LanguageNode>,
    used_formats: RwLock<Option<Vec<FormatNode>>>,
}

impl ReferenceCache {
    pub(crate) fn new(
        server_info: ServerInfo,
        formats: Vec<FormatNode>,
        service_bodies: ServiceBodyTree,
        languages: Vec<LanguageNode>,
    ) -> Self {
        Self {
            server_info,
            formats,
            service_bodies,
            languages,
            used_formats: RwLock::new(None),
        }
    }

    /// Server capabilities
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Every format the server defines, in all languages
    pub fn formats(&self) -> &[FormatNode] {
        &self.formats
    }

    /// Formats in one language
    pub fn formats_in(&self, language: &str) -> impl Iterator<Item = &FormatNode> {
        self.formats.iter().filter(move |f| f.language == language)
    }

    /// Service bodies, flat and hierarchical
    pub fn service_bodies(&self) -> &ServiceBodyTree {
        &self.service_bodies
    }

    /// Languages the server offers
    pub fn languages(&self) -> &[LanguageNode] {
        &self.languages
    }

    /// The server's default language
    pub fn default_language(&self) -> Option<&LanguageNode> {
        self.languages.iter().find(|l| l.is_default)
    }

    /// Meeting keys the server publishes
    pub fn available_keys(&self) -> &AvailableKeys {
        &self.server_info.available_keys
    }

    /// Historical versions retrievable per meeting
    pub fn change_depth(&self) -> u32 {
        self.server_info.change_depth
    }

    /// Formats referenced by at least one meeting, once fetched
    pub fn used_formats(&self) -> Option<Vec<FormatNode>> {
        self.used_formats.read().clone()
    }

    pub(crate) fn set_used_formats(&self, formats: Vec<FormatNode>) {
        *self.used_formats.write() = Some(formats);
    }

    fn native(&self) -> &str {
        &self.server_info.native_language
    }
}

impl FormatLookup for ReferenceCache {
    fn format_by_id(&self, id: FormatId) -> Option<&FormatNode> {
        let native = self.native();
        self.formats
            .iter()
            .find(|f| f.id == id && f.language == native)
            .or_else(|| self.formats.format_by_id(id))
    }

    fn format_by_key(&self, key: &str) -> Option<&FormatNode> {
        let native = self.native();
        self.formats
            .iter()
            .find(|f| f.key == key && f.language == native)
            .or_else(|| self.formats.format_by_key(key))
    }
}
