//! Root Server entities.
//!
//! Everything here is a read model of what the server returns, except
//! [`EditableMeetingNode`] and [`ChangeSet`], which hold local edits until
//! they are committed.

mod change;
mod format;
mod language;
mod meeting;
mod permission;
mod server_info;
mod service_body;

pub use change::{
    ChangeId, ChangeListFilter, ChangeNode, ChangeType, ChangedMeeting, FieldChange,
    decode_changes, deleted_meetings, sort_newest_first,
};
pub use format::{FormatId, FormatLookup, FormatNode, UNKNOWN_FORMAT_KEY, decode_formats};
pub use language::{LanguageNode, decode_languages};
pub use meeting::{
    ChangeSet, EditableMeetingNode, Location, MeetingId, MeetingNode, Weekday, decode_meetings,
};
pub use permission::{PrivilegeLevel, ServiceBodyPermission, decode_permissions};
pub use server_info::{
    AvailableKeys, Coordinate, DistanceUnits, MINIMUM_SERVER_VERSION, STANDARD_MEETING_KEYS,
    ServerInfo, pack_version,
};
pub use service_body::{
    ServiceBody, ServiceBodyId, ServiceBodyTree, TreeError, TreeParent, decode_service_bodies,
};
