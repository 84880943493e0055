//! Common imports for hosts.
//!
//! ```rust,no_run
//! use bmlt_client::prelude::*;
//!
//! # async fn example() -> BmltResult<()> {
//! let session = Session::builder().connect("https://bmlt.example.org/main_server");
//! let cache = session.wait_ready().await?;
//! println!("{} service bodies", cache.service_bodies().len());
//! # Ok(())
//! # }
//! ```

pub use crate::{CRATE_NAME, VERSION};

pub use crate::{
    BootstrapState, ChannelObserver, Event, LoginState, Notification, NotificationContext,
    OperationId, ReferenceCache, Session, SessionBuilder, SessionConfig, SessionId,
    SessionObserver, TracingObserver,
};

pub use bmlt_protocol::{
    BmltError, BmltResult, ChangeListFilter, ChangeNode, ChangeSet, ChangedMeeting,
    DimensionKind, EditableMeetingNode, ErrorKind, FormatNode, IdFilter, MeetingId, MeetingNode,
    Publication, ResultExtent, SearchCriteria, SearchDimension, ServiceBody, ServiceBodyId,
    Weekday,
};
