//! # BMLT Client
//!
//! A stateful session with a BMLT Root Server: bootstrap, cached reference
//! data, meeting search, admin login, and versioned meeting edits.
//!
//! ## Features
//!
//! - **Atomic bootstrap**: server info, formats, service bodies, and
//!   languages are loaded in sequence; the session is either fully `Ready`
//!   or `Invalid`, never half-loaded
//! - **Snapshot searches**: criteria are copied when a search is issued, so
//!   concurrent searches never see each other's criteria
//! - **Admin session**: login/logout state machine with the credential held
//!   only in memory; privileges are re-checked against the server on every
//!   edit
//! - **Versioned edits**: add, commit, delete, restore, copy, and rollback
//!   bounded by the server's change depth
//! - **Ordered notifications**: one observer, called one notification at a
//!   time, in the order operations complete
//!
//! ## Architecture
//!
//! ```text
//! host ──ops──► Session ──spawn──► task ──► Gateway (HTTPS) ──► Root Server
//!                  │                 │
//!                  │                 └──batch──► NotificationDispatcher
//!                  │                                  │
//!                  └── ReferenceCache                 └──► SessionObserver
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use bmlt_client::prelude::*;
//!
//! #[derive(Debug)]
//! struct Printer;
//!
//! #[async_trait]
//! impl SessionObserver for Printer {
//!     async fn server_validated(&self, _ctx: NotificationContext, valid: bool) {
//!         println!("server valid: {valid}");
//!     }
//!
//!     async fn error_occurred(&self, _ctx: NotificationContext, error: BmltError) {
//!         eprintln!("{} ({})", error, error.localization_key());
//!     }
//!
//!     async fn search_results_ready(&self, _ctx: NotificationContext, meetings: Vec<MeetingNode>) {
//!         println!("{} meetings", meetings.len());
//!     }
//! }
//!
//! # async fn example() -> BmltResult<()> {
//! let session = Session::builder()
//!     .observer(Arc::new(Printer))
//!     .connect("https://bmlt.example.org/main_server");
//! session.wait_ready().await?;
//!
//! session.set_criterion(SearchDimension::Weekdays(IdFilter::including([Weekday::Monday])));
//! session.search()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Issuing an operation only fails when the session is not `Ready`
//! (`SessionUnavailable`). Everything else is reported asynchronously:
//! `error_occurred` followed by the operation's own event with an empty
//! payload, so each operation ends with exactly one terminal event.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod admin;
pub mod bootstrap;
pub mod cache;
pub mod config;
mod dispatcher;
mod edit;
pub mod notification;
pub mod prelude;
mod search;
pub mod session;

pub use admin::LoginState;
pub use bootstrap::BootstrapState;
pub use cache::ReferenceCache;
pub use config::{ConfigError, SessionConfig};
pub use notification::{
    ChannelObserver, Event, Notification, NotificationContext, OperationId, SessionId,
    SessionObserver, TracingObserver,
};
pub use session::{BOOTSTRAP_OPERATION, Session, SessionBuilder};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
