//! # BMLT Protocol
//!
//! Entity types, error kinds, and wire decoding for the semantic interface of
//! a BMLT Root Server (a meeting-directory server).
//!
//! This crate has no I/O. It defines:
//!
//! - **Operations**: [`Operation`] identifiers and ordered request [`Params`]
//! - **Entities**: formats, service bodies (flat list plus an index-linked
//!   [`ServiceBodyTree`]), languages, server capabilities, meetings, change
//!   history, and admin permissions
//! - **Search**: [`SearchCriteria`] and its encoding into request parameters
//! - **Errors**: [`BmltError`] with an [`ErrorKind`] per failure class
//!
//! ## Example
//!
//! ```rust
//! use bmlt_protocol::{
//!     DistanceUnits, IdFilter, ResultExtent, SearchCriteria, SearchDimension, Weekday,
//! };
//!
//! let criteria = SearchCriteria::new()
//!     .with(SearchDimension::Weekdays(IdFilter::including([Weekday::Monday])));
//! let params = criteria.to_params(DistanceUnits::Mi, ResultExtent::MeetingsOnly, false);
//! assert_eq!(params.get("weekdays[]"), Some("2"));
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod operation;
pub mod search;
pub mod types;
mod wire;

pub use error::{BmltError, BmltResult, BootstrapFailure, ErrorCode, ErrorKind};
pub use operation::{Operation, Params};
pub use search::{
    DimensionKind, FieldMatch, GeoArea, IdFilter, Publication, Radius, ResultExtent,
    SearchCriteria, SearchDimension, TextSearch,
};
pub use types::*;
