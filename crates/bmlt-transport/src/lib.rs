//! # BMLT Transport
//!
//! The HTTPS gateway between a BMLT session and its Root Server.
//!
//! A [`Gateway`] turns an [`Operation`](bmlt_protocol::Operation) plus
//! [`Params`](bmlt_protocol::Params) into a decoded [`Payload`]. It knows
//! nothing about meetings or formats; that decoding lives in
//! `bmlt-protocol`.
//!
//! ## Security
//!
//! - Root URIs must be `https`. Plain `http` is refused with
//!   [`TransportError::InsecureUri`] unless [`TlsConfig::allow_loopback_http`]
//!   is set *and* the host is a loopback address.
//! - Certificates are validated by default. [`TlsConfig::insecure`] only
//!   takes effect when `BMLT_ALLOW_INSECURE_TLS=1` is set.
//! - Session credentials are carried as an opaque [`Credential`] whose
//!   `Debug` output is redacted.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bmlt_protocol::{Operation, Params};
//! use bmlt_transport::{Gateway, GatewayConfig, GatewayRequest, HttpsGateway};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = HttpsGateway::new("https://bmlt.example.org/main_server", GatewayConfig::default())?;
//! let payload = gateway
//!     .request(GatewayRequest::new(Operation::ServerInfo, Params::new()))
//!     .await?;
//! println!("{:?}", payload.as_json());
//! # Ok(())
//! # }
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

pub mod config;
pub mod error;
pub mod gateway;
pub mod https;
pub mod metrics;
pub mod uri;

pub use config::{GatewayConfig, TimeoutConfig, TlsConfig, TlsVersion};
pub use error::{TransportError, TransportResult};
pub use gateway::{BoxFuture, Credential, Gateway, GatewayRequest, Payload, PayloadBody};
pub use https::HttpsGateway;
pub use metrics::{AtomicGatewayMetrics, GatewayMetrics};
pub use uri::RootUri;
