#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP transport for the Stratus cloud REST client.
//!
//! A hyper-based transport with:
//! - TLS via rustls (HTTPS only by default)
//! - Connection pooling
//! - A per-call timeout (60 seconds by default) covering headers and body
//! - Default headers (`User-Agent` and configured extras) that never override
//!   headers set on the request
//! - Optional concurrency limiting with fail-fast load shedding
//! - Transparent response decompression (gzip, brotli, deflate)
//! - Bounded body reads
//!
//! The transport never interprets status codes and never retries: every
//! response, whatever its status, is returned to the caller fully buffered.
//! Status policy lives one level up in `stratus-core`.
//!
//! # Example
//!
//! ```ignore
//! use stratus_http::{HttpTransport, TransportRequest};
//!
//! let transport = HttpTransport::builder()
//!     .user_agent("my-plugin/1.0")
//!     .build()?;
//!
//! let resp = transport
//!     .send(TransportRequest::get("https://ecs.example.com/v1/servers"))
//!     .await?;
//! println!("{} bytes", resp.body.len());
//! ```

mod builder;
mod config;
mod error;
mod layers;
mod response;
mod tls;
mod transport;

pub use builder::TransportBuilder;
pub use config::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT, TlsRootConfig,
    TransportConfig, TransportSecurity,
};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use response::{TransportResponse, parse_retry_after};
pub use transport::{HttpTransport, TransportRequest};
