#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Cloud REST client core shared by infrastructure provider plugins.
//!
//! Every service binding (compute, network, storage, identity) is a thin layer
//! over the pieces in this crate:
//! - [`Endpoint`] resolves resource URLs from a base URL and optional project
//! - the [`RequestOptions`] derive turns typed option structs into JSON bodies
//!   and query strings
//! - [`ServiceClient`] issues authenticated calls, checks status codes and
//!   refreshes the token once on `401`
//! - [`Outcome`] and [`ApiResponse`] extract typed values from replies
//! - [`Pager`] walks single, linked and marker-paged listings
//! - [`StateChangeConf`] polls until an asynchronous operation settles
//! - [`filter_list`] narrows listings the API cannot filter itself
//!
//! Failures are reported as [`CloudError`].
//!
//! # Example
//!
//! ```ignore
//! use stratus_core::{RequestOptions, RequestOpts, ServiceClient};
//!
//! #[derive(RequestOptions)]
//! #[options(wrap = "vpc")]
//! struct CreateVpcOpts {
//!     #[options(required)]
//!     name: String,
//!     cidr: String,
//! }
//!
//! let client = ServiceClient::builder()
//!     .base_url("https://vpc.example.com/v1")
//!     .project_id(project)
//!     .token_source(source)
//!     .build()?;
//!
//! let body = stratus_core::to_request_body(&CreateVpcOpts { name, cidr })?;
//! let vpc: Vpc = client
//!     .post(&client.service_url(&["vpcs"]), &body, &RequestOpts::new())
//!     .await?
//!     .extract_into_struct("vpc")?;
//! ```

// Lets the derives expand to `::stratus_core::...` inside this crate too.
extern crate self as stratus_core;

pub mod auth;
pub mod builder;
pub mod client;
pub mod config;
pub mod decode;
pub mod endpoint;
pub mod error;
pub mod filter;
pub mod options;
pub mod pagination;
pub mod result;
pub mod secret;
pub mod waiter;

pub use auth::{AUTH_TOKEN_HEADER, StaticToken, TokenCell, TokenSource};
pub use builder::ServiceClientBuilder;
pub use client::{RequestOpts, ServiceClient};
pub use config::{ClientConfig, TlsRoots};
pub use endpoint::{Endpoint, append_query};
pub use error::{CloudError, CloudResult, InvalidRequestKind, RemoteError, RemoteKind};
pub use filter::{FilterConstraint, filter_list};
pub use options::{
    OptionEnum, QueryString, RequestOptions, build_query_string, build_request_body,
    to_request_body,
};
pub use pagination::{Page, PageKind, Pager};
pub use result::{ApiResponse, CreateResult, DeleteResult, GetResult, Outcome, UpdateResult};
pub use secret::AuthToken;
pub use waiter::{NOT_FOUND_STATE, StateChangeConf, wait_for_state};

pub use stratus_http::{HttpError, HttpTransport, TransportBuilder};
pub use tokio_util::sync::CancellationToken;

/// Derives share their names with the traits they implement.
pub use stratus_macros::{OptionEnum, RequestOptions};
