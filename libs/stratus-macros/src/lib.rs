//! # stratus-macros
//!
//! Derives that describe request options to the `stratus-core` encoders.
//!
//! - `RequestOptions`: generate the ordered field descriptors the query
//!   encoder and body builder walk
//! - `OptionEnum`: give unit enums their external (wire) names
//!
//! Generated code refers to `::stratus_core`, so these derives are meant to be
//! used through the re-exports in that crate.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use proc_macro::TokenStream;
use proc_macro_error2::proc_macro_error;
use syn::{DeriveInput, parse_macro_input};

mod attrs;
mod option_enum;
mod request_options;

/// Derive the `RequestOptions` trait for a struct with named fields.
///
/// Field attributes, all inside `#[options(...)]`:
/// - `body = "name"`: JSON member name (defaults to the field name)
/// - `query = "name"`: emit as a query parameter; a field with a query name
///   and no body name stays out of the body
/// - `skip_body`: never part of the body
/// - `required`: fail before I/O when the value is zero
/// - `omit_zero`: leave the member out of the body when the value is zero
/// - `default = <literal>`: value sent when the supplied one is zero
///
/// Container attribute: `#[options(wrap = "key")]` wraps the body as
/// `{"key": {...}}`.
///
/// # Example
///
/// ```ignore
/// use stratus_core::RequestOptions;
///
/// #[derive(RequestOptions)]
/// #[options(wrap = "vpc")]
/// pub struct CreateVpcOpts {
///     #[options(required)]
///     pub name: String,
///     #[options(required)]
///     pub cidr: String,
///     #[options(omit_zero)]
///     pub description: Option<String>,
/// }
/// ```
#[proc_macro_derive(RequestOptions, attributes(options))]
#[proc_macro_error]
pub fn derive_request_options(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    request_options::expand_derive_request_options(&input).into()
}

/// Derive `OptionEnum` for a unit-only enum.
///
/// Variants map to `snake_case` names unless renamed with
/// `#[options(name = "...")]` or a container-level
/// `#[options(rename_all = "...")]` (`lowercase`, `UPPERCASE`, `snake_case`,
/// `SCREAMING_SNAKE_CASE`, `kebab-case`, `PascalCase`, `camelCase`).
///
/// # Example
///
/// ```ignore
/// use stratus_core::OptionEnum;
///
/// #[derive(OptionEnum)]
/// pub enum Direction {
///     Ingress,
///     Egress,
/// }
/// ```
#[proc_macro_derive(OptionEnum, attributes(options))]
#[proc_macro_error]
pub fn derive_option_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    option_enum::expand_derive_option_enum(&input).into()
}
