//! Reflection model behind `#[derive(RequestOptions)]`.
//!
//! The derive turns every named field of an options struct into a [`Field`]:
//! a static [`FieldSpec`] carrying the external names and flags, plus the
//! runtime [`FieldValue`]. The body builder and query encoder only ever see
//! this model, so hand-written implementations of [`RequestOptions`] work the
//! same as derived ones.

mod body;
mod query;

pub use body::{build_request_body, to_request_body};
pub use query::{QueryString, build_query_string};

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Literal default declared with `#[options(default = ...)]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
}

impl DefaultValue {
    #[must_use]
    pub fn to_field_value(self) -> FieldValue {
        match self {
            Self::Bool(b) => FieldValue::Bool(b),
            Self::Int(i) => FieldValue::Int(i),
            Self::Float(f) => FieldValue::Float(f),
            Self::Str(s) => FieldValue::Str(s.to_owned()),
        }
    }
}

/// Static metadata of one options field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Rust field name, used in error paths
    pub name: &'static str,
    /// JSON member name; `None` keeps the field out of the body
    pub body: Option<&'static str>,
    /// Query parameter name; `None` keeps the field out of the query string
    pub query: Option<&'static str>,
    pub required: bool,
    pub omit_zero: bool,
    pub default: Option<DefaultValue>,
}

impl FieldSpec {
    /// Spec for a plain body field named like the Rust field.
    #[must_use]
    pub const fn body(name: &'static str) -> Self {
        Self {
            name,
            body: Some(name),
            query: None,
            required: false,
            omit_zero: false,
            default: None,
        }
    }

    /// Spec for a query-only field.
    #[must_use]
    pub const fn query(name: &'static str, query: &'static str) -> Self {
        Self {
            name,
            body: None,
            query: Some(query),
            required: false,
            omit_zero: false,
            default: None,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn omit_zero(mut self) -> Self {
        self.omit_zero = true;
        self
    }

    #[must_use]
    pub const fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub spec: FieldSpec,
    pub value: FieldValue,
}

impl Field {
    #[must_use]
    pub fn new(spec: FieldSpec, value: FieldValue) -> Self {
        Self { spec, value }
    }
}

/// Runtime value of an options field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent optional (`None`)
    Null,
    /// Present optional (`Some`); never zero, even when the inner value is
    Set(Box<FieldValue>),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    /// External name of an [`OptionEnum`] variant
    Enum(&'static str),
    List(Vec<FieldValue>),
    /// Nested options record
    Record(Vec<Field>),
    /// Pre-serialized JSON (maps, `serde_json::Value`)
    Raw(Value),
}

impl FieldValue {
    /// Zero means: null, `false`, `0`, empty string, empty list, or a record
    /// whose every field is zero. `Some(false)` or `Some(0)` is not zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Set(_) => false,
            Self::Bool(b) => !*b,
            Self::Int(i) => *i == 0,
            Self::UInt(u) => *u == 0,
            Self::Float(f) => *f == 0.0,
            Self::Str(s) => s.is_empty(),
            Self::Enum(_) => false,
            Self::List(items) => items.is_empty(),
            Self::Record(fields) => fields.iter().all(|f| f.value.is_zero()),
            Self::Raw(value) => match value {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::Array(a) => a.is_empty(),
                Value::Object(o) => o.is_empty(),
                Value::Bool(_) | Value::Number(_) => false,
            },
        }
    }

    /// The value with any `Some` layers peeled off.
    #[must_use]
    pub fn inner(&self) -> &Self {
        let mut value = self;
        while let Self::Set(inner) = value {
            value = inner;
        }
        value
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Set(inner) => inner.kind_name(),
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::UInt(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Enum(_) => "enum",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Raw(_) => "json",
        }
    }
}

/// Conversion into the reflection model. Implemented by the derives and for
/// the field types options structs commonly use.
pub trait ToFieldValue {
    fn to_field_value(&self) -> FieldValue;
}

/// An options record whose fields feed the body builder and query encoder.
pub trait RequestOptions {
    fn fields(&self) -> Vec<Field>;

    /// Top-level key the request body is wrapped in, if any.
    fn body_wrap(&self) -> Option<&'static str> {
        None
    }
}

/// A closed set of string values with fixed external names.
pub trait OptionEnum {
    fn external_name(&self) -> &'static str;
}

macro_rules! signed_field_value {
    ($($t:ty),*) => {$(
        impl ToFieldValue for $t {
            fn to_field_value(&self) -> FieldValue {
                FieldValue::Int(i64::from(*self))
            }
        }
    )*};
}

macro_rules! unsigned_field_value {
    ($($t:ty),*) => {$(
        impl ToFieldValue for $t {
            fn to_field_value(&self) -> FieldValue {
                FieldValue::UInt(u64::from(*self))
            }
        }
    )*};
}

signed_field_value!(i8, i16, i32, i64);
unsigned_field_value!(u8, u16, u32, u64);

impl ToFieldValue for isize {
    fn to_field_value(&self) -> FieldValue {
        i64::try_from(*self).map_or(FieldValue::Null, FieldValue::Int)
    }
}

impl ToFieldValue for usize {
    fn to_field_value(&self) -> FieldValue {
        u64::try_from(*self).map_or(FieldValue::Null, FieldValue::UInt)
    }
}

impl ToFieldValue for f32 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Float(f64::from(*self))
    }
}

impl ToFieldValue for f64 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Float(*self)
    }
}

impl ToFieldValue for bool {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }
}

impl ToFieldValue for str {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Str(self.to_owned())
    }
}

impl ToFieldValue for String {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Str(self.clone())
    }
}

impl<T: ToFieldValue + ?Sized> ToFieldValue for &T {
    fn to_field_value(&self) -> FieldValue {
        (**self).to_field_value()
    }
}

impl<T: ToFieldValue + ?Sized> ToFieldValue for Box<T> {
    fn to_field_value(&self) -> FieldValue {
        (**self).to_field_value()
    }
}

impl<T: ToFieldValue> ToFieldValue for Option<T> {
    fn to_field_value(&self) -> FieldValue {
        self.as_ref().map_or(FieldValue::Null, |v| {
            FieldValue::Set(Box::new(v.to_field_value()))
        })
    }
}

impl<T: ToFieldValue> ToFieldValue for [T] {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::List(self.iter().map(ToFieldValue::to_field_value).collect())
    }
}

impl<T: ToFieldValue> ToFieldValue for Vec<T> {
    fn to_field_value(&self) -> FieldValue {
        self.as_slice().to_field_value()
    }
}

impl ToFieldValue for Value {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Raw(self.clone())
    }
}

impl<V: Serialize> ToFieldValue for BTreeMap<String, V> {
    fn to_field_value(&self) -> FieldValue {
        serde_json::to_value(self).map_or(FieldValue::Null, FieldValue::Raw)
    }
}

impl<V: Serialize, S: BuildHasher> ToFieldValue for HashMap<String, V, S> {
    fn to_field_value(&self) -> FieldValue {
        serde_json::to_value(self).map_or(FieldValue::Null, FieldValue::Raw)
    }
}

/// Timestamps travel as RFC 3339 with a `Z` suffix.
impl ToFieldValue for DateTime<Utc> {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Str(self.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_zero_values() {
        assert!(FieldValue::Null.is_zero());
        assert!(false.to_field_value().is_zero());
        assert!(0u32.to_field_value().is_zero());
        assert!((-0i64).to_field_value().is_zero());
        assert!(0.0f64.to_field_value().is_zero());
        assert!(String::new().to_field_value().is_zero());
        assert!(Vec::<String>::new().to_field_value().is_zero());
        assert!(None::<i32>.to_field_value().is_zero());
        assert!(Value::Null.to_field_value().is_zero());
        assert!(BTreeMap::<String, String>::new().to_field_value().is_zero());

        assert!(!true.to_field_value().is_zero());
        assert!(!(-1i32).to_field_value().is_zero());
        assert!(!"x".to_field_value().is_zero());
        assert!(!Some(0).to_field_value().is_zero());
        assert!(!FieldValue::Enum("ipv4").is_zero());
    }

    #[test]
    fn test_record_zero_requires_all_fields_zero() {
        let zero = FieldValue::Record(vec![
            Field::new(FieldSpec::body("a"), FieldValue::Null),
            Field::new(FieldSpec::body("b"), FieldValue::Int(0)),
        ]);
        assert!(zero.is_zero());

        let partial = FieldValue::Record(vec![
            Field::new(FieldSpec::body("a"), FieldValue::Null),
            Field::new(FieldSpec::body("b"), FieldValue::Int(3)),
        ]);
        assert!(!partial.is_zero());
    }

    #[test]
    fn test_option_some_keeps_presence() {
        assert_eq!(
            Some("web").to_field_value(),
            FieldValue::Set(Box::new(FieldValue::Str("web".into())))
        );
        let zero = Some(0u16).to_field_value();
        assert!(!zero.is_zero());
        assert_eq!(zero.inner(), &FieldValue::UInt(0));
        assert_eq!(zero.kind_name(), "integer");
        assert!(!Some(false).to_field_value().is_zero());
        assert!(!Some(Some(String::new())).to_field_value().is_zero());
        assert_eq!(
            Some(Some(7i32)).to_field_value().inner(),
            &FieldValue::Int(7)
        );
    }

    #[test]
    fn test_datetime_is_rfc3339() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            at.to_field_value(),
            FieldValue::Str("2024-03-01T12:30:00Z".into())
        );
    }

    #[test]
    fn test_default_value_conversion() {
        assert_eq!(
            DefaultValue::Str("ipv4").to_field_value(),
            FieldValue::Str("ipv4".into())
        );
        assert_eq!(DefaultValue::Int(-1).to_field_value(), FieldValue::Int(-1));
    }

    #[test]
    fn test_map_becomes_raw_object() {
        let mut tags = HashMap::new();
        tags.insert("env".to_owned(), "prod".to_owned());
        assert_eq!(
            tags.to_field_value(),
            FieldValue::Raw(serde_json::json!({"env": "prod"}))
        );
    }
}
