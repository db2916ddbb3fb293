use std::fmt;

use serde_json::Value;

use super::{FieldValue, RequestOptions};
use crate::error::{CloudError, CloudResult};

/// Encoded query parameters in declaration order.
///
/// Displays as `?a=1&b=2`, or as the empty string when there are no pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryString {
    pairs: Vec<(String, String)>,
}

impl QueryString {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `a=1&b=2`, without the leading `?`.
    #[must_use]
    pub fn encoded(&self) -> String {
        serde_urlencoded::to_string(&self.pairs).unwrap_or_default()
    }
}

impl fmt::Display for QueryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pairs.is_empty() {
            return Ok(());
        }
        write!(f, "?{}", self.encoded())
    }
}

/// Encode the query-tagged fields of an options record.
///
/// Zero values are skipped unless a default is declared; `Some(0)` or
/// `Some(false)` is not zero and is sent. A required field fails only when
/// it is absent (`None`); a plain `0` or `false` is sent as-is. Lists repeat
/// the parameter once per element.
///
/// # Errors
/// `MissingRequired` for an absent required field, `BadOptions` for nested
/// records, maps, or lists of lists, whether or not they hold data.
pub fn build_query_string<O>(opts: &O) -> CloudResult<QueryString>
where
    O: RequestOptions + ?Sized,
{
    let mut query = QueryString::new();
    for field in opts.fields() {
        let Some(key) = field.spec.query else {
            continue;
        };
        check_kind(&field.value, field.spec.name)?;
        let value = if field.value.is_zero() {
            if let Some(default) = field.spec.default {
                default.to_field_value()
            } else if field.spec.required {
                if field.value == FieldValue::Null {
                    return Err(CloudError::missing_required(field.spec.name));
                }
                field.value
            } else {
                continue;
            }
        } else {
            field.value
        };

        if let FieldValue::List(items) = value.inner() {
            for item in items {
                query.push(key, scalar(item, field.spec.name)?);
            }
        } else {
            query.push(key, scalar(&value, field.spec.name)?);
        }
    }
    Ok(query)
}

fn is_compound(value: &FieldValue) -> bool {
    matches!(
        value.inner(),
        FieldValue::List(_)
            | FieldValue::Record(_)
            | FieldValue::Raw(Value::Object(_) | Value::Array(_))
    )
}

/// Rejects shapes a query parameter cannot carry, independent of the value.
fn check_kind(value: &FieldValue, field: &str) -> CloudResult<()> {
    let bad = match value.inner() {
        FieldValue::List(items) => items.iter().find(|item| is_compound(item)),
        other if is_compound(other) => Some(other),
        _ => None,
    };
    match bad {
        Some(bad) => Err(CloudError::bad_options(
            field,
            format!("{} cannot be encoded as a query parameter", bad.kind_name()),
        )),
        None => Ok(()),
    }
}

fn scalar(value: &FieldValue, field: &str) -> CloudResult<String> {
    let value = value.inner();
    let unsupported = || {
        CloudError::bad_options(
            field,
            format!("{} cannot be encoded as a query parameter", value.kind_name()),
        )
    };
    Ok(match value {
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Int(i) => i.to_string(),
        FieldValue::UInt(u) => u.to_string(),
        FieldValue::Float(f) => f.to_string(),
        FieldValue::Str(s) => s.clone(),
        FieldValue::Enum(name) => (*name).to_owned(),
        FieldValue::Raw(Value::String(s)) => s.clone(),
        FieldValue::Raw(Value::Number(n)) => n.to_string(),
        FieldValue::Raw(Value::Bool(b)) => b.to_string(),
        FieldValue::Null
        | FieldValue::Set(_)
        | FieldValue::List(_)
        | FieldValue::Record(_)
        | FieldValue::Raw(_) => {
            return Err(unsupported());
        }
    })
}
