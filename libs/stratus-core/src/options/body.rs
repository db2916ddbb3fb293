use std::borrow::Cow;
use std::collections::HashSet;

use serde_json::{Map, Number, Value};

use super::{Field, FieldValue, RequestOptions};
use crate::error::{CloudError, CloudResult};

/// Build the JSON body for an options record.
///
/// Per field, in declaration order:
/// - a zero value with a default emits the default;
/// - a zero value marked required fails with `MissingRequired`;
/// - a zero value marked `omit_zero` is skipped;
/// - anything else is emitted under its body name.
///
/// When `wrap` is given the object is nested under that single key.
///
/// # Errors
/// `InvalidRequest` with the dotted path of the offending field.
pub fn build_request_body<O>(opts: &O, wrap: Option<&str>) -> CloudResult<Value>
where
    O: RequestOptions + ?Sized,
{
    let object = build_object(&opts.fields(), "")?;
    Ok(match wrap {
        Some(key) => {
            let mut outer = Map::with_capacity(1);
            outer.insert(key.to_owned(), Value::Object(object));
            Value::Object(outer)
        }
        None => Value::Object(object),
    })
}

/// [`build_request_body`] using the record's own `#[options(wrap = ...)]`.
///
/// # Errors
/// See [`build_request_body`].
pub fn to_request_body<O>(opts: &O) -> CloudResult<Value>
where
    O: RequestOptions + ?Sized,
{
    build_request_body(opts, opts.body_wrap())
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}.{name}")
    }
}

fn build_object(fields: &[Field], parent: &str) -> CloudResult<Map<String, Value>> {
    let mut object = Map::new();
    let mut seen = HashSet::new();
    for field in fields {
        let Some(key) = field.spec.body else {
            continue;
        };
        let path = join_path(parent, field.spec.name);
        if !seen.insert(key) {
            return Err(CloudError::duplicate_body_name(path, key));
        }
        let Some(value) = effective_value(field, &path)? else {
            continue;
        };
        let json = match value {
            // Unset nested records are emitted as-is, without validating their fields
            Cow::Borrowed(v) if v.is_zero() => zero_json(v, &path)?,
            v => to_json(&v, &path)?,
        };
        object.insert(key.to_owned(), json);
    }
    Ok(object)
}

fn effective_value<'a>(field: &'a Field, path: &str) -> CloudResult<Option<Cow<'a, FieldValue>>> {
    if !field.value.is_zero() {
        return Ok(Some(Cow::Borrowed(&field.value)));
    }
    if let Some(default) = field.spec.default {
        return Ok(Some(Cow::Owned(default.to_field_value())));
    }
    if field.spec.required {
        return Err(CloudError::missing_required(path));
    }
    if field.spec.omit_zero {
        return Ok(None);
    }
    Ok(Some(Cow::Borrowed(&field.value)))
}

fn float_json(f: f64, path: &str) -> CloudResult<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| CloudError::bad_options(path, format!("{f} is not representable in JSON")))
}

fn to_json(value: &FieldValue, path: &str) -> CloudResult<Value> {
    Ok(match value {
        FieldValue::Null => Value::Null,
        FieldValue::Set(inner) => to_json(inner, path)?,
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Int(i) => Value::from(*i),
        FieldValue::UInt(u) => Value::from(*u),
        FieldValue::Float(f) => float_json(*f, path)?,
        FieldValue::Str(s) => Value::String(s.clone()),
        FieldValue::Enum(name) => Value::String((*name).to_owned()),
        FieldValue::List(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| to_json(item, &format!("{path}[{i}]")))
                .collect::<CloudResult<_>>()?,
        ),
        FieldValue::Record(fields) => Value::Object(build_object(fields, path)?),
        FieldValue::Raw(raw) => raw.clone(),
    })
}

/// Zero record emitted without flag checks; `omit_zero` members are still dropped.
fn zero_json(value: &FieldValue, path: &str) -> CloudResult<Value> {
    let FieldValue::Record(fields) = value else {
        return to_json(value, path);
    };
    let mut object = Map::new();
    for field in fields {
        let Some(key) = field.spec.body else {
            continue;
        };
        if field.spec.omit_zero {
            continue;
        }
        let path = join_path(path, field.spec.name);
        object.insert(key.to_owned(), zero_json(&field.value, &path)?);
    }
    Ok(Value::Object(object))
}
