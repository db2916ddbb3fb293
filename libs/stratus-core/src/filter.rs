//! Client-side filtering of listings the API cannot filter itself.

use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::{CloudError, CloudResult};

/// A single "field at `path` equals `expected`" condition.
///
/// A null or empty-string `expected` matches every item, so optional user
/// filters can be passed through unconditionally.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConstraint {
    pub path: Vec<String>,
    pub expected: Value,
}

impl FilterConstraint {
    /// Constraint on a top-level field.
    #[must_use]
    pub fn new(field: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self {
            path: vec![field.into()],
            expected: expected.into(),
        }
    }

    /// Constraint on a nested field. Numeric segments index arrays.
    #[must_use]
    pub fn nested<I, S>(path: I, expected: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            expected: expected.into(),
        }
    }

    fn is_wildcard(&self) -> bool {
        match &self.expected {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    fn matches(&self, item: &Value) -> bool {
        if self.is_wildcard() {
            return true;
        }
        let mut current = item;
        for segment in &self.path {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return false,
            }
        }
        match current {
            Value::Array(items) => items.iter().any(|v| values_equal(v, &self.expected)),
            other => values_equal(other, &self.expected),
        }
    }
}

/// Keep the items satisfying every constraint, in their original order.
///
/// ```ignore
/// let active = filter_list(
///     &servers,
///     &[
///         FilterConstraint::new("status", "ACTIVE"),
///         FilterConstraint::nested(["flavor", "id"], opts.flavor_id.clone()),
///     ],
/// )?;
/// ```
///
/// # Errors
/// `Decode` if an item cannot be represented as JSON.
pub fn filter_list<T>(items: &[T], constraints: &[FilterConstraint]) -> CloudResult<Vec<T>>
where
    T: Serialize + Clone,
{
    let active: Vec<&FilterConstraint> = constraints.iter().filter(|c| !c.is_wildcard()).collect();
    if active.is_empty() {
        return Ok(items.to_vec());
    }

    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let value = serde_json::to_value(item)
            .map_err(|e| CloudError::decode_json("filter item", e))?;
        if active.iter().all(|c| c.matches(&value)) {
            kept.push(item.clone());
        }
    }
    tracing::trace!(
        total = items.len(),
        kept = kept.len(),
        constraints = active.len(),
        "filtered listing"
    );
    Ok(kept)
}

/// Equality tolerant of numbers the API sends as strings and vice versa.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim()
                .parse::<Number>()
                .is_ok_and(|parsed| numbers_equal(&parsed, n))
        }
        (Value::String(s), Value::Bool(b)) | (Value::Bool(b), Value::String(s)) => {
            s.eq_ignore_ascii_case(if *b { "true" } else { "false" })
        }
        _ => false,
    }
}

/// Integers compare exactly; `f64` only when either side has a fraction.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }
    if (a.is_f64() || b.is_f64())
        && let (Some(a), Some(b)) = (a.as_f64(), b.as_f64())
    {
        return (a - b).abs() < f64::EPSILON;
    }
    false
}
