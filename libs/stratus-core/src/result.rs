//! Response envelope and typed extraction.
//!
//! Cloud services wrap resources in a top-level key (`{"vpc": {...}}`,
//! `{"servers": [...]}`). [`ApiResponse`] keeps the raw body and parses it
//! once, on first access; the extractors then select a key and decode.

use std::marker::PhantomData;
use std::sync::OnceLock;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use stratus_http::TransportResponse;

use crate::error::{CloudError, CloudResult};

/// A response whose status was accepted by the caller.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    json: OnceLock<Result<Value, String>>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            json: OnceLock::new(),
        }
    }

    /// A synthetic `200 OK` carrying an already built JSON document.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(value.to_string()),
            json: OnceLock::from(Ok(value)),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as text; `None` when absent or not visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parsed body. An empty body is `null`.
    ///
    /// # Errors
    /// `Decode` if the body is not JSON.
    pub fn json(&self) -> CloudResult<&Value> {
        let parsed = self.json.get_or_init(|| {
            if self.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            serde_json::from_slice(&self.body).map_err(|e| e.to_string())
        });
        parsed
            .as_ref()
            .map_err(|message| CloudError::decode(format!("response body is not JSON: {message}")))
    }

    /// Value at a dotted `path`; the empty path selects the whole body.
    ///
    /// # Errors
    /// `Decode` if the body is not JSON or the path is missing.
    pub fn select(&self, path: &str) -> CloudResult<&Value> {
        select_path(self.json()?, path)
    }

    /// Decode the object at `path` into `T`.
    ///
    /// # Errors
    /// `Decode` on a missing path or a shape mismatch.
    pub fn extract_into_struct<T: DeserializeOwned>(&self, path: &str) -> CloudResult<T> {
        let value = self.select(path)?;
        T::deserialize(value).map_err(|e| CloudError::decode_json(format!("decoding '{path}'"), e))
    }

    /// Decode the array at `path` into `Vec<T>`. A `null` array is empty.
    ///
    /// # Errors
    /// `Decode` on a missing path, a non-array value, or an element mismatch.
    pub fn extract_into_slice<T: DeserializeOwned>(&self, path: &str) -> CloudResult<Vec<T>> {
        let value = self.select(path)?;
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(_) => Vec::<T>::deserialize(value)
                .map_err(|e| CloudError::decode_json(format!("decoding '{path}'"), e)),
            other => Err(CloudError::decode(format!(
                "expected an array at '{path}', found {}",
                json_kind(other)
            ))),
        }
    }
}

impl From<TransportResponse> for ApiResponse {
    fn from(response: TransportResponse) -> Self {
        Self::new(response.status, response.headers, response.body)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn select_path<'a>(root: &'a Value, path: &str) -> CloudResult<&'a Value> {
    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current
            .get(segment)
            .ok_or_else(|| CloudError::decode(format!("missing '{segment}' in '{path}'")))?;
    }
    Ok(current)
}

/// Outcome of a call paired with the key its resource lives under.
///
/// Service packages return this from their verbs and let callers decide
/// between [`extract`](Self::extract) and [`extract_err`](Self::extract_err).
#[derive(Debug)]
pub struct Outcome<T> {
    result: CloudResult<ApiResponse>,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

pub type CreateResult<T> = Outcome<T>;
pub type GetResult<T> = Outcome<T>;
pub type UpdateResult<T> = Outcome<T>;
/// Deletes usually return no body; use [`Outcome::extract_err`].
pub type DeleteResult = Outcome<()>;

impl<T> Outcome<T> {
    #[must_use]
    pub fn new(result: CloudResult<ApiResponse>, path: impl Into<String>) -> Self {
        Self {
            result,
            path: path.into(),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn response(&self) -> Option<&ApiResponse> {
        self.result.as_ref().ok()
    }

    #[must_use]
    pub fn error(&self) -> Option<&CloudError> {
        self.result.as_ref().err()
    }

    /// # Errors
    /// The call's own error.
    pub fn extract_err(self) -> CloudResult<()> {
        self.result.map(|_| ())
    }

    /// # Errors
    /// The call's own error.
    pub fn into_response(self) -> CloudResult<ApiResponse> {
        self.result
    }
}

impl<T: DeserializeOwned> Outcome<T> {
    /// # Errors
    /// The call's own error, or `Decode` if the resource does not match `T`.
    pub fn extract(self) -> CloudResult<T> {
        self.result?.extract_into_struct(&self.path)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Vpc {
        id: String,
        name: String,
    }

    fn response(body: &'static str) -> ApiResponse {
        ApiResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::from_static(body.as_bytes()))
    }

    #[test]
    fn test_extract_struct_under_key() {
        let resp = response(r#"{"vpc":{"id":"v-1","name":"main"}}"#);
        let vpc: Vpc = resp.extract_into_struct("vpc").unwrap();
        assert_eq!(vpc, Vpc { id: "v-1".into(), name: "main".into() });
    }

    #[test]
    fn test_extract_slice() {
        let resp = response(r#"{"vpcs":[{"id":"a","name":"x"},{"id":"b","name":"y"}]}"#);
        let vpcs: Vec<Vpc> = resp.extract_into_slice("vpcs").unwrap();
        assert_eq!(vpcs.len(), 2);
        assert_eq!(vpcs[1].id, "b");

        let empty: Vec<Vpc> = response(r#"{"vpcs":null}"#).extract_into_slice("vpcs").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_missing_path_is_decode_error() {
        let resp = response(r#"{"network":{}}"#);
        let err = resp.extract_into_struct::<Vpc>("vpc").unwrap_err();
        assert!(matches!(err, CloudError::Decode { .. }));
    }

    #[test]
    fn test_dotted_path() {
        let resp = response(r#"{"job":{"entities":{"vpc_id":"v-9"}}}"#);
        let id: String = resp.extract_into_struct("job.entities.vpc_id").unwrap();
        assert_eq!(id, "v-9");
    }

    #[test]
    fn test_empty_body_is_null() {
        let resp = response("");
        assert_eq!(resp.json().unwrap(), &Value::Null);
        resp.extract_into_struct::<()>("").unwrap();
    }

    #[test]
    fn test_invalid_json_is_decode_error_every_time() {
        let resp = response("<html>");
        assert!(resp.json().is_err());
        assert!(matches!(resp.json(), Err(CloudError::Decode { .. })));
    }

    #[test]
    fn test_wrong_shape_is_decode_error() {
        let resp = response(r#"{"vpcs":{"id":"a"}}"#);
        let err = resp.extract_into_slice::<Vpc>("vpcs").unwrap_err();
        assert!(err.to_string().contains("expected an array"));
    }

    #[test]
    fn test_outcome_extract() {
        let ok: GetResult<Vpc> = Outcome::new(Ok(response(r#"{"vpc":{"id":"v","name":"n"}}"#)), "vpc");
        assert_eq!(ok.extract().unwrap().name, "n");

        let failed: DeleteResult = Outcome::new(Err(CloudError::Cancelled), "");
        assert!(failed.error().is_some());
        assert!(matches!(failed.extract_err(), Err(CloudError::Cancelled)));
    }

    #[test]
    fn test_from_json_is_preparsed() {
        let resp = ApiResponse::from_json(json!({"items": [1, 2]}));
        assert_eq!(resp.status(), StatusCode::OK);
        let items: Vec<u8> = resp.extract_into_slice("items").unwrap();
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn test_header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Request-Id", "req-1".parse().unwrap());
        let resp = ApiResponse::new(StatusCode::CREATED, headers, Bytes::new());
        assert_eq!(resp.header("x-request-id"), Some("req-1"));
        assert_eq!(resp.header("missing"), None);
    }
}
