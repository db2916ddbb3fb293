//! Error taxonomy shared by every operation of the client core.

use bytes::Bytes;
use http::{Method, StatusCode};
use std::fmt;
use std::time::Duration;
use stratus_http::HttpError;
use thiserror::Error;

pub type CloudResult<T> = Result<T, CloudError>;

/// Why a request was rejected before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidRequestKind {
    /// A required field holds its zero value and has no default
    MissingRequired,
    /// Two fields map to the same JSON member
    DuplicateBodyName,
    /// The field kind cannot be encoded in the requested position
    BadOptions,
    /// Malformed URL, header, or value
    Malformed,
}

impl fmt::Display for InvalidRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingRequired => "missing required field",
            Self::DuplicateBodyName => "duplicate body name",
            Self::BadOptions => "bad options",
            Self::Malformed => "malformed value",
        })
    }
}

/// Specialization of an unexpected status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemoteKind {
    NotFound,
    Unauthorized,
    Conflict,
    RateLimited,
    ServerError,
    Other,
}

/// A response whose status was not in the accepted set.
///
/// The raw body is kept verbatim: server error envelopes vary by service.
#[derive(Debug, Clone)]
pub struct RemoteError {
    pub status: StatusCode,
    pub method: Method,
    pub url: String,
    pub body: Bytes,
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    #[must_use]
    pub fn kind(&self) -> RemoteKind {
        match self.status.as_u16() {
            404 => RemoteKind::NotFound,
            401 => RemoteKind::Unauthorized,
            409 => RemoteKind::Conflict,
            429 => RemoteKind::RateLimited,
            500..=599 => RemoteKind::ServerError,
            _ => RemoteKind::Other,
        }
    }

    /// Body as text, with invalid UTF-8 replaced.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Best-effort human message from the common error envelopes.
    ///
    /// Recognizes a top-level `message`/`error_msg`/`error_description`, and
    /// the same keys one level down inside a single wrapper object such as
    /// `{"itemNotFound": {"message": ...}}` or `{"error": {...}}`.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
        let object = value.as_object()?;
        if let Some(message) = message_in(object) {
            return Some(message);
        }
        object
            .values()
            .filter_map(serde_json::Value::as_object)
            .find_map(message_in)
    }
}

fn message_in(object: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    ["message", "error_msg", "error_description", "faultstring"]
        .iter()
        .find_map(|key| object.get(*key)?.as_str().map(str::to_owned))
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: unexpected status {}",
            self.method, self.url, self.status
        )?;
        match self.message() {
            Some(message) => write!(f, ": {message}"),
            None if self.body.is_empty() => Ok(()),
            None => write!(f, ": {}", self.body_text()),
        }
    }
}

/// Every failure the client core reports.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CloudError {
    /// Rejected before any I/O
    #[error("invalid request ({kind}) at '{field}': {detail}")]
    InvalidRequest {
        field: String,
        kind: InvalidRequestKind,
        detail: String,
    },

    /// DNS, connect, TLS, or read failure
    #[error("transport error: {0}")]
    Transport(#[source] HttpError),

    /// Per-call deadline or waiter timeout exceeded
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// External cancellation observed
    #[error("operation cancelled")]
    Cancelled,

    /// Status code not in the accepted set
    #[error("{0}")]
    Remote(Box<RemoteError>),

    /// Malformed JSON, missing unwrap path, or type mismatch
    #[error("decode error: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Waiter observed a state outside pending and target
    #[error("unexpected state '{state}', wanted {target:?} (pending {pending:?})")]
    UnexpectedState {
        state: String,
        pending: Vec<String>,
        target: Vec<String>,
    },
}

impl CloudError {
    #[must_use]
    pub fn missing_required(field: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            kind: InvalidRequestKind::MissingRequired,
            detail: "required field is unset".to_owned(),
        }
    }

    #[must_use]
    pub fn duplicate_body_name(field: impl Into<String>, name: &str) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            kind: InvalidRequestKind::DuplicateBodyName,
            detail: format!("body name '{name}' is used by more than one field"),
        }
    }

    #[must_use]
    pub fn bad_options(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            kind: InvalidRequestKind::BadOptions,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn malformed(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            kind: InvalidRequestKind::Malformed,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn decode_json(context: impl fmt::Display, source: serde_json::Error) -> Self {
        Self::Decode {
            message: format!("{context}: {source}"),
            source: Some(source),
        }
    }

    #[must_use]
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    #[must_use]
    pub fn remote_kind(&self) -> Option<RemoteKind> {
        self.remote().map(RemoteError::kind)
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.remote().map(|r| r.status.as_u16())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.remote_kind() == Some(RemoteKind::NotFound)
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.remote_kind() == Some(RemoteKind::Unauthorized)
    }

    /// Whether repeating the same call later may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Remote(remote) => matches!(
                remote.kind(),
                RemoteKind::RateLimited | RemoteKind::ServerError
            ),
            _ => false,
        }
    }
}

impl From<HttpError> for CloudError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(after) => Self::Timeout(after),
            HttpError::InvalidUri { ref url, .. } => Self::malformed(url.clone(), err.to_string()),
            err if err.is_request_error() => Self::malformed("request", err.to_string()),
            err => Self::Transport(err),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn remote(status: u16, body: &'static str) -> RemoteError {
        RemoteError {
            status: StatusCode::from_u16(status).unwrap(),
            method: Method::GET,
            url: "https://vpc.example.com/v1/p/vpcs/v-1".to_owned(),
            body: Bytes::from_static(body.as_bytes()),
            retry_after: None,
        }
    }

    #[test]
    fn test_remote_kind_classification() {
        assert_eq!(remote(404, "").kind(), RemoteKind::NotFound);
        assert_eq!(remote(401, "").kind(), RemoteKind::Unauthorized);
        assert_eq!(remote(409, "").kind(), RemoteKind::Conflict);
        assert_eq!(remote(429, "").kind(), RemoteKind::RateLimited);
        assert_eq!(remote(503, "").kind(), RemoteKind::ServerError);
        assert_eq!(remote(400, "").kind(), RemoteKind::Other);
        assert_eq!(remote(202, "").kind(), RemoteKind::Other);
    }

    #[test]
    fn test_remote_message_envelopes() {
        assert_eq!(
            remote(400, r#"{"message":"bad cidr"}"#).message().as_deref(),
            Some("bad cidr")
        );
        assert_eq!(
            remote(400, r#"{"error_code":"VPC.0001","error_msg":"quota"}"#)
                .message()
                .as_deref(),
            Some("quota")
        );
        assert_eq!(
            remote(404, r#"{"itemNotFound":{"code":404,"message":"no server"}}"#)
                .message()
                .as_deref(),
            Some("no server")
        );
        assert_eq!(remote(500, "<html>oops</html>").message(), None);
    }

    #[test]
    fn test_remote_display() {
        let err = CloudError::Remote(Box::new(remote(404, r#"{"message":"gone"}"#)));
        assert_eq!(
            err.to_string(),
            "GET https://vpc.example.com/v1/p/vpcs/v-1: unexpected status 404 Not Found: gone"
        );
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), Some(404));
    }

    #[test]
    fn test_retriable() {
        assert!(CloudError::Timeout(Duration::from_secs(60)).is_retriable());
        assert!(CloudError::Remote(Box::new(remote(429, ""))).is_retriable());
        assert!(CloudError::Remote(Box::new(remote(502, ""))).is_retriable());
        assert!(!CloudError::Remote(Box::new(remote(409, ""))).is_retriable());
        assert!(!CloudError::Cancelled.is_retriable());
        assert!(!CloudError::missing_required("name").is_retriable());
    }

    #[test]
    fn test_from_http_error() {
        let err: CloudError = HttpError::Timeout(Duration::from_secs(60)).into();
        assert!(matches!(err, CloudError::Timeout(d) if d == Duration::from_secs(60)));

        let err: CloudError = HttpError::InvalidScheme {
            scheme: "ftp".to_owned(),
            reason: "nope".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            CloudError::InvalidRequest {
                kind: InvalidRequestKind::Malformed,
                ..
            }
        ));

        let err: CloudError = HttpError::Overloaded.into();
        assert!(matches!(err, CloudError::Transport(HttpError::Overloaded)));
    }

    #[test]
    fn test_invalid_request_display_names_field() {
        let err = CloudError::missing_required("subnet.cidr");
        assert_eq!(
            err.to_string(),
            "invalid request (missing required field) at 'subnet.cidr': required field is unset"
        );
    }
}
