use std::time::Duration;
use thiserror::Error;

/// Why a cloud API URL was rejected before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    ParseError,
    /// No host, e.g. a resource path passed without the service endpoint
    MissingAuthority,
    MissingScheme,
}

/// Failure to exchange bytes with a cloud endpoint.
///
/// A response with any status code, including 4xx and 5xx, is a successful
/// exchange here; status policy belongs to the service client.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("cannot assemble request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("bad header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("bad header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Headers and body not received within the per-call deadline
    #[error("no complete response within {0:?}")]
    Timeout(Duration),

    /// DNS, connect, reset or read failure
    #[error("connection failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("TLS setup failed: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("response body of {actual} bytes exceeds the {limit} byte cap")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Every concurrency slot is taken; the call was shed, not queued
    #[error("too many concurrent cloud API calls")]
    Overloaded,

    /// The buffer worker is gone
    #[error("transport worker stopped")]
    ServiceClosed,

    /// Match on `kind`; `reason` is for logs.
    #[error("bad endpoint URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// Scheme refused by the transport security mode
    #[error("scheme '{scheme}' refused: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl HttpError {
    /// Nothing reached the network: the URL or headers were unusable.
    #[must_use]
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::RequestBuild(_)
                | Self::InvalidHeaderName(_)
                | Self::InvalidHeaderValue(_)
                | Self::InvalidUri { .. }
                | Self::InvalidScheme { .. }
        )
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        Self::Transport(err.into())
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::Transport(err.into())
    }
}
