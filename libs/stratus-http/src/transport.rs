use crate::builder::TransportBuilder;
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::{ResponseBody, TransportResponse, read_body_limited};
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tower::Service;
use tower::buffer::Buffer;

pub(crate) type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

pub(crate) type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// One outbound call, fully described.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl TransportRequest {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Shared HTTP transport.
///
/// `Clone + Send + Sync`; clones share the connection pool and the
/// middleware stack (a `tower::buffer::Buffer` worker), so a single instance
/// can serve every service client of a provider.
#[derive(Clone)]
pub struct HttpTransport {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) request_timeout: Duration,
    pub(crate) transport_security: TransportSecurity,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("max_body_size", &self.max_body_size)
            .field("request_timeout", &self.request_timeout)
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Transport with default configuration (TLS only, 60 s timeout).
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        TransportBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn transport_security(&self) -> TransportSecurity {
        self.transport_security
    }

    /// Perform one HTTP exchange and buffer the whole response.
    ///
    /// Any status code is returned as `Ok`. The per-call timeout spans
    /// connecting, waiting for headers and reading the body.
    ///
    /// # Errors
    ///
    /// - `InvalidUri`/`InvalidScheme` for a URL the transport refuses
    /// - `Timeout` when the deadline passes
    /// - `Overloaded` when the concurrency limit or buffer is saturated
    /// - `Transport`/`BodyTooLarge` for network and read failures
    pub async fn send(&self, request: TransportRequest) -> Result<TransportResponse, HttpError> {
        let uri = validate_url(&request.url, self.transport_security)?;
        let deadline = tokio::time::Instant::now() + self.request_timeout;

        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let http_request = builder.body(Full::new(request.body.unwrap_or_default()))?;

        let mut service = self.service.clone();
        try_acquire_buffer_slot(&mut service).await?;

        let exchange = async {
            let response = service.call(http_request).await.map_err(map_buffer_error)?;
            read_body_limited(response, self.max_body_size).await
        };

        tokio::time::timeout_at(deadline, exchange)
            .await
            .map_err(|_| HttpError::Timeout(self.request_timeout))?
    }
}

/// Validate the URL against the transport security mode.
fn validate_url(url: &str, security: TransportSecurity) -> Result<http::Uri, HttpError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    match uri.scheme_str() {
        Some("https") => Ok(uri),
        Some("http") => match security {
            TransportSecurity::AllowInsecureHttp => Ok(uri),
            TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
        },
        Some(scheme) => Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "only http:// and https:// schemes are supported".to_owned(),
        }),
        None => Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        }),
    }
}

/// Map buffer errors to `HttpError`.
///
/// The buffer wraps inner-service errors; anything that is not an
/// `HttpError` means the worker is gone.
pub(crate) fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(error = %err, "transport buffer worker closed unexpectedly");
            HttpError::ServiceClosed
        }
    }
}

/// Reserve a buffer slot without waiting; a full buffer is `Overloaded`.
pub(crate) async fn try_acquire_buffer_slot(
    service: &mut BufferedService,
) -> Result<(), HttpError> {
    use std::task::Poll;

    let polled = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match polled {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(HttpError::Overloaded),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_transport() -> HttpTransport {
        TransportBuilder::for_testing().build().unwrap()
    }

    #[test]
    fn test_validate_url_schemes() {
        assert!(validate_url("https://iam.example.com/v3", TransportSecurity::TlsOnly).is_ok());
        assert!(matches!(
            validate_url("http://iam.example.com/v3", TransportSecurity::TlsOnly),
            Err(HttpError::InvalidScheme { .. })
        ));
        assert!(
            validate_url(
                "http://127.0.0.1:8080/v3",
                TransportSecurity::AllowInsecureHttp
            )
            .is_ok()
        );
        assert!(matches!(
            validate_url("ftp://iam.example.com", TransportSecurity::AllowInsecureHttp),
            Err(HttpError::InvalidScheme { .. })
        ));
    }

    #[test]
    fn test_validate_url_structure() {
        assert!(matches!(
            validate_url("/v1/servers", TransportSecurity::TlsOnly),
            Err(HttpError::InvalidUri {
                kind: InvalidUriKind::MissingAuthority,
                ..
            })
        ));
        assert!(matches!(
            validate_url("https://bad host/", TransportSecurity::TlsOnly),
            Err(HttpError::InvalidUri {
                kind: InvalidUriKind::ParseError,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_send_returns_error_statuses_as_responses() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/v1/servers/missing");
            then.status(404)
                .json_body(serde_json::json!({"itemNotFound": {"message": "gone"}}));
        });

        let resp = test_transport()
            .send(TransportRequest::get(format!(
                "{}/v1/servers/missing",
                server.base_url()
            )))
            .await
            .unwrap();
        assert_eq!(resp.status, http::StatusCode::NOT_FOUND);
        assert!(!resp.body.is_empty());
    }

    #[tokio::test]
    async fn test_send_posts_body_and_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/vpcs")
                .header("content-type", "application/json")
                .header("x-auth-token", "tok")
                .body(r#"{"vpc":{"name":"v1"}}"#);
            then.status(200).body("{}");
        });

        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-auth-token", "tok".parse().unwrap());
        let request = TransportRequest::new(
            http::Method::POST,
            format!("{}/v1/vpcs", server.base_url()),
        )
            .with_headers(headers)
            .with_body(r#"{"vpc":{"name":"v1"}}"#);

        let resp = test_transport().send(request).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::OK);
        mock.assert();
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let transport = TransportBuilder::for_testing()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let err = transport
            .send(TransportRequest::get(format!("{}/slow", server.base_url())))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_send_enforces_body_limit() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/big");
            then.status(200).body("x".repeat(2048));
        });

        let transport = TransportBuilder::for_testing()
            .max_body_size(1024)
            .build()
            .unwrap();
        let err = transport
            .send(TransportRequest::get(format!("{}/big", server.base_url())))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_tls_only_rejects_http_before_io() {
        let transport = TransportBuilder::new().build().unwrap();
        let err = transport
            .send(TransportRequest::get("http://127.0.0.1:9/never"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { .. }));
    }

    #[test]
    fn test_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<HttpTransport>();
    }
}
