use crate::config::{TlsRootConfig, TransportConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::DefaultHeadersLayer;
use crate::response::ResponseBody;
use crate::tls;
use crate::transport::{BufferedService, HttpTransport};
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::buffer::Buffer;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportBuilder {
    config: TransportConfig,
}

impl TransportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Builder preconfigured with [`TransportConfig::for_testing`].
    #[must_use]
    pub fn for_testing() -> Self {
        Self::with_config(TransportConfig::for_testing())
    }

    /// Deadline for one cloud API call, headers and body included.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Header added to every call that does not carry it, e.g. `x-language`.
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Accept `http://` endpoints. Debug builds or the `allow-insecure-http`
    /// feature only; meant for mock cloud APIs.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "stratus_http::security",
            "plain HTTP accepted; tokens will cross the wire unencrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Cap on in-flight calls; excess calls fail with `Overloaded`. `None` disables the cap.
    #[must_use]
    pub fn max_concurrent_requests(mut self, limit: Option<usize>) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    /// Queue depth in front of the transport worker, at least 1.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Assemble the tower stack, outermost first:
    /// `Buffer`, `LoadShed` + `ConcurrencyLimit` (when capped), `Timeout`,
    /// `DefaultHeaders`, `Decompression`, hyper.
    ///
    /// # Errors
    /// `Tls` when no trust anchors are usable, header errors for a malformed
    /// default header.
    pub fn build(self) -> Result<HttpTransport, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                target: "stratus_http::security",
                "transport built without mandatory TLS"
            );
        }

        let timeout = self.config.request_timeout;
        let https = build_https_connector(self.config.tls_roots, self.config.transport)?;

        // idle eviction needs a timer
        let mut client_builder = Client::builder(TokioExecutor::new());
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = self.config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let headers_layer =
            DefaultHeadersLayer::try_new(&self.config.user_agent, &self.config.default_headers)?;

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(headers_layer)
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        let mut boxed_service = service.boxed_clone();

        if let Some(limit) = self.config.max_concurrent_requests {
            let limited = ServiceBuilder::new()
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(limit.max(1)))
                .service(boxed_service)
                .map_err(map_load_shed_error);
            boxed_service = limited.boxed_clone();
        }

        let service: BufferedService = Buffer::new(boxed_service, self.config.buffer_capacity.max(1));

        Ok(HttpTransport {
            service,
            max_body_size: self.config.max_body_size,
            request_timeout: timeout,
            transport_security: self.config.transport,
        })
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map tower errors to `HttpError`, keeping typed errors raised below.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        HttpError::Timeout(timeout)
    } else {
        unbox_http_error(err)
    }
}

fn map_load_shed_error(err: tower::BoxError) -> HttpError {
    if err.is::<tower::load_shed::error::Overloaded>() {
        HttpError::Overloaded
    } else {
        unbox_http_error(err)
    }
}

fn unbox_http_error(err: tower::BoxError) -> HttpError {
    err.downcast::<HttpError>()
        .map_or_else(HttpError::Transport, |typed| *typed)
}

fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, body.map_err(Into::into).boxed())
}

/// HTTPS connector for the root configuration; ALPN offers h2 and http/1.1.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let allow_http = transport == TransportSecurity::AllowInsecureHttp;

    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls::os_roots_config()?)
        }
    };

    let connector = if allow_http {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;
    use crate::transport::TransportRequest;
    use httpmock::prelude::*;

    #[test]
    fn test_builder_defaults() {
        let builder = TransportBuilder::new();
        assert_eq!(builder.config.request_timeout, Duration::from_secs(60));
        assert_eq!(builder.config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(builder.config.transport, TransportSecurity::TlsOnly);
    }

    #[test]
    fn test_builder_setters() {
        let builder = TransportBuilder::new()
            .timeout(Duration::from_secs(5))
            .user_agent("provider/2.1")
            .default_header("X-Language", "en-us")
            .max_body_size(4096)
            .max_concurrent_requests(None)
            .buffer_capacity(0);
        assert_eq!(builder.config.request_timeout, Duration::from_secs(5));
        assert_eq!(builder.config.user_agent, "provider/2.1");
        assert_eq!(
            builder.config.default_headers,
            vec![("X-Language".to_owned(), "en-us".to_owned())]
        );
        assert_eq!(builder.config.max_body_size, 4096);
        assert_eq!(builder.config.max_concurrent_requests, None);
        assert_eq!(builder.config.buffer_capacity, 1, "capacity 0 is clamped");
    }

    #[test]
    fn test_allow_insecure_http() {
        let builder = TransportBuilder::new().allow_insecure_http();
        assert_eq!(
            builder.config.transport,
            TransportSecurity::AllowInsecureHttp
        );
    }

    #[tokio::test]
    async fn test_build_default() {
        let transport = TransportBuilder::new().build().unwrap();
        assert_eq!(transport.request_timeout(), Duration::from_secs(60));
        assert_eq!(transport.transport_security(), TransportSecurity::TlsOnly);
    }

    #[tokio::test]
    async fn test_build_rejects_bad_default_header() {
        let result = TransportBuilder::new()
            .default_header("bad header", "v")
            .build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderName(_))));
    }

    #[tokio::test]
    async fn test_native_roots_build_or_tls_error() {
        match TransportBuilder::new().tls_roots(TlsRootConfig::Native).build() {
            Ok(_) | Err(HttpError::Tls(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_user_agent_and_default_headers_sent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v2/flavors")
                .header("user-agent", "provider/2.1")
                .header("x-language", "en-us");
            then.status(200).body("{}");
        });

        let transport = TransportBuilder::for_testing()
            .user_agent("provider/2.1")
            .default_header("X-Language", "en-us")
            .build()
            .unwrap();
        transport
            .send(TransportRequest::get(format!("{}/v2/flavors", server.base_url())))
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_gzip_response_decompressed() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"flavors":[]}"#).unwrap();
        let compressed = encoder.finish().unwrap();

        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/v2/flavors");
            then.status(200)
                .header("content-encoding", "gzip")
                .body(compressed.clone());
        });

        let transport = TransportBuilder::for_testing().build().unwrap();
        let resp = transport
            .send(TransportRequest::get(format!("{}/v2/flavors", server.base_url())))
            .await
            .unwrap();
        assert_eq!(&resp.body[..], br#"{"flavors":[]}"#);
    }

    #[test]
    fn test_map_tower_error_keeps_inner_timeout() {
        let err: tower::BoxError = Box::new(HttpError::Timeout(Duration::from_secs(5)));
        let mapped = map_tower_error(err, Duration::from_secs(60));
        assert!(matches!(mapped, HttpError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[test]
    fn test_map_tower_error_preserves_typed_errors() {
        let err: tower::BoxError = Box::new(HttpError::Overloaded);
        assert!(matches!(
            map_tower_error(err, Duration::from_secs(1)),
            HttpError::Overloaded
        ));

        let err: tower::BoxError = Box::new(std::io::Error::other("reset"));
        assert!(matches!(
            map_tower_error(err, Duration::from_secs(1)),
            HttpError::Transport(_)
        ));
    }

    #[test]
    fn test_map_load_shed_error_passes_through() {
        let err: tower::BoxError = Box::new(HttpError::ServiceClosed);
        assert!(matches!(map_load_shed_error(err), HttpError::ServiceClosed));
    }
}
