use std::time::Duration;

/// Default User-Agent string for cloud API requests
pub const DEFAULT_USER_AGENT: &str = concat!("stratus-http/", env!("CARGO_PKG_VERSION"));

/// Default per-call timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum buffered response body (32 MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the transport enforces TLS or also accepts `http://` URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP connections
    ///
    /// **WARNING**: meant for mock servers and private test endpoints only.
    AllowInsecureHttp,
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-call timeout covering connect, response headers and body read
    /// (default: 60 seconds)
    pub request_timeout: Duration,

    /// Maximum response body size in bytes (default: 32 MB)
    pub max_body_size: usize,

    /// User-Agent header value
    pub user_agent: String,

    /// Headers added to every request unless the request already carries them
    pub default_headers: Vec<(String, String)>,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Maximum number of in-flight requests; `None` disables the limit.
    ///
    /// When the limit is reached new calls fail immediately with
    /// `HttpError::Overloaded` instead of queueing.
    pub max_concurrent_requests: Option<usize>,

    /// Capacity of the internal request buffer (default: 1024, minimum 1)
    pub buffer_capacity: usize,

    /// Idle timeout for pooled connections (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: Vec::new(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            max_concurrent_requests: Some(256),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl TransportConfig {
    /// Configuration for tests against local mock servers.
    ///
    /// Allows plain HTTP, shortens the timeout and disables the concurrency
    /// limit so parallel tests never see `Overloaded`.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            transport: TransportSecurity::AllowInsecureHttp,
            max_concurrent_requests: None,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_body_size, 32 * 1024 * 1024);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.tls_roots, TlsRootConfig::WebPki);
        assert_eq!(config.max_concurrent_requests, Some(256));
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn test_testing_config_allows_http() {
        let config = TransportConfig::for_testing();
        assert_eq!(config.transport, TransportSecurity::AllowInsecureHttp);
        assert_eq!(config.max_concurrent_requests, None);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_user_agent_carries_crate_version() {
        assert!(DEFAULT_USER_AGENT.starts_with("stratus-http/"));
        assert!(DEFAULT_USER_AGENT.len() > "stratus-http/".len());
    }
}
