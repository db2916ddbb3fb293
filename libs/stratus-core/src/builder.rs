use std::sync::Arc;
use std::time::Duration;

use stratus_http::{HttpTransport, TransportBuilder};
use tokio_util::sync::CancellationToken;

use crate::auth::{StaticToken, TokenCell, TokenSource};
use crate::client::ServiceClient;
use crate::config::{ClientConfig, TlsRoots};
use crate::error::CloudResult;
use crate::secret::AuthToken;

/// Programmatic counterpart of [`ClientConfig`].
#[must_use]
pub struct ServiceClientBuilder {
    config: ClientConfig,
    token: Option<Arc<TokenCell>>,
    transport: Option<HttpTransport>,
    cancel: Option<CancellationToken>,
    headers: Vec<(String, String)>,
}

impl Default for ServiceClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceClientBuilder {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            token: None,
            transport: None,
            cancel: None,
            headers: Vec::new(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.config.project_id = Some(project_id.into());
        self
    }

    pub fn project_scoped(mut self, scoped: bool) -> Self {
        self.config.project_scoped = scoped;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Default header sent by the transport unless a call sets its own.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(name.into(), value.into());
        self
    }

    /// Client-level header, see [`ServiceClient::with_header`].
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn tls_roots(mut self, roots: TlsRoots) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Accept `http://` base URLs. Mock servers only; debug builds or the
    /// `allow-insecure-http` feature.
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        self.config.allow_insecure_http = true;
        self
    }

    pub fn max_concurrent_requests(mut self, limit: Option<usize>) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token = Some(Arc::new(TokenCell::new(source)));
        self
    }

    pub fn token_cell(mut self, cell: Arc<TokenCell>) -> Self {
        self.token = Some(cell);
        self
    }

    /// Fixed token that is never refreshed.
    pub fn static_token(self, token: impl Into<AuthToken>) -> Self {
        self.token_source(Arc::new(StaticToken::new(token)))
    }

    /// Reuse an existing transport; the transport settings of the config are ignored.
    pub fn transport(mut self, transport: HttpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// # Errors
    /// `InvalidRequest` for invalid configuration or headers, `Transport` if
    /// the TLS stack cannot be initialized.
    pub fn build(self) -> CloudResult<ServiceClient> {
        self.config.validate()?;
        let endpoint = self.config.endpoint()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => TransportBuilder::with_config(self.config.transport_config()).build()?,
        };

        let mut client = ServiceClient::new(endpoint, transport);
        if let Some(cell) = self.token {
            client = client.with_token_cell(cell);
        }
        if let Some(cancel) = self.cancel {
            client = client.with_cancellation(cancel);
        }
        for (name, value) in &self.headers {
            client = client.with_header(name, value)?;
        }
        tracing::debug!(
            base_url = client.endpoint().base_url(),
            authenticated = client.token_cell().is_some(),
            "service client built"
        );
        Ok(client)
    }
}
