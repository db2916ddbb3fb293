//! Service client: one authenticated JSON call per verb.
//!
//! Every verb funnels into [`ServiceClient::request`], which assembles the
//! headers, attaches the auth token, races the transport against the
//! client's cancellation token, and checks the status against the accepted
//! set. A single `401` triggers one token refresh and one retry.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::Serialize;
use stratus_http::{HttpTransport, TransportRequest};
use tokio_util::sync::CancellationToken;

use crate::auth::{AUTH_TOKEN_HEADER, TokenCell, TokenSource};
use crate::endpoint::Endpoint;
use crate::error::{CloudError, CloudResult, RemoteError};
use crate::result::ApiResponse;

pub const GET_CODES: &[u16] = &[200];
pub const POST_CODES: &[u16] = &[200, 201, 202];
pub const PUT_CODES: &[u16] = &[200, 201, 202];
pub const PATCH_CODES: &[u16] = &[200];
pub const DELETE_CODES: &[u16] = &[202, 204];
pub const DELETE_WITH_BODY_CODES: &[u16] = &[200, 202, 204];

/// Header several services read to localize error messages.
pub const LANGUAGE_HEADER: &str = "x-language";

const APPLICATION_JSON: &str = "application/json";

/// Per-call knobs.
///
/// ```ignore
/// let opts = RequestOpts::new()
///     .ok_codes([201])
///     .with_language("en-us")
///     .header("x-client-token", idempotency_key);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOpts {
    ok_codes: Option<Vec<u16>>,
    more_headers: Vec<(String, String)>,
    omit_body: bool,
    skip_auth: bool,
}

impl RequestOpts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the verb's default accepted status codes.
    #[must_use]
    pub fn ok_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.ok_codes = Some(codes.into_iter().collect());
        self
    }

    /// Extra header, applied after every other header source.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.more_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_language(self, language: impl Into<String>) -> Self {
        self.header(LANGUAGE_HEADER, language)
    }

    /// Send the verb without its JSON body.
    #[must_use]
    pub fn without_body(mut self) -> Self {
        self.omit_body = true;
        self
    }

    /// Do not attach the auth token (anonymous endpoints such as version discovery).
    #[must_use]
    pub fn without_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    #[must_use]
    pub fn accepted_codes<'a>(&'a self, defaults: &'a [u16]) -> &'a [u16] {
        self.ok_codes.as_deref().unwrap_or(defaults)
    }
}

/// JSON client bound to one service endpoint.
///
/// Cheap to clone; clones share the transport, the token cell, and the
/// cancellation token.
///
/// ```ignore
/// let client = ServiceClient::builder()
///     .base_url("https://vpc.example.com/v1")
///     .project_id("0b1c...")
///     .token_source(Arc::new(StaticToken::new(token)))
///     .build()?;
///
/// let url = client.service_url(&["vpcs", &vpc_id]);
/// let vpc: Vpc = client.get(&url, &RequestOpts::new()).await?.extract_into_struct("vpc")?;
/// ```
#[derive(Clone)]
pub struct ServiceClient {
    endpoint: Endpoint,
    transport: HttpTransport,
    token: Option<Arc<TokenCell>>,
    headers: Arc<HeaderMap>,
    cancel: CancellationToken,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("endpoint", &self.endpoint)
            .field("transport", &self.transport)
            .field("authenticated", &self.token.is_some())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ServiceClient {
    /// Anonymous client; attach credentials with [`with_token_source`](Self::with_token_source).
    #[must_use]
    pub fn new(endpoint: Endpoint, transport: HttpTransport) -> Self {
        Self {
            endpoint,
            transport,
            token: None,
            headers: Arc::new(HeaderMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn builder() -> crate::builder::ServiceClientBuilder {
        crate::builder::ServiceClientBuilder::new()
    }

    #[must_use]
    pub fn with_token_source(self, source: Arc<dyn TokenSource>) -> Self {
        self.with_token_cell(Arc::new(TokenCell::new(source)))
    }

    /// Share an existing token cell, e.g. across several service clients.
    #[must_use]
    pub fn with_token_cell(mut self, cell: Arc<TokenCell>) -> Self {
        self.token = Some(cell);
        self
    }

    /// Client-level header; overrides transport defaults, overridden per call.
    ///
    /// # Errors
    /// `InvalidRequest` if the name or value is not a valid header.
    pub fn with_header(mut self, name: &str, value: &str) -> CloudResult<Self> {
        let (name, value) = parse_header(name, value)?;
        Arc::make_mut(&mut self.headers).insert(name, value);
        Ok(self)
    }

    /// Cancel every call made through this client (and its clones) once `token` fires.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Client for another service endpoint sharing transport, credentials,
    /// headers, and cancellation.
    #[must_use]
    pub fn for_service(&self, endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    #[must_use]
    pub fn token_cell(&self) -> Option<&Arc<TokenCell>> {
        self.token.as_ref()
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// See [`Endpoint::service_url`].
    #[must_use]
    pub fn service_url<S: AsRef<str>>(&self, parts: &[S]) -> String {
        self.endpoint.service_url(parts)
    }

    /// # Errors
    /// See [`request`](Self::request).
    pub async fn get(&self, url: &str, opts: &RequestOpts) -> CloudResult<ApiResponse> {
        self.request(Method::GET, url, None, opts, GET_CODES).await
    }

    /// # Errors
    /// `InvalidRequest` if the body does not serialize, otherwise see [`request`](Self::request).
    pub async fn post<B>(&self, url: &str, body: &B, opts: &RequestOpts) -> CloudResult<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = encode_body(body, opts)?;
        self.request(Method::POST, url, body, opts, POST_CODES).await
    }

    /// # Errors
    /// `InvalidRequest` if the body does not serialize, otherwise see [`request`](Self::request).
    pub async fn put<B>(&self, url: &str, body: &B, opts: &RequestOpts) -> CloudResult<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = encode_body(body, opts)?;
        self.request(Method::PUT, url, body, opts, PUT_CODES).await
    }

    /// # Errors
    /// `InvalidRequest` if the body does not serialize, otherwise see [`request`](Self::request).
    pub async fn patch<B>(&self, url: &str, body: &B, opts: &RequestOpts) -> CloudResult<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = encode_body(body, opts)?;
        self.request(Method::PATCH, url, body, opts, PATCH_CODES).await
    }

    /// # Errors
    /// See [`request`](Self::request).
    pub async fn delete(&self, url: &str, opts: &RequestOpts) -> CloudResult<ApiResponse> {
        self.request(Method::DELETE, url, None, opts, DELETE_CODES)
            .await
    }

    /// `DELETE` carrying a JSON body, used by batch-delete style APIs.
    ///
    /// # Errors
    /// `InvalidRequest` if the body does not serialize, otherwise see [`request`](Self::request).
    pub async fn delete_with_body<B>(
        &self,
        url: &str,
        body: &B,
        opts: &RequestOpts,
    ) -> CloudResult<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let body = encode_body(body, opts)?;
        self.request(Method::DELETE, url, body, opts, DELETE_WITH_BODY_CODES)
            .await
    }

    /// Send one call and check its status.
    ///
    /// `default_codes` applies unless `opts` overrides the accepted set.
    ///
    /// # Errors
    /// - `Cancelled` if the client's token fires before or during the call
    /// - `InvalidRequest` for malformed URLs or headers
    /// - `Transport` / `Timeout` from the transport
    /// - `Remote` when the final status is not accepted
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
        opts: &RequestOpts,
        default_codes: &[u16],
    ) -> CloudResult<ApiResponse> {
        if self.cancel.is_cancelled() {
            return Err(CloudError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::debug!(%method, url, "call cancelled");
                Err(CloudError::Cancelled)
            }
            result = self.execute(&method, url, body, opts, default_codes) => result,
        }
    }

    async fn execute(
        &self,
        method: &Method,
        url: &str,
        body: Option<Bytes>,
        opts: &RequestOpts,
        default_codes: &[u16],
    ) -> CloudResult<ApiResponse> {
        let accepted = opts.accepted_codes(default_codes);
        let token = if opts.skip_auth { None } else { self.token.as_ref() };
        let mut attempt = 1u32;

        loop {
            let mut headers = HeaderMap::new();
            if body.is_some() {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
            }
            let generation = match token {
                Some(cell) => {
                    let snapshot = cell.snapshot().await?;
                    headers.insert(HeaderName::from_static(AUTH_TOKEN_HEADER), snapshot.header);
                    Some(snapshot.generation)
                }
                None => None,
            };
            for (name, value) in &*self.headers {
                headers.insert(name.clone(), value.clone());
            }
            for (name, value) in &opts.more_headers {
                let (name, value) = parse_header(name, value)?;
                headers.insert(name, value);
            }

            let request = TransportRequest {
                method: method.clone(),
                url: url.to_owned(),
                headers,
                body: body.clone(),
            };
            let started = Instant::now();
            let response = self.transport.send(request).await?;
            let status = response.status;
            tracing::debug!(%method, url, status = status.as_u16(), attempt, "cloud API call");
            tracing::trace!(%method, url, elapsed_ms = started.elapsed().as_millis(), "cloud API call finished");

            if accepted.contains(&status.as_u16()) {
                return Ok(ApiResponse::from(response));
            }

            if status == StatusCode::UNAUTHORIZED
                && attempt == 1
                && let (Some(cell), Some(seen)) = (token, generation)
            {
                tracing::warn!(%method, url, "token rejected; refreshing and retrying once");
                cell.refresh(seen).await?;
                attempt += 1;
                continue;
            }

            let retry_after = response.retry_after();
            return Err(CloudError::Remote(Box::new(RemoteError {
                status,
                method: method.clone(),
                url: url.to_owned(),
                body: response.body,
                retry_after,
            })));
        }
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B, opts: &RequestOpts) -> CloudResult<Option<Bytes>> {
    if opts.omit_body {
        return Ok(None);
    }
    serde_json::to_vec(body)
        .map(|bytes| Some(Bytes::from(bytes)))
        .map_err(|e| CloudError::bad_options("body", e.to_string()))
}

fn parse_header(name: &str, value: &str) -> CloudResult<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::try_from(name)
        .map_err(|e| CloudError::malformed(name, format!("invalid header name: {e}")))?;
    let header_value = HeaderValue::try_from(value)
        .map_err(|e| CloudError::malformed(name, format!("invalid header value: {e}")))?;
    Ok((header_name, header_value))
}
