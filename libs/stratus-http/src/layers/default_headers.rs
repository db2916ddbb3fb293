use crate::error::HttpError;
use http::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use http::{Request, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that fills in default headers (User-Agent included).
///
/// A default is only inserted when the request does not already carry a
/// header with the same name, so client-level and per-call headers win.
#[derive(Clone, Debug)]
pub struct DefaultHeadersLayer {
    headers: HeaderMap,
}

impl DefaultHeadersLayer {
    /// Create the layer from a user agent and extra `(name, value)` pairs.
    ///
    /// Later pairs with a repeated name replace earlier ones.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName`/`InvalidHeaderValue` for
    /// malformed input.
    pub fn try_new(user_agent: &str, extra: &[(String, String)]) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::with_capacity(extra.len() + 1);
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        for (name, value) in extra {
            headers.insert(
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            );
        }
        Ok(Self { headers })
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Service produced by [`DefaultHeadersLayer`]
#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: HeaderMap,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let target = req.headers_mut();
        for (name, value) in &self.headers {
            if !target.contains_key(name) {
                target.insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}
