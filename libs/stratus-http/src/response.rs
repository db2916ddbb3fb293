use crate::error::HttpError;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use std::time::{Duration, SystemTime};

/// Type-erased response body after the decompression layer.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// A fully buffered HTTP response.
///
/// Returned for every status code; interpreting the status is up to the caller.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    /// Parsed `Retry-After` header, if present and valid.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(&self.headers)
    }
}

/// Parse a `Retry-After` header into a `Duration`.
///
/// Accepts delay-seconds (`"120"`) and HTTP-dates. Returns `None` when the
/// header is missing, malformed, negative, or a date in the past.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    let at = httpdate::parse_http_date(value).ok()?;
    at.duration_since(SystemTime::now()).ok()
}

/// Drain a response body into memory, failing once `limit` bytes are exceeded.
pub(crate) async fn read_body_limited(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<TransportResponse, HttpError> {
    let (parts, body) = response.into_parts();

    let mut collected = BytesMut::new();
    let mut body = std::pin::pin!(body);
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(HttpError::BodyTooLarge { limit, actual });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(TransportResponse {
        status: parts.status,
        headers: parts.headers,
        body: collected.freeze(),
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn headers_with_retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, value.parse().unwrap());
        headers
    }

    fn boxed(body: &'static str) -> Response<ResponseBody> {
        let body: ResponseBody = Full::new(Bytes::from_static(body.as_bytes()))
            .map_err(|never| match never {})
            .boxed();
        Response::builder().status(202).body(body).unwrap()
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let headers = headers_with_retry_after(" 30 ");
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_retry_after_negative_or_garbage() {
        assert_eq!(parse_retry_after(&headers_with_retry_after("-5")), None);
        assert_eq!(parse_retry_after(&headers_with_retry_after("soon")), None);
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let future = SystemTime::now() + Duration::from_secs(3600);
        let headers = headers_with_retry_after(&httpdate::fmt_http_date(future));
        let parsed = parse_retry_after(&headers).unwrap();
        assert!(parsed > Duration::from_secs(3500));

        let past = headers_with_retry_after("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(&past), None);
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let resp = read_body_limited(boxed("{\"job_id\":\"j1\"}"), 1024)
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::ACCEPTED);
        assert_eq!(&resp.body[..], b"{\"job_id\":\"j1\"}");
    }

    #[tokio::test]
    async fn test_read_body_over_limit() {
        let err = read_body_limited(boxed("0123456789"), 4).await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::BodyTooLarge {
                limit: 4,
                actual: 10
            }
        ));
    }
}
