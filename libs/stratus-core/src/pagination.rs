//! Paginated listings.
//!
//! A [`Pager`] starts at one URL and follows whatever continuation the
//! [`PageKind`] describes until a page is empty or has no successor.

use std::ops::ControlFlow;

use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::client::{RequestOpts, ServiceClient};
use crate::error::{CloudError, CloudResult};
use crate::result::ApiResponse;

/// How a listing continues past its first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    /// The whole listing arrives in one response.
    Single,
    /// `<collection>_links: [{"rel": "next", "href": ...}]` carries the next URL.
    ///
    /// With a `limit`, a page shorter than it is known to be the last.
    Linked { limit: Option<usize> },
    /// The next URL repeats the current one with `marker_param` set to the
    /// `id_field` of the last item.
    Marker {
        marker_param: String,
        id_field: String,
        limit: Option<usize>,
    },
}

impl PageKind {
    /// Marker pagination on `marker` / `id`.
    #[must_use]
    pub fn marker(limit: Option<usize>) -> Self {
        Self::Marker {
            marker_param: "marker".to_owned(),
            id_field: "id".to_owned(),
            limit,
        }
    }
}

/// One fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    kind: PageKind,
    collection: String,
    url: String,
    response: ApiResponse,
}

impl Page {
    #[must_use]
    pub fn new(
        kind: PageKind,
        collection: impl Into<String>,
        url: impl Into<String>,
        response: ApiResponse,
    ) -> Self {
        Self {
            kind,
            collection: collection.into(),
            url: url.into(),
            response,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn response(&self) -> &ApiResponse {
        &self.response
    }

    #[must_use]
    pub fn is_single_page(&self) -> bool {
        self.kind == PageKind::Single
    }

    /// Raw items under the collection key. A missing or `null` collection is empty.
    ///
    /// # Errors
    /// `Decode` if the body is not JSON or the collection is not an array.
    pub fn raw_items(&self) -> CloudResult<&[Value]> {
        match self.response.json()?.get(&self.collection) {
            None | Some(Value::Null) => Ok(&[]),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(CloudError::decode(format!(
                "'{}' in page {} is not an array",
                self.collection, self.url
            ))),
        }
    }

    /// # Errors
    /// See [`raw_items`](Self::raw_items).
    pub fn is_empty(&self) -> CloudResult<bool> {
        Ok(self.raw_items()?.is_empty())
    }

    /// Hydrate the page's collection.
    ///
    /// # Errors
    /// `Decode` if an item does not match `T`.
    pub fn items<T: DeserializeOwned>(&self) -> CloudResult<Vec<T>> {
        self.response.extract_into_slice(&self.collection)
    }

    /// URL of the following page, `None` when this page is the last.
    ///
    /// # Errors
    /// `Decode` for malformed link sections or marker ids.
    pub fn next_page_url(&self) -> CloudResult<Option<String>> {
        let items = self.raw_items()?;
        if items.is_empty() {
            return Ok(None);
        }
        match &self.kind {
            PageKind::Single => Ok(None),
            PageKind::Linked { limit } => {
                if limit.is_some_and(|limit| items.len() < limit) {
                    return Ok(None);
                }
                self.linked_next()
            }
            PageKind::Marker {
                marker_param,
                id_field,
                limit,
            } => {
                if limit.is_some_and(|limit| items.len() < limit) {
                    return Ok(None);
                }
                let Some(last) = items.last() else {
                    return Ok(None);
                };
                let marker = match last.get(id_field) {
                    Some(Value::String(id)) => id.clone(),
                    Some(Value::Number(id)) => id.to_string(),
                    _ => {
                        return Err(CloudError::decode(format!(
                            "last item in page {} has no '{id_field}' to continue from",
                            self.url
                        )));
                    }
                };
                replace_query_param(&self.url, marker_param, &marker).map(Some)
            }
        }
    }

    fn linked_next(&self) -> CloudResult<Option<String>> {
        let key = format!("{}_links", self.collection);
        let links = match self.response.json()?.get(&key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(links)) => links,
            Some(_) => {
                return Err(CloudError::decode(format!("'{key}' is not an array")));
            }
        };
        Ok(links
            .iter()
            .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))
            .and_then(|link| link.get("href"))
            .and_then(Value::as_str)
            .filter(|href| !href.is_empty())
            .map(str::to_owned))
    }
}

fn replace_query_param(url: &str, name: &str, value: &str) -> CloudResult<String> {
    let mut parsed =
        Url::parse(url).map_err(|e| CloudError::malformed(url, format!("invalid page URL: {e}")))?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(name, value);
    Ok(parsed.into())
}

type StreamState = (Pager, Option<String>);

/// Walks a paginated listing.
///
/// ```ignore
/// let pager = Pager::new(&client, url, "bandwidths", PageKind::Linked { limit: Some(100) });
/// pager
///     .each_page(|page| {
///         for bw in page.items::<Bandwidth>()? {
///             println!("{}", bw.id);
///         }
///         Ok(ControlFlow::Continue(()))
///     })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Pager {
    client: ServiceClient,
    initial_url: String,
    collection: String,
    kind: PageKind,
    opts: RequestOpts,
}

impl Pager {
    #[must_use]
    pub fn new(
        client: &ServiceClient,
        url: impl Into<String>,
        collection: impl Into<String>,
        kind: PageKind,
    ) -> Self {
        Self {
            client: client.clone(),
            initial_url: url.into(),
            collection: collection.into(),
            kind,
            opts: RequestOpts::new(),
        }
    }

    /// Options applied to every page request.
    #[must_use]
    pub fn with_request_opts(mut self, opts: RequestOpts) -> Self {
        self.opts = opts;
        self
    }

    async fn fetch(&self, url: &str) -> CloudResult<Page> {
        if self.client.cancellation().is_cancelled() {
            return Err(CloudError::Cancelled);
        }
        let response = self.client.get(url, &self.opts).await?;
        tracing::debug!(url, collection = %self.collection, "fetched page");
        Ok(Page::new(self.kind.clone(), &self.collection, url, response))
    }

    /// Call `f` for every non-empty page until the listing ends or `f` breaks.
    ///
    /// # Errors
    /// The first request, decode, or callback error.
    pub async fn each_page<F>(&self, mut f: F) -> CloudResult<()>
    where
        F: FnMut(&Page) -> CloudResult<ControlFlow<()>>,
    {
        let mut next = Some(self.initial_url.clone());
        while let Some(url) = next.take() {
            let page = self.fetch(&url).await?;
            if page.is_empty()? {
                break;
            }
            if f(&page)?.is_break() {
                break;
            }
            next = page.next_page_url()?;
            if next.as_deref() == Some(url.as_str()) {
                tracing::warn!(url, "next page URL repeats the current one; stopping");
                break;
            }
        }
        Ok(())
    }

    /// Fetch every page and merge the items into one synthetic page.
    ///
    /// # Errors
    /// See [`each_page`](Self::each_page).
    pub async fn all_pages(&self) -> CloudResult<Page> {
        let mut items = Vec::new();
        let mut pages = 0usize;
        self.each_page(|page| {
            items.extend_from_slice(page.raw_items()?);
            pages += 1;
            Ok(ControlFlow::Continue(()))
        })
        .await?;
        tracing::debug!(collection = %self.collection, pages, items = items.len(), "listing complete");

        let mut body = serde_json::Map::with_capacity(1);
        body.insert(self.collection.clone(), Value::Array(items));
        Ok(Page::new(
            PageKind::Single,
            &self.collection,
            &self.initial_url,
            ApiResponse::from_json(Value::Object(body)),
        ))
    }

    /// Pages as a stream; ends after the last non-empty page.
    pub fn into_stream(self) -> impl Stream<Item = CloudResult<Page>> + Send {
        let start = Some(self.initial_url.clone());
        futures::stream::try_unfold((self, start), |(pager, next)| pager.advance(next))
    }

    async fn advance(self, next: Option<String>) -> CloudResult<Option<(Page, StreamState)>> {
        let Some(url) = next else {
            return Ok(None);
        };
        let page = self.fetch(&url).await?;
        if page.is_empty()? {
            return Ok(None);
        }
        let following = page.next_page_url()?.filter(|following| following != &url);
        Ok(Some((page, (self, following))))
    }
}
