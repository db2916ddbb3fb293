//! Service endpoint and URL composition.

use crate::error::{CloudError, CloudResult};
use crate::options::QueryString;

/// Base URL of one cloud service, optionally scoped to a project.
///
/// The base always ends with exactly one `/`. When the endpoint is project
/// scoped, the project id becomes the first path segment of every resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    project_id: Option<String>,
    project_scoped: bool,
}

impl Endpoint {
    /// # Errors
    /// `InvalidRequest` if the base is empty or only slashes.
    pub fn new(base: &str) -> CloudResult<Self> {
        let trimmed = base.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(CloudError::missing_required("base_url"));
        }
        Ok(Self {
            base: format!("{trimmed}/"),
            project_id: None,
            project_scoped: false,
        })
    }

    /// Scope every resource under `project_id`.
    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self.project_scoped = true;
        self
    }

    /// Keep the project id known but stop embedding it in URLs.
    #[must_use]
    pub fn embed_project(mut self, embed: bool) -> Self {
        self.project_scoped = embed;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    #[must_use]
    pub fn is_project_scoped(&self) -> bool {
        self.project_scoped && self.project_id.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Base plus the project segment when scoped, with a trailing `/`.
    #[must_use]
    pub fn resource_base(&self) -> String {
        match self.project_id.as_deref() {
            Some(project) if self.is_project_scoped() => {
                format!("{}{}/", self.base, urlencoding::encode(project))
            }
            _ => self.base.clone(),
        }
    }

    /// Join path segments onto the resource base.
    ///
    /// Each segment is percent-encoded as given into a single path
    /// component, so a `/` inside an identifier becomes `%2F`. Empty
    /// segments are skipped.
    #[must_use]
    pub fn service_url<S: AsRef<str>>(&self, parts: &[S]) -> String {
        let mut url = self.resource_base();
        let mut first = true;
        for segment in parts.iter().map(AsRef::as_ref).filter(|s| !s.is_empty()) {
            if !first {
                url.push('/');
            }
            url.push_str(&urlencoding::encode(segment));
            first = false;
        }
        url
    }
}

/// Append an encoded query string, respecting any `?` already in `url`.
#[must_use]
pub fn append_query(url: &str, query: &QueryString) -> String {
    if query.is_empty() {
        return url.to_owned();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{}", query.encoded())
}
