//! Auth token storage shared by every clone of a client.
//!
//! The token sits behind an async `RwLock`. Readers take a snapshot that
//! records the generation it came from; after a `401` the caller hands
//! that generation back to [`TokenCell::refresh`], which fetches a new
//! token only if nobody else already did. Concurrent 401s therefore cause
//! a single fetch.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderValue;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::CloudResult;
use crate::secret::AuthToken;

/// Header carrying the token on authenticated calls.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Produces auth tokens: on first use, and again after the server rejects one.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// # Errors
    /// Whatever prevents issuing a token; the failure is returned to the caller
    /// of the request that needed it.
    async fn fetch_token(&self) -> CloudResult<AuthToken>;
}

/// A fixed token that never changes across refreshes.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: AuthToken,
}

impl StaticToken {
    #[must_use]
    pub fn new(token: impl Into<AuthToken>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn fetch_token(&self) -> CloudResult<AuthToken> {
        Ok(self.token.clone())
    }
}

struct TokenState {
    token: Option<AuthToken>,
    generation: u64,
}

/// Header value plus the generation it was read from.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub header: HeaderValue,
    pub generation: u64,
}

pub struct TokenCell {
    source: Arc<dyn TokenSource>,
    state: RwLock<TokenState>,
}

impl fmt::Debug for TokenCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCell")
            .field("source", &"<dyn TokenSource>")
            .field("state", &"<locked>")
            .finish()
    }
}

impl TokenCell {
    /// Empty cell; the first request fetches a token.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            state: RwLock::new(TokenState {
                token: None,
                generation: 0,
            }),
        }
    }

    /// Cell preloaded with a token obtained elsewhere.
    #[must_use]
    pub fn with_token(source: Arc<dyn TokenSource>, token: AuthToken) -> Self {
        Self {
            source,
            state: RwLock::new(TokenState {
                token: Some(token),
                generation: 1,
            }),
        }
    }

    /// Current token as a sensitive header value, fetching one if the cell is empty.
    ///
    /// # Errors
    /// Token source failures, or a token that is not a valid header value.
    pub async fn snapshot(&self) -> CloudResult<TokenSnapshot> {
        {
            let state = self.state.read().await;
            if let Some(token) = &state.token {
                return Ok(TokenSnapshot {
                    header: token.header_value()?,
                    generation: state.generation,
                });
            }
        }

        let mut state = self.state.write().await;
        let token = if let Some(token) = &state.token {
            token.clone()
        } else {
            let token = self.source.fetch_token().await?;
            state.generation += 1;
            state.token = Some(token.clone());
            info!(generation = state.generation, "auth token acquired");
            token
        };
        Ok(TokenSnapshot {
            header: token.header_value()?,
            generation: state.generation,
        })
    }

    /// Replace the token unless it already changed since `seen_generation`.
    ///
    /// # Errors
    /// Token source failures. The old token stays in place when fetching fails.
    pub async fn refresh(&self, seen_generation: u64) -> CloudResult<()> {
        let mut state = self.state.write().await;
        if state.generation != seen_generation {
            debug!(
                seen_generation,
                current = state.generation,
                "auth token already refreshed"
            );
            return Ok(());
        }
        let token = self.source.fetch_token().await?;
        state.generation += 1;
        state.token = Some(token);
        info!(generation = state.generation, "auth token refreshed");
        Ok(())
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }
}
