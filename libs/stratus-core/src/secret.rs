use std::fmt;

use http::HeaderValue;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CloudError, CloudResult};

/// Opaque auth token.
///
/// Formatting prints `[REDACTED]` and the buffer is zeroed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AuthToken(String);

impl AuthToken {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read-only access for building the auth header. Never log the result.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Header value flagged sensitive so it is skipped by HPACK and `Debug`.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if the token contains bytes not allowed in a header.
    pub fn header_value(&self) -> CloudResult<HeaderValue> {
        let mut value = HeaderValue::from_str(&self.0).map_err(|_| {
            CloudError::malformed("auth token", "token contains invalid header characters")
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl Clone for AuthToken {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl From<String> for AuthToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AuthToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
