//! Authenticated endpoint identity.
//!
//! An [`Endpoint`] is the URL/credential pair one logical session talks
//! to. It is treated as opaque: the crate never inspects or refreshes the
//! credential. Rotation means handing a new `Endpoint` to the facade.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Query parameter the server's JWT middleware reads the token from.
const TOKEN_QUERY_PARAM: &str = "token";

// ============================================================================
// Endpoint
// ============================================================================

/// WebSocket URL plus authentication token.
///
/// `Debug` and `Display` never print the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Server URL (`ws://` or `wss://`).
    url: Url,
    /// Access token, if the server needs one.
    token: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint with an access token.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `url` does not parse
    /// - [`Error::InvalidEndpoint`] if the scheme is not `ws`/`wss` or the
    ///   token is empty
    pub fn new(url: &str, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::invalid_endpoint("token must not be empty"));
        }

        Ok(Self {
            url: Self::parse_url(url)?,
            token: Some(token),
        })
    }

    /// Creates an endpoint without credentials.
    ///
    /// # Errors
    ///
    /// Same URL checks as [`Endpoint::new`].
    pub fn anonymous(url: &str) -> Result<Self> {
        Ok(Self {
            url: Self::parse_url(url)?,
            token: None,
        })
    }

    fn parse_url(url: &str) -> Result<Url> {
        let url = Url::parse(url)?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::invalid_endpoint(format!(
                "unsupported scheme '{other}', expected ws or wss"
            ))),
        }
    }

    /// Returns the server URL without credentials.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns `true` if a token is attached.
    #[inline]
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Returns the URL to open, with the token appended as a query
    /// parameter.
    #[must_use]
    pub fn connect_url(&self) -> Url {
        let mut url = self.url.clone();

        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        }

        url
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
