//! Callback-leg parsing for the login redirect round trip.
//!
//! The portal returns control at `{origin}{callback_path}` and carries its
//! results in the URL fragment, never the query string, so the token cannot
//! end up in server access logs along the way.

use thiserror::Error;

/// Parameters the portal passes back in the callback fragment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub access_token: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// Extract callback parameters from a full URL's fragment. A URL without
    /// a fragment yields all-None.
    pub fn from_url(url: &str) -> Self {
        match url.split_once('#') {
            Some((_, fragment)) => Self::from_fragment(fragment),
            None => Self::default(),
        }
    }

    /// Parse a raw fragment of `key=value` pairs joined by `&`.
    pub fn from_fragment(fragment: &str) -> Self {
        let mut params = Self::default();
        for pair in fragment.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, value),
                None => (pair, ""),
            };
            let value = urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string());
            match key {
                "access_token" => params.access_token = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                _ => {}
            }
        }
        params
    }
}

/// Why a callback attempt failed. Messages are written for direct display in
/// the embedder's error surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The portal itself reported a failure code (e.g. `access_denied`).
    #[error("{0}")]
    Portal(String),
    #[error("no access token received")]
    MissingToken,
    #[error("invalid state parameter - possible CSRF attack")]
    StateMismatch,
    #[error("invalid token format")]
    MalformedToken,
    #[error("token has expired")]
    TokenExpired,
    #[error("token was not issued by the expected portal")]
    UntrustedIssuer,
    #[error("failed to persist the session")]
    Storage,
}
