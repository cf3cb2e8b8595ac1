//! Server-side session reconciliation.
//!
//! The stored token is authoritative only as long as the portal says so:
//! users get deleted, access gets revoked, administrators force logouts.
//! [`SessionValidator::validate`] reports what the local state machine
//! should do about it, and fails OPEN on connectivity loss - a user is
//! never logged out because their network blipped.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{ApiError, TokenExchanger};
use crate::config::AuthConfig;
use crate::token::BoundTokenStore;

/// Server error code signalling an administrator-triggered invalidation.
const FORCE_LOGOUT_CODE: &str = "force_logout";

/// Reason code for an exchange that succeeded without returning a token.
const NO_TOKEN_RETURNED_CODE: &str = "no_token_returned";

/// Why the server rejected an otherwise locally-valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Administrator-triggered invalidation of an unexpired token.
    ForceLogout,
    /// The exchange succeeded but carried no token.
    NoTokenReturned,
    /// Any other server-reported code; `"unknown"` when unparseable.
    Other(String),
}

impl RejectReason {
    pub fn as_str(&self) -> &str {
        match self {
            RejectReason::ForceLogout => FORCE_LOGOUT_CODE,
            RejectReason::NoTokenReturned => NO_TOKEN_RETURNED_CODE,
            RejectReason::Other(code) => code,
        }
    }

    fn from_code(code: String) -> Self {
        if code == FORCE_LOGOUT_CODE {
            RejectReason::ForceLogout
        } else {
            RejectReason::Other(code)
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator should do with the local session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidation {
    /// Token confirmed by the server and refreshed in place.
    Valid,
    /// No local token; nothing to validate and nothing to clear.
    NotLoggedIn,
    /// Authoritative rejection; local token state must be discarded.
    Rejected(RejectReason),
    /// The server could not be reached; the local session stands.
    Unreachable,
}

impl SessionValidation {
    /// Whether the session may continue to be treated as live.
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionValidation::Valid | SessionValidation::Unreachable)
    }

    /// Whether local token state must be discarded.
    pub fn should_clear(&self) -> bool {
        matches!(self, SessionValidation::Rejected(_))
    }
}

pub struct SessionValidator {
    config: Arc<AuthConfig>,
    store: Arc<BoundTokenStore>,
    exchanger: Box<dyn TokenExchanger>,
}

impl SessionValidator {
    pub fn new(
        config: Arc<AuthConfig>,
        store: Arc<BoundTokenStore>,
        exchanger: Box<dyn TokenExchanger>,
    ) -> Self {
        Self {
            config,
            store,
            exchanger,
        }
    }

    /// Refresh the stored token's claims from the server.
    ///
    /// Fails fast without a network call when there is no local token.
    /// Returns whether a refreshed token was written; never propagates an
    /// error to the caller.
    pub async fn refresh(&self) -> bool {
        let Some(token) = self.store.read() else {
            warn!("no token to refresh");
            return false;
        };
        let generation = self.store.generation();

        match self.exchanger.exchange(&token, &self.config.app_id).await {
            Ok(grant) => match grant.access_token {
                Some(new_token) => match self.store.store_if_current(generation, &new_token) {
                    Ok(written) => {
                        if written {
                            info!("token refreshed");
                        }
                        written
                    }
                    Err(error) => {
                        warn!(error = %error, "failed to persist refreshed token");
                        false
                    }
                },
                None => {
                    warn!("token refresh returned no token");
                    false
                }
            },
            Err(error) => {
                warn!(error = %error, "token refresh failed");
                false
            }
        }
    }

    /// Reconcile the stored token with server authority.
    pub async fn validate(&self) -> SessionValidation {
        let Some(token) = self.store.read() else {
            return SessionValidation::NotLoggedIn;
        };
        let generation = self.store.generation();

        match self.exchanger.exchange(&token, &self.config.app_id).await {
            Ok(grant) => match grant.access_token {
                Some(new_token) => {
                    // Refresh the stored claims while we are at it; a clear
                    // that raced this response wins and the write is dropped.
                    if let Err(error) = self.store.store_if_current(generation, &new_token) {
                        warn!(error = %error, "failed to persist refreshed token");
                    }
                    SessionValidation::Valid
                }
                None => {
                    warn!("session validation returned no token; clearing");
                    SessionValidation::Rejected(RejectReason::NoTokenReturned)
                }
            },
            Err(ApiError::Rejected { status, reason }) => {
                let reason = RejectReason::from_code(reason);
                if reason == RejectReason::ForceLogout {
                    warn!("force logout triggered by administrator; clearing token");
                } else {
                    warn!(status, reason = %reason, "session validation failed; clearing token");
                }
                SessionValidation::Rejected(reason)
            }
            Err(ApiError::Network(error)) => {
                warn!(error = %error, "session validation network error; keeping local session");
                SessionValidation::Unreachable
            }
        }
    }
}
