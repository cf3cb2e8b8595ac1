//! Fingerprint-bound token persistence.
//!
//! The token is stored together with the fingerprint of the environment that
//! stored it, and only ever handed back to an environment that produces the
//! same fingerprint. Everything else resolves to "no session".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fingerprint::DeviceEnv;
use crate::models::TokenClaims;
use crate::storage::AuthStorage;
use crate::token::codec;

/// Storage key for the bound-token record.
pub(crate) const TOKEN_KEY: &str = "lanyard_token";

/// Token persisted together with the fingerprint that stored it.
#[derive(Debug, Serialize, Deserialize)]
struct BoundToken {
    token: String,
    fingerprint: String,
}

pub struct BoundTokenStore {
    storage: Arc<AuthStorage>,
    fingerprint: String,
    /// Bumped on every clear; in-flight writes check it before landing.
    generation: AtomicU64,
}

impl BoundTokenStore {
    pub fn new(storage: Arc<AuthStorage>, env: &DeviceEnv) -> Self {
        Self {
            storage,
            fingerprint: env.fingerprint(),
            generation: AtomicU64::new(0),
        }
    }

    /// Persist a token bound to this environment's fingerprint. Replaces any
    /// previous record wholesale.
    pub fn store(&self, token: &str) -> Result<()> {
        let record = BoundToken {
            token: token.to_string(),
            fingerprint: self.fingerprint.clone(),
        };
        let serialized = serde_json::to_string(&record)?;
        self.storage
            .set(TOKEN_KEY, &serialized)
            .context("failed to persist bound token")
    }

    /// Generation stamp to pair with [`store_if_current`] around a
    /// suspension point.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store a token only if no clear has happened since `generation` was
    /// sampled. Returns whether the write landed.
    ///
    /// This is how a clear wins over a validation response that was already
    /// in flight when the user logged out.
    pub fn store_if_current(&self, generation: u64, token: &str) -> Result<bool> {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("discarding stale token write; store was cleared mid-flight");
            return Ok(false);
        }
        self.store(token)?;
        Ok(true)
    }

    /// Read the stored token, enforcing the fingerprint binding.
    ///
    /// A record bound to a different fingerprint, or one that fails to
    /// deserialize, is cleared and never exposed.
    pub fn read(&self) -> Option<String> {
        let raw = self.storage.get(TOKEN_KEY)?;

        let record: BoundToken = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(error) => {
                debug!(error = %error, "stored token record is malformed; clearing");
                self.clear();
                return None;
            }
        };

        if record.fingerprint != self.fingerprint {
            warn!("token fingerprint mismatch - possible token theft; clearing");
            self.clear();
            return None;
        }

        Some(record.token)
    }

    /// Remove the record from both storage areas and invalidate any
    /// in-flight generation-stamped write.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(error) = self.storage.remove(TOKEN_KEY) {
            warn!(error = %error, "failed to clear stored token");
        }
    }

    /// Decoded, unexpired claims for the stored token, or None.
    ///
    /// An expired token is cleared as a side effect. A token that fails to
    /// decode resolves to None without clearing; the record itself is intact
    /// and the failure is visible in logs.
    pub fn current_claims(&self) -> Option<TokenClaims> {
        let token = self.read()?;

        let claims = match codec::decode(&token) {
            Ok(claims) => claims,
            Err(error) => {
                debug!(error = %error, "stored token failed to decode");
                return None;
            }
        };

        if codec::is_expired(&claims) {
            debug!("stored token is expired; clearing");
            self.clear();
            return None;
        }

        Some(claims)
    }
}
