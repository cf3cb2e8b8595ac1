//! One-shot CSRF state for the login redirect round trip.
//!
//! A fresh state token is issued right before control is handed to the
//! portal and verified when the callback returns. The caller clears it once
//! the callback attempt concludes, success or failure, so a state value
//! never survives to a second attempt.

use std::sync::Arc;

use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

use crate::storage::AuthStorage;

/// Storage key for the live CSRF state.
pub(crate) const STATE_KEY: &str = "lanyard_state";

/// Length of a generated state token. 32 alphanumeric characters carry just
/// over 190 bits of entropy.
const STATE_LEN: usize = 32;

pub struct CsrfStateStore {
    storage: Arc<AuthStorage>,
}

impl CsrfStateStore {
    pub fn new(storage: Arc<AuthStorage>) -> Self {
        Self { storage }
    }

    /// Generate, persist, and return a fresh state token. Replaces any
    /// previously issued one; at most one state is live at a time.
    pub fn issue(&self) -> Result<String> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();
        self.storage
            .set(STATE_KEY, &state)
            .context("failed to persist csrf state")?;
        Ok(state)
    }

    /// Exact-equality check against the live state. A missing received value
    /// or a missing stored value both fail.
    ///
    /// Verification does NOT consume the state; the caller clears it when
    /// the callback attempt concludes.
    pub fn verify(&self, received: Option<&str>) -> bool {
        match (self.storage.get(STATE_KEY), received) {
            (Some(stored), Some(received)) => stored == received,
            _ => false,
        }
    }

    /// Remove the state from both storage areas.
    pub fn clear(&self) {
        if let Err(error) = self.storage.remove(STATE_KEY) {
            warn!(error = %error, "failed to clear csrf state");
        }
    }
}
