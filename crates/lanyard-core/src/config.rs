//! Composition-time configuration.
//!
//! Built once by the embedding application and passed by reference into
//! every component that needs it; there is no process-global configuration.
//! A [`SessionManager`](crate::SessionManager) cannot exist without a
//! config, so "used before initialization" is unrepresentable rather than a
//! runtime crash class.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageArea;

/// Callback path registered with the portal unless overridden.
pub const DEFAULT_CALLBACK_PATH: &str = "/auth/callback";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),
}

/// Configuration for one application's session against the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Application id registered with the portal.
    pub app_id: String,
    /// Base URL of the central login portal.
    pub portal_url: String,
    /// Root URL of the token service hosting the exchange endpoint.
    pub token_service_root_url: String,
    /// Path the portal redirects back to on this application's origin.
    pub callback_path: String,
    /// Which storage area holds the bound token and CSRF state.
    pub storage_area: StorageArea,
}

impl AuthConfig {
    /// Validate and assemble a configuration with the default callback path
    /// and persistent storage.
    pub fn new(
        app_id: impl Into<String>,
        portal_url: impl Into<String>,
        token_service_root_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let app_id = app_id.into();
        let portal_url = portal_url.into();
        let token_service_root_url = token_service_root_url.into();

        if app_id.trim().is_empty() {
            return Err(ConfigError::Missing("app_id"));
        }
        if portal_url.trim().is_empty() {
            return Err(ConfigError::Missing("portal_url"));
        }
        if token_service_root_url.trim().is_empty() {
            return Err(ConfigError::Missing("token_service_root_url"));
        }

        Ok(Self {
            app_id,
            portal_url,
            token_service_root_url,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            storage_area: StorageArea::default(),
        })
    }

    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    pub fn with_storage_area(mut self, area: StorageArea) -> Self {
        self.storage_area = area;
        self
    }
}
