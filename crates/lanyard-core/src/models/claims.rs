//! Wire-format claims carried by portal-issued bearer tokens.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Decoded payload of a bearer token from the portal's exchange endpoint.
///
/// Field names match the exchange endpoint's wire format exactly. Subject,
/// email, and expiry are required; everything else defaults when absent so
/// tokens minted before a claim was introduced still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject id.
    pub sub: String,
    pub email: String,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Issued-at, seconds since epoch.
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub aud: String,
    #[serde(default)]
    pub role: String,

    // User info
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: String,

    // Organization info
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub organization_slug: String,
    #[serde(default)]
    pub organization_name: String,

    // Application info
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub application_slug: String,

    // Role info
    #[serde(default)]
    pub app_role: String,
    #[serde(default)]
    pub app_role_level: i64,
    #[serde(default)]
    pub is_owner: bool,

    // Permissions & modules
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub enabled_modules: Vec<String>,

    // Subscription info
    #[serde(default)]
    pub subscription_plan: String,
    #[serde(default)]
    pub subscription_status: String,
    #[serde(default)]
    pub plan_features: Vec<String>,
    /// Numeric plan limits; -1 means unlimited.
    #[serde(default)]
    pub plan_limits: HashMap<String, i64>,

    #[serde(default)]
    pub is_platform_admin: bool,

    /// Provenance marker set by the issuing portal. Callback completion
    /// rejects tokens without it even when they are otherwise well formed.
    #[serde(default)]
    pub master_auth: bool,
}
