//! Shared helpers for unit tests: a minimal JWT builder and a fully
//! populated claims payload.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{json, Value};

/// A fully populated claims payload with the given expiry.
pub fn claims_json(exp: i64) -> Value {
    json!({
        "sub": "user-1",
        "email": "pat@example.com",
        "exp": exp,
        "iat": exp - 3600,
        "aud": "demo-app",
        "role": "authenticated",
        "full_name": "Pat Example",
        "avatar_url": "https://cdn.example.com/pat.png",
        "organization_id": "org-1",
        "organization_slug": "acme",
        "organization_name": "Acme",
        "application_id": "app-1",
        "application_slug": "demo",
        "app_role": "member",
        "app_role_level": 20,
        "is_owner": false,
        "permissions": ["reports.view"],
        "enabled_modules": ["reports"],
        "subscription_plan": "professional",
        "subscription_status": "active",
        "plan_features": ["exports"],
        "plan_limits": {"projects": 5},
        "is_platform_admin": false,
        "master_auth": true
    })
}

/// Compact-form token around an arbitrary JSON payload. The signature is a
/// placeholder; this crate never verifies it.
pub fn encode_jwt(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{header}.{body}.placeholder-signature")
}

/// A valid, unexpired token carrying [`claims_json`].
pub fn valid_jwt() -> String {
    encode_jwt(&claims_json(far_future_exp()))
}

/// An expiry comfortably in the future.
pub fn far_future_exp() -> i64 {
    chrono::Utc::now().timestamp() + 3600
}
