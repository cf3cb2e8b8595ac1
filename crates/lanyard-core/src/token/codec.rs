//! Stateless bearer-token decoding.
//!
//! Signature verification is the exchange endpoint's job; this codec only
//! reads the payload segment of a compact token and checks expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use thiserror::Error;

use crate::models::TokenClaims;

/// Why a token failed to decode. Fails closed: a partially-parsed payload is
/// never surfaced as claims.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token is not in three-segment compact form")]
    MissingPayload,
    #[error("payload segment is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("payload is not a valid claims object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode the claims of a compact token without verifying its signature.
pub fn decode(token: &str) -> Result<TokenClaims, DecodeError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) if !payload.is_empty() => payload,
        _ => return Err(DecodeError::MissingPayload),
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    let text = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&text)?)
}

/// Strict expiry check against the current clock.
pub fn is_expired(claims: &TokenClaims) -> bool {
    is_expired_at(claims, Utc::now().timestamp_millis())
}

/// Expired iff `exp` (seconds) converted to milliseconds is strictly before
/// `now_millis`; a token expiring exactly now is still valid.
pub fn is_expired_at(claims: &TokenClaims, now_millis: i64) -> bool {
    claims.exp.saturating_mul(1000) < now_millis
}
