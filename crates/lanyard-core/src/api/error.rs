use serde::Deserialize;
use thiserror::Error;

/// Error body shape the token service uses for non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    /// The exchange endpoint answered with a non-success status. The reason
    /// is the server's error code, `"unknown"` when the body carried none.
    #[error("exchange rejected ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// Transport failure, or a success body that could not be read. Treated
    /// as connectivity trouble, never as an authoritative rejection.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ApiError {
    /// Build a rejection from a non-success response, parsing the body for
    /// the server's reason code on a best-effort basis.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let reason = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.error)
            .unwrap_or_else(|| "unknown".to_string());
        ApiError::Rejected {
            status: status.as_u16(),
            reason,
        }
    }
}
