//! Client for the portal's token-exchange endpoint.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ApiError;

/// HTTP request timeout in seconds.
/// 30s allows for slow responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Path prefix the token service mounts its functions under.
const FUNCTIONS_PATH: &str = "/functions/v1";

#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    app_id: &'a str,
}

/// Success payload from the exchange endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    /// Refreshed bearer token. Absent means the server accepted the call
    /// but declined to issue one.
    pub access_token: Option<String>,
}

/// Port consumed by the session validator. Lets tests substitute a scripted
/// exchange endpoint for the live portal.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange the current bearer token for a refreshed one.
    async fn exchange(&self, token: &str, app_id: &str) -> Result<TokenGrant, ApiError>;
}

/// Client for the portal's token service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct PortalClient {
    client: Client,
    exchange_url: String,
}

impl PortalClient {
    /// Create a client rooted at the token service's root URL.
    pub fn new(token_service_root_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            exchange_url: format!(
                "{}{}/exchange-token",
                token_service_root_url.trim_end_matches('/'),
                FUNCTIONS_PATH
            ),
        })
    }
}

#[async_trait]
impl TokenExchanger for PortalClient {
    async fn exchange(&self, token: &str, app_id: &str) -> Result<TokenGrant, ApiError> {
        debug!(url = %self.exchange_url, "exchanging bearer token");

        let response = self
            .client
            .post(&self.exchange_url)
            .bearer_auth(token)
            .json(&ExchangeRequest { app_id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        Ok(response.json().await?)
    }
}
