//! IBM Cloud IAM token exchange.
//!
//! IBM-hosted Sysdig instances authenticate with short-lived IAM access
//! tokens obtained from an API key. Tokens are cached and refreshed shortly
//! before they expire, or on demand after the API rejects one.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::ProviderError;

const GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Refresh this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Exchanges an IBM API key for IAM access tokens.
pub struct IamTokenSource {
    http: reqwest::Client,
    token_url: String,
    api_key: String,
    cached: Mutex<Option<CachedToken>>,
}

impl IamTokenSource {
    /// Create a token source for the IAM endpoint at `iam_url`.
    pub fn new(http: reqwest::Client, iam_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            token_url: format!("{}/identity/token", iam_url.trim_end_matches('/')),
            api_key: api_key.into(),
            cached: Mutex::new(None),
        }
    }

    /// Return a valid access token, exchanging the API key if needed.
    pub async fn token(&self) -> Result<String, ProviderError> {
        let mut cached = self.cached.lock().await;
        if let Some(current) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < current.expires_at {
                return Ok(current.token.clone());
            }
        }

        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token so the next call exchanges the key again.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    #[instrument(skip(self), fields(url = %self.token_url))]
    async fn exchange(&self) -> Result<CachedToken, ProviderError> {
        debug!("Exchanging IBM API key for IAM token");
        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", GRANT_TYPE), ("apikey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::PermissionDenied(format!(
                "IBM IAM token exchange failed ({}): {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let now = Instant::now();
        // An out-of-range lifetime is treated as already expiring.
        let expires_at = now
            .checked_add(Duration::from_secs(parsed.expires_in))
            .unwrap_or(now);
        Ok(CachedToken {
            token: parsed.access_token,
            expires_at,
        })
    }
}
