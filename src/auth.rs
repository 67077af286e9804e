//! OAuth access tokens for Google Cloud REST calls.
//!
//! Both Vertex AI and Firestore take a bearer token. Inside Cloud Run / Cloud
//! Functions the token comes from the instance metadata server; locally a
//! token can be supplied directly (e.g. `gcloud auth print-access-token`).

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_METADATA_BASE_URL: &str = "http://metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Always hands out the same token.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Fetches the default service account token from the metadata server and
/// caches it until shortly before expiry.
pub struct MetadataTokenProvider {
    client: Client,
    base_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_METADATA_BASE_URL.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn fetch(&self) -> Result<CachedToken> {
        tracing::debug!("Fetching access token from metadata server");

        let response = self
            .client
            .get(format!("{}{}", self.base_url, TOKEN_PATH))
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach metadata server: {}", e);
                Error::Auth(format!("Metadata server unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Metadata server error (status {}): {}", status, error_text);
            return Err(Error::Auth(format!(
                "Metadata server error (status {}): {}",
                status, error_text
            )));
        }

        let body: MetadataTokenResponse = response.json().await?;
        Ok(CachedToken {
            token: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in),
        })
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at - ChronoDuration::seconds(EXPIRY_MARGIN_SECS) > Utc::now() {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
