use crate::auth::TokenProvider;
use crate::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Lightweight Vertex AI REST client for publisher (Gemini) models.
pub struct VertexHttpClient {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    project_id: String,
    location: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl VertexHttpClient {
    /// Construct a Vertex AI client.
    ///
    /// `model` should be the bare model ID (for example `gemini-2.5-flash`),
    /// not a `models/...`-prefixed path segment.
    pub fn new_with_client(
        project_id: String,
        location: String,
        model: String,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();
        let base_url = format!("https://{}-aiplatform.googleapis.com", location);

        Self {
            client,
            tokens,
            project_id,
            location,
            model,
            base_url,
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Returns the configured model ID without the `models/` prefix.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_content_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url, self.project_id, self.location, self.model
        )
    }

    /// Calls the model's `generateContent` endpoint.
    pub async fn generate_content<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp> {
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .post(self.generate_content_url())
            .timeout(self.timeout)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Vertex AI: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Vertex AI error (status {}): {}", status, error_text);
            return Err(Error::Model(format!(
                "Vertex AI error (status {}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Vertex AI response: {}\nBody: {}", e, body);
            Error::Model(format!("Failed to parse Vertex AI response: {}", e))
        })
    }
}
