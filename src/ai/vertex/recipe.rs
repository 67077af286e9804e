use super::client::VertexHttpClient;
use super::types::{
    Content, FileData, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use crate::ai::{RecipeModel, IMAGE_MIME_TYPE};
use crate::auth::TokenProvider;
use crate::gcs::GcsUri;
use crate::{prompts, Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct VertexRecipeClient {
    http: VertexHttpClient,
}

impl VertexRecipeClient {
    pub fn new(
        project_id: String,
        location: String,
        model: String,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self::new_with_client(project_id, location, model, tokens, reqwest::Client::new())
    }

    pub fn new_with_client(
        project_id: String,
        location: String,
        model: String,
        tokens: Arc<dyn TokenProvider>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            http: VertexHttpClient::new_with_client(
                project_id,
                location,
                model,
                tokens,
                Duration::from_secs(120),
                client,
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn build_request(image: &GcsUri) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::FileData {
                        file_data: FileData {
                            mime_type: IMAGE_MIME_TYPE.to_string(),
                            file_uri: image.as_str().to_string(),
                        },
                    },
                    Part::Text {
                        text: prompts::recipe_instruction().to_string(),
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
            }),
        }
    }
}

#[async_trait]
impl RecipeModel for VertexRecipeClient {
    async fn describe_recipe(&self, image: &GcsUri) -> Result<String> {
        tracing::debug!(
            "Requesting recipe for {} from model {}",
            image,
            self.http.model()
        );

        let request = Self::build_request(image);
        let response: GenerateContentResponse = self.http.generate_content(&request).await?;

        let text = response
            .text()
            .ok_or_else(|| Error::Model("No text in model response".to_string()))?;

        tracing::debug!("Model returned {} chars", text.len());
        Ok(text)
    }
}
