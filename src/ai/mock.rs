use super::RecipeModel;
use crate::gcs::GcsUri;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Scripted model: replays queued responses in order, cycling when it runs out.
#[derive(Clone)]
pub struct MockRecipeModel {
    responses: Arc<Mutex<Vec<std::result::Result<String, String>>>>,
    requested_uris: Arc<Mutex<Vec<String>>>,
}

impl MockRecipeModel {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            requested_uris: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push(Ok(response.into()));
        self
    }

    /// Queue a failed invocation surfacing as `Error::Model(message)`.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push(Err(message.into()));
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.requested_uris.lock().unwrap().len()
    }

    pub fn requested_uris(&self) -> Vec<String> {
        self.requested_uris.lock().unwrap().clone()
    }
}

impl Default for MockRecipeModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecipeModel for MockRecipeModel {
    async fn describe_recipe(&self, image: &GcsUri) -> Result<String> {
        let count = {
            let mut uris = self.requested_uris.lock().unwrap();
            uris.push(image.as_str().to_string());
            uris.len()
        };

        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(serde_json::json!({
                "nombre_receta": "Recepta de prova",
                "personas": 2,
                "tiempo_total": 15,
                "imagen": "https://example.com/model-suggestion.jpg",
                "ingredientes": ["aigua"],
                "pasos_con_tiempo": ["Bullir l'aigua (10 min)"],
                "alergenos": []
            })
            .to_string());
        }

        let index = (count - 1) % responses.len();
        responses[index].clone().map_err(Error::Model)
    }
}
