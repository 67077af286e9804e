//! Request handling: image reference in, deduplicated recipe out.
//!
//! The handler validates the `gs://` reference, asks the model for a recipe,
//! replaces `imagen` with the public URL of the uploaded photo, and then
//! either returns the recipe already stored under the same `nombre_receta`
//! or inserts the new one with `likes = 0`.
//!
//! Lookup and insert are two separate store calls. Two concurrent requests
//! for the same recipe name can both miss and both insert.

use crate::ai::RecipeModel;
use crate::gcs::GcsUri;
use crate::models::{Recipe, RecipeRequest, StoredRecipe};
use crate::store::DocumentStore;
use crate::{Error, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Status carried by error envelopes. Not an HTTP status code.
pub const ERROR_STATUS: i32 = -1;
pub const SUCCESS_STATUS: i32 = 200;

/// Field used as the deduplication key.
pub const NAME_FIELD: &str = "nombre_receta";

pub const INVALID_URI_MESSAGE: &str = "Error en el missatge, no arriba una ruta del bucket";

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Error en el missatge, no arriba una ruta del bucket")]
    Validation,

    #[error("Error generant recepta: {0}")]
    Generation(String),

    /// Not turned into an envelope; surfaces to the hosting server as a fault.
    #[error(transparent)]
    Store(#[from] Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecipeOutcome {
    /// A recipe with the same name was already stored; the new answer is discarded.
    Existing(StoredRecipe),
    Created(StoredRecipe),
}

impl RecipeOutcome {
    pub fn record(&self) -> &StoredRecipe {
        match self {
            RecipeOutcome::Existing(r) | RecipeOutcome::Created(r) => r,
        }
    }
}

impl RecipeError {
    /// Status used when the envelope has to travel over a real HTTP status line.
    pub fn http_status(&self) -> u16 {
        match self {
            RecipeError::Validation => 400,
            RecipeError::Generation(_) => 502,
            RecipeError::Store(_) => 500,
        }
    }
}

/// Wire-level result: JSON body plus the status the caller sees.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    /// `200` or `-1`.
    pub status: i32,
    pub http_status: u16,
    pub body: Value,
}

impl HandlerResponse {
    pub fn success(body: Value) -> Self {
        Self {
            status: SUCCESS_STATUS,
            http_status: 200,
            body,
        }
    }

    pub fn error(error: &RecipeError) -> Self {
        Self {
            status: ERROR_STATUS,
            http_status: error.http_status(),
            body: json!({ "error": error.to_string() }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ERROR_STATUS
    }
}

/// Long-lived handler; the model and store clients are shared across requests.
pub struct RecipeHandler {
    model: Arc<dyn RecipeModel>,
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl RecipeHandler {
    pub fn new(
        model: Arc<dyn RecipeModel>,
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            model,
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Run the full request flow and render the envelope.
    ///
    /// Validation and generation failures become `{"error": ...}` with status
    /// `-1`. Store failures are returned as `Err`.
    pub async fn handle(&self, body: &[u8]) -> Result<HandlerResponse> {
        match self.generate(body).await {
            Ok(outcome) => {
                let record = outcome.record();
                info!(
                    "Returning recipe '{}' (id {}, {})",
                    record.name().unwrap_or_default(),
                    record.id,
                    match outcome {
                        RecipeOutcome::Existing(_) => "existing",
                        RecipeOutcome::Created(_) => "created",
                    }
                );
                Ok(HandlerResponse::success(serde_json::to_value(record)?))
            }
            Err(RecipeError::Store(e)) => Err(e),
            Err(e) => {
                warn!("Request failed: {}", e);
                Ok(HandlerResponse::error(&e))
            }
        }
    }

    pub async fn generate(&self, body: &[u8]) -> std::result::Result<RecipeOutcome, RecipeError> {
        let request = RecipeRequest::from_body(body);
        let image = request
            .gcs_uri_str()
            .and_then(GcsUri::parse)
            .ok_or(RecipeError::Validation)?;

        info!("Generating recipe for {}", image);

        let mut recipe = self.describe(&image).await?;

        {
            let unknown = recipe.unknown_allergens();
            if !unknown.is_empty() {
                warn!(
                    "Model returned allergens outside the fixed list for '{}': {:?}",
                    recipe.nombre_receta, unknown
                );
            }
        }

        recipe.imagen = Some(Value::String(image.public_url()));

        let name = Value::String(recipe.nombre_receta.clone());
        if let Some(document) = self
            .store
            .find_first(&self.collection, NAME_FIELD, &name)
            .await?
        {
            info!(
                "Recipe '{}' already stored as {}",
                recipe.nombre_receta, document.id
            );
            return Ok(RecipeOutcome::Existing(StoredRecipe {
                id: document.id,
                fields: document.fields,
            }));
        }

        recipe.likes = Some(Value::from(0));
        let fields = recipe.to_fields()?;
        let id = self.store.add(&self.collection, fields.clone()).await?;
        info!("Stored new recipe '{}' as {}", recipe.nombre_receta, id);

        Ok(RecipeOutcome::Created(StoredRecipe { id, fields }))
    }

    async fn describe(&self, image: &GcsUri) -> std::result::Result<Recipe, RecipeError> {
        let text = self
            .model
            .describe_recipe(image)
            .await
            .map_err(|e| RecipeError::Generation(e.to_string()))?;

        serde_json::from_str(&text).map_err(|e| RecipeError::Generation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockRecipeModel;
    use crate::store::InMemoryDocumentStore;
    use pretty_assertions::assert_eq;

    const AMANIDA: &str = r#"{
        "nombre_receta": "Amanida",
        "personas": 2,
        "tiempo_total": 10,
        "imagen": "https://example.com/made-up.jpg",
        "ingredientes": ["enciam", "tomàquet", "oli"],
        "pasos_con_tiempo": ["Rentar l'enciam (5 min)", "Amanir (5 min)"],
        "alergenos": []
    }"#;

    fn handler(model: MockRecipeModel, store: InMemoryDocumentStore) -> RecipeHandler {
        RecipeHandler::new(Arc::new(model), Arc::new(store), "recipes")
    }

    fn body(uri: &str) -> Vec<u8> {
        json!({ "gcsUri": uri }).to_string().into_bytes()
    }

    #[tokio::test]
    async fn test_missing_or_invalid_uri_is_validation_error() {
        let model = MockRecipeModel::new();
        let store = InMemoryDocumentStore::new();
        let handler = handler(model.clone(), store.clone());

        let bodies: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"not json".to_vec(),
            b"{}".to_vec(),
            br#"{"gcsUri": null}"#.to_vec(),
            br#"{"gcsUri": 12}"#.to_vec(),
            br#"{"gcsUri": ["gs://bucket/a.jpg"]}"#.to_vec(),
            body("https://storage.googleapis.com/bucket/a.jpg"),
            body("bucket/a.jpg"),
        ];

        for b in bodies {
            let response = handler.handle(&b).await.unwrap();
            assert_eq!(response, HandlerResponse::error(&RecipeError::Validation));
            assert_eq!(response.status, -1);
            assert_eq!(response.http_status, 400);
            assert_eq!(response.body, json!({ "error": INVALID_URI_MESSAGE }));
        }

        assert_eq!(model.get_call_count(), 0);
        assert_eq!(store.get_read_count(), 0);
    }

    #[tokio::test]
    async fn test_non_json_model_output_is_generation_error() {
        let model = MockRecipeModel::new().with_response("Aquí tens la recepta: amanida");
        let store = InMemoryDocumentStore::new();
        let handler = handler(model, store.clone());

        let response = handler.handle(&body("gs://bucket/a.jpg")).await.unwrap();

        assert_eq!(response.status, ERROR_STATUS);
        let message = response.body["error"].as_str().unwrap();
        assert!(message.starts_with("Error generant recepta: "), "{}", message);
        assert_eq!(store.get_read_count(), 0);
        assert_eq!(store.get_write_count(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_is_generation_error_with_message() {
        let model = MockRecipeModel::new().with_failure("quota exceeded");
        let handler = handler(model, InMemoryDocumentStore::new());

        let response = handler.handle(&body("gs://bucket/a.jpg")).await.unwrap();

        assert_eq!(response.status, ERROR_STATUS);
        assert_eq!(response.http_status, 502);
        assert_eq!(
            response.body,
            json!({"error": "Error generant recepta: Model error: quota exceeded"})
        );
    }

    #[tokio::test]
    async fn test_response_without_name_is_generation_error() {
        let model = MockRecipeModel::new().with_response(r#"{"personas": 2}"#);
        let store = InMemoryDocumentStore::new();
        let handler = handler(model, store.clone());

        let response = handler.handle(&body("gs://bucket/a.jpg")).await.unwrap();

        assert!(response.is_error());
        assert_eq!(store.get_write_count(), 0);
    }

    #[tokio::test]
    async fn test_new_recipe_is_stored_with_public_image_and_zero_likes() {
        let model = MockRecipeModel::new().with_response(AMANIDA);
        let store = InMemoryDocumentStore::new();
        let handler = handler(model.clone(), store.clone());

        let response = handler
            .handle(&body("gs://bucket/path/img.jpg"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(
            response.body["imagen"],
            "https://storage.googleapis.com/bucket/path/img.jpg"
        );
        assert_eq!(response.body["likes"], 0);
        assert_eq!(response.body["nombre_receta"], "Amanida");
        assert_eq!(response.body["personas"], 2);

        let stored = store.documents("recipes");
        assert_eq!(stored.len(), 1);
        assert_eq!(response.body["id"], stored[0].id.as_str());
        assert_eq!(stored[0].fields["likes"], 0);
        assert_eq!(
            stored[0].fields["imagen"],
            "https://storage.googleapis.com/bucket/path/img.jpg"
        );
        assert!(!stored[0].fields.contains_key("id"));

        assert_eq!(model.requested_uris(), vec!["gs://bucket/path/img.jpg"]);
        assert_eq!(store.get_read_count(), 1);
        assert_eq!(store.get_write_count(), 1);
    }

    #[tokio::test]
    async fn test_model_likes_are_reset() {
        let model =
            MockRecipeModel::new().with_response(r#"{"nombre_receta": "Crema", "likes": 99}"#);
        let handler = handler(model, InMemoryDocumentStore::new());

        let response = handler.handle(&body("gs://b/c.jpg")).await.unwrap();
        assert_eq!(response.body["likes"], 0);
    }

    #[tokio::test]
    async fn test_existing_recipe_is_returned_unchanged() {
        let model = MockRecipeModel::new().with_response(AMANIDA);
        let store = InMemoryDocumentStore::new().with_document(
            "recipes",
            "stored-1",
            json!({
                "nombre_receta": "Amanida",
                "personas": 4,
                "imagen": "https://storage.googleapis.com/bucket/first.jpg",
                "likes": 12
            }),
        );
        let handler = handler(model.clone(), store.clone());

        for _ in 0..3 {
            let response = handler
                .handle(&body("gs://bucket/other.jpg"))
                .await
                .unwrap();

            assert_eq!(
                response,
                HandlerResponse::success(json!({
                    "id": "stored-1",
                    "nombre_receta": "Amanida",
                    "personas": 4,
                    "imagen": "https://storage.googleapis.com/bucket/first.jpg",
                    "likes": 12
                }))
            );
        }

        assert_eq!(model.get_call_count(), 3);
        assert_eq!(store.get_write_count(), 0);
        assert_eq!(store.documents("recipes").len(), 1);
    }

    #[tokio::test]
    async fn test_existing_recipe_without_likes_has_none() {
        let model = MockRecipeModel::new().with_response(AMANIDA);
        let store = InMemoryDocumentStore::new().with_document(
            "recipes",
            "old",
            json!({"nombre_receta": "Amanida"}),
        );
        let handler = handler(model, store);

        let response = handler.handle(&body("gs://bucket/a.jpg")).await.unwrap();
        assert_eq!(response.body, json!({"id": "old", "nombre_receta": "Amanida"}));
    }

    #[tokio::test]
    async fn test_existing_recipe_with_loose_types_is_returned_verbatim() {
        let model = MockRecipeModel::new().with_response(AMANIDA);
        let store = InMemoryDocumentStore::new().with_document(
            "recipes",
            "legacy",
            json!({
                "nombre_receta": "Amanida",
                "likes": 3.0,
                "personas": "4",
                "alergenos": [null, "Ous"]
            }),
        );
        let handler = handler(model, store.clone());

        let response = handler.handle(&body("gs://bucket/a.jpg")).await.unwrap();

        assert_eq!(
            response,
            HandlerResponse::success(json!({
                "id": "legacy",
                "nombre_receta": "Amanida",
                "likes": 3.0,
                "personas": "4",
                "alergenos": [null, "Ous"]
            }))
        );
        assert_eq!(store.get_write_count(), 0);
    }

    #[tokio::test]
    async fn test_loosely_typed_model_fields_are_stored_as_is() {
        let model = MockRecipeModel::new().with_response(
            r#"{"nombre_receta": "Amanida", "personas": "4", "tiempo_total": 30.0,
                "ingredientes": "enciam, tomàquet", "imagen": 7}"#,
        );
        let store = InMemoryDocumentStore::new();
        let handler = handler(model, store.clone());

        let response = handler.handle(&body("gs://bucket/a.jpg")).await.unwrap();

        assert_eq!(response.status, SUCCESS_STATUS);
        assert_eq!(response.http_status, 200);
        assert_eq!(response.body["personas"], "4");
        assert_eq!(response.body["tiempo_total"], json!(30.0));
        assert_eq!(response.body["ingredientes"], "enciam, tomàquet");
        assert_eq!(
            response.body["imagen"],
            "https://storage.googleapis.com/bucket/a.jpg"
        );

        let stored = store.documents("recipes");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].fields["personas"], "4");
        assert_eq!(stored[0].fields["tiempo_total"], json!(30.0));
        assert_eq!(stored[0].fields["likes"], 0);
    }

    #[tokio::test]
    async fn test_name_match_is_exact() {
        let model = MockRecipeModel::new().with_response(AMANIDA);
        let store = InMemoryDocumentStore::new().with_document(
            "recipes",
            "r1",
            json!({"nombre_receta": "amanida"}),
        );
        let handler = handler(model, store.clone());

        let response = handler.handle(&body("gs://bucket/a.jpg")).await.unwrap();

        assert_ne!(response.body["id"], "r1");
        assert_eq!(store.documents("recipes").len(), 2);
    }

    #[tokio::test]
    async fn test_extra_model_keys_are_kept() {
        let model = MockRecipeModel::new()
            .with_response(r#"{"nombre_receta": "Fideuà", "dificultat": "alta"}"#);
        let store = InMemoryDocumentStore::new();
        let handler = handler(model, store.clone());

        let response = handler.handle(&body("gs://bucket/f.jpg")).await.unwrap();

        assert_eq!(response.body["dificultat"], "alta");
        assert_eq!(store.documents("recipes")[0].fields["dificultat"], "alta");
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let model = MockRecipeModel::new().with_response(AMANIDA);
        let store = InMemoryDocumentStore::new().failing("deadline exceeded");
        let handler = handler(model, store);

        let err = handler.handle(&body("gs://bucket/a.jpg")).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn test_generate_reports_outcome_kind() {
        let model = MockRecipeModel::new().with_response(AMANIDA);
        let handler = handler(model, InMemoryDocumentStore::new());

        let first = handler.generate(&body("gs://bucket/a.jpg")).await.unwrap();
        let second = handler.generate(&body("gs://bucket/b.jpg")).await.unwrap();

        assert!(matches!(first, RecipeOutcome::Created(_)));
        assert!(matches!(second, RecipeOutcome::Existing(_)));
        assert_eq!(first.record().id, second.record().id);
        assert_eq!(
            second.record().fields["imagen"],
            "https://storage.googleapis.com/bucket/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_allergens_from_model_stay_within_fixed_list() {
        use crate::models::Allergen;

        let model = MockRecipeModel::new().with_response(
            r#"{"nombre_receta": "Paella", "alergenos": ["Crustacis", "Mol·luscs", "Peix"]}"#,
        );
        let handler = handler(model, InMemoryDocumentStore::new());

        let response = handler.handle(&body("gs://bucket/p.jpg")).await.unwrap();

        for label in response.body["alergenos"].as_array().unwrap() {
            assert!(label.as_str().unwrap().parse::<Allergen>().is_ok());
        }
    }
}
