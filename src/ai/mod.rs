//! Generative model integration for recipe extraction
//!
//! Sends a photographed dish (by Cloud Storage reference) and the fixed
//! instruction to Gemini on Vertex AI and hands back the raw JSON text.

pub mod mock;
pub mod vertex;

pub use mock::MockRecipeModel;
pub use vertex::VertexRecipeClient;

use crate::gcs::GcsUri;
use crate::Result;
use async_trait::async_trait;

/// MIME type declared for every uploaded image.
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

#[async_trait]
pub trait RecipeModel: Send + Sync {
    /// Returns the model's answer as text, expected (not guaranteed) to be JSON.
    async fn describe_recipe(&self, image: &GcsUri) -> Result<String>;
}
