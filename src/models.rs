//! Data models and structures
//!
//! Defines the inbound request, the recipe record produced by the model and
//! persisted in the document store, the allergen enumeration, and runtime
//! configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Inbound request body: `{ "gcsUri": "gs://..." }`.
///
/// `gcs_uri` is kept as a raw JSON value so that a present-but-wrong-typed
/// field can be told apart from a valid string later on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeRequest {
    pub gcs_uri: Option<Value>,
}

impl RecipeRequest {
    /// Parse a raw request body. Anything that is not a JSON object is
    /// treated as an empty mapping.
    pub fn from_body(body: &[u8]) -> Self {
        let gcs_uri = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(mut map)) => map.remove("gcsUri"),
            _ => None,
        };
        Self { gcs_uri }
    }

    pub fn gcs_uri_str(&self) -> Option<&str> {
        self.gcs_uri.as_ref().and_then(Value::as_str)
    }
}

/// Recipe as described by the model and stored in the `recipes` collection.
///
/// Only `nombre_receta` is required. The other named fields hold whatever JSON
/// the model produced, so a `"personas": "4"` is stored as-is. Keys beyond
/// the named fields are kept in `extra` and round-trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub nombre_receta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personas: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiempo_total: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagen: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredientes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pasos_con_tiempo: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alergenos: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Recipe {
    pub fn new(nombre_receta: impl Into<String>) -> Self {
        Self {
            nombre_receta: nombre_receta.into(),
            personas: None,
            tiempo_total: None,
            imagen: None,
            ingredientes: None,
            pasos_con_tiempo: None,
            alergenos: None,
            likes: None,
            extra: Map::new(),
        }
    }

    /// Entries of `alergenos` that are not one of the fixed labels, including
    /// non-string entries.
    pub fn unknown_allergens(&self) -> Vec<&Value> {
        self.alergenos
            .as_ref()
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|entry| {
                entry
                    .as_str()
                    .map_or(true, |label| label.parse::<Allergen>().is_err())
            })
            .collect()
    }

    /// Document fields as sent to the store.
    pub fn to_fields(&self) -> crate::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(crate::Error::Store(format!(
                "Recipe did not serialize to an object: {}",
                other
            ))),
        }
    }
}

/// A recipe document together with the identifier the store assigned to it.
///
/// Fields are kept exactly as persisted; nothing is decoded or coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecipe {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StoredRecipe {
    pub fn name(&self) -> Option<&str> {
        self.fields.get("nombre_receta").and_then(Value::as_str)
    }
}

/// The 14 allergen labels the model may use, in Catalan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Allergen {
    #[serde(rename = "Gluten")]
    Gluten,
    #[serde(rename = "Crustacis")]
    Crustaceans,
    #[serde(rename = "Ous")]
    Eggs,
    #[serde(rename = "Peix")]
    Fish,
    #[serde(rename = "Cacauets")]
    Peanuts,
    #[serde(rename = "Soja")]
    Soy,
    #[serde(rename = "Llet")]
    Milk,
    #[serde(rename = "Fruits de closca")]
    TreeNuts,
    #[serde(rename = "Api")]
    Celery,
    #[serde(rename = "Mostassa")]
    Mustard,
    #[serde(rename = "Grans de sèsam")]
    Sesame,
    #[serde(rename = "Diòxid de sofre i sulfits")]
    Sulphites,
    #[serde(rename = "Tramussos")]
    Lupin,
    #[serde(rename = "Mol·luscs")]
    Molluscs,
}

impl Allergen {
    pub const ALL: [Allergen; 14] = [
        Allergen::Gluten,
        Allergen::Crustaceans,
        Allergen::Eggs,
        Allergen::Fish,
        Allergen::Peanuts,
        Allergen::Soy,
        Allergen::Milk,
        Allergen::TreeNuts,
        Allergen::Celery,
        Allergen::Mustard,
        Allergen::Sesame,
        Allergen::Sulphites,
        Allergen::Lupin,
        Allergen::Molluscs,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Allergen::Gluten => "Gluten",
            Allergen::Crustaceans => "Crustacis",
            Allergen::Eggs => "Ous",
            Allergen::Fish => "Peix",
            Allergen::Peanuts => "Cacauets",
            Allergen::Soy => "Soja",
            Allergen::Milk => "Llet",
            Allergen::TreeNuts => "Fruits de closca",
            Allergen::Celery => "Api",
            Allergen::Mustard => "Mostassa",
            Allergen::Sesame => "Grans de sèsam",
            Allergen::Sulphites => "Diòxid de sofre i sulfits",
            Allergen::Lupin => "Tramussos",
            Allergen::Molluscs => "Mol·luscs",
        }
    }
}

impl fmt::Display for Allergen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Allergen {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Allergen::ALL
            .into_iter()
            .find(|a| a.label() == s)
            .ok_or_else(|| format!("Unknown allergen label '{}'", s))
    }
}

pub const DEFAULT_PROJECT_ID: &str = "ia-recipe-project";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-05-20";
pub const DEFAULT_DATABASE: &str = "(default)";
pub const DEFAULT_COLLECTION: &str = "recipes";

// Configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub project_id: String,
    pub location: String,
    pub model: String,
    pub database: String,
    pub collection: String,
    /// `host:port` of a local Firestore emulator.
    pub firestore_emulator_host: Option<String>,
    /// Static bearer token; the metadata server is used when absent.
    pub access_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            firestore_emulator_host: None,
            access_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        load_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            project_id: get("GOOGLE_CLOUD_PROJECT").unwrap_or(defaults.project_id),
            location: get("VERTEX_LOCATION").unwrap_or(defaults.location),
            model: get("VERTEX_MODEL").unwrap_or(defaults.model),
            database: get("FIRESTORE_DATABASE").unwrap_or(defaults.database),
            collection: get("RECIPES_COLLECTION").unwrap_or(defaults.collection),
            firestore_emulator_host: get("FIRESTORE_EMULATOR_HOST"),
            access_token: get("GOOGLE_OAUTH_ACCESS_TOKEN"),
        };

        if config.collection.contains('/') {
            return Err(crate::Error::Config(format!(
                "RECIPES_COLLECTION must be a top-level collection id, got '{}'",
                config.collection
            )));
        }

        Ok(config)
    }

    pub fn vertex_base_url(&self) -> String {
        format!("https://{}-aiplatform.googleapis.com", self.location)
    }

    pub fn firestore_base_url(&self) -> String {
        match &self.firestore_emulator_host {
            Some(host) => format!("http://{}", host),
            None => "https://firestore.googleapis.com".to_string(),
        }
    }
}

/// A missing `.env` is fine; a malformed one is a startup error.
fn load_dotenv(result: dotenvy::Result<std::path::PathBuf>) -> crate::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}
