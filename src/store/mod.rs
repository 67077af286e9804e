//! Document store integration for persisting recipes
//!
//! Handles equality lookups and server-id inserts against Firestore, with an
//! in-memory implementation for tests and local runs.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreClient;
pub use memory::InMemoryDocumentStore;

use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A stored document: its store-assigned id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document in `collection` whose `field` equals `value`, if any.
    async fn find_first(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Document>>;

    /// Inserts a new document and returns the id the store generated for it.
    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<String>;
}
