use super::{Document, DocumentStore};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-process document store. Documents keep insertion order within a
/// collection, so `find_first` returns the oldest match.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
    read_count: Arc<Mutex<usize>>,
    write_count: Arc<Mutex<usize>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, collection: &str, id: &str, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.to_string(),
                fields,
            });
        self
    }

    /// Make every subsequent call fail with `Error::Store(message)`.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.fail_with.lock().unwrap() = Some(message.into());
        self
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_read_count(&self) -> usize {
        *self.read_count.lock().unwrap()
    }

    pub fn get_write_count(&self) -> usize {
        *self.write_count.lock().unwrap()
    }

    fn check_failure(&self) -> Result<()> {
        match self.fail_with.lock().unwrap().as_ref() {
            Some(message) => Err(Error::Store(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_first(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Document>> {
        *self.read_count.lock().unwrap() += 1;
        self.check_failure()?;

        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.fields.get(field) == Some(value)))
            .cloned())
    }

    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<String> {
        *self.write_count.lock().unwrap() += 1;
        self.check_failure()?;

        let id = Uuid::new_v4().simple().to_string();
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });
        Ok(id)
    }
}
