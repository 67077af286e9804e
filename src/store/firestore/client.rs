use super::value::{decode_fields, encode_fields, Fields, FirestoreValue};
use crate::auth::TokenProvider;
use crate::store::{Document, DocumentStore};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryRequest {
    structured_query: StructuredQuery,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StructuredQuery {
    from: Vec<CollectionSelector>,
    #[serde(rename = "where")]
    filter: Filter,
    limit: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionSelector {
    collection_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Filter {
    field_filter: FieldFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldFilter {
    field: FieldReference,
    op: &'static str,
    value: FirestoreValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldReference {
    field_path: String,
}

#[derive(Debug, Serialize)]
struct CreateDocumentRequest {
    fields: Fields,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Fields,
}

/// One element of the streamed `runQuery` response array. Elements without
/// a document only carry progress information such as `readTime`.
#[derive(Debug, Deserialize)]
struct RunQueryResponseItem {
    document: Option<RawDocument>,
}

impl RawDocument {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn into_document(self) -> Result<Document> {
        let id = self.id().to_string();
        Ok(Document {
            id,
            fields: decode_fields(self.fields)?,
        })
    }
}

/// Quote a field name for use as a Firestore field path when it is not a
/// simple identifier.
fn quote_field_path(field: &str) -> String {
    let simple = field
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// Firestore REST client scoped to one project and database.
pub struct FirestoreClient {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    project_id: String,
    database: String,
    base_url: String,
    timeout: Duration,
}

impl FirestoreClient {
    pub fn new_with_client(
        project_id: String,
        database: String,
        tokens: Arc<dyn TokenProvider>,
        client: Client,
    ) -> Self {
        Self {
            client,
            tokens,
            project_id,
            database,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents",
            self.base_url, self.project_id, self.database
        )
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        url: String,
        request: &Req,
    ) -> Result<Resp> {
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Firestore: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Firestore error (status {}): {}", status, error_text);
            return Err(Error::Store(format!(
                "Firestore error (status {}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Firestore response: {}\nBody: {}", e, body);
            Error::Store(format!("Failed to parse Firestore response: {}", e))
        })
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn find_first(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Document>> {
        tracing::debug!("Querying {} where {} == {}", collection, field, value);

        let request = RunQueryRequest {
            structured_query: StructuredQuery {
                from: vec![CollectionSelector {
                    collection_id: collection.to_string(),
                }],
                filter: Filter {
                    field_filter: FieldFilter {
                        field: FieldReference {
                            field_path: quote_field_path(field),
                        },
                        op: "EQUAL",
                        value: FirestoreValue::from_json(value),
                    },
                },
                limit: 1,
            },
        };

        let items: Vec<RunQueryResponseItem> = self
            .post(format!("{}:runQuery", self.documents_url()), &request)
            .await?;

        items
            .into_iter()
            .find_map(|item| item.document)
            .map(RawDocument::into_document)
            .transpose()
    }

    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<String> {
        tracing::debug!("Adding document to {}", collection);

        let request = CreateDocumentRequest {
            fields: encode_fields(&fields),
        };

        let created: RawDocument = self
            .post(format!("{}/{}", self.documents_url(), collection), &request)
            .await?;

        Ok(created.id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCUMENTS_PATH: &str = "/v1/projects/test-project/databases/(default)/documents";

    fn make_client(server: &MockServer) -> FirestoreClient {
        FirestoreClient::new_with_client(
            "test-project".to_string(),
            "(default)".to_string(),
            Arc::new(StaticTokenProvider::new("owner")),
            Client::new(),
        )
        .with_base_url(server.uri())
    }

    #[test]
    fn test_quote_field_path() {
        assert_eq!(quote_field_path("nombre_receta"), "nombre_receta");
        assert_eq!(quote_field_path("_x1"), "_x1");
        assert_eq!(quote_field_path("1st"), "`1st`");
        assert_eq!(quote_field_path("nom receta"), "`nom receta`");
        assert_eq!(quote_field_path("a`b"), "`a\\`b`");
    }

    #[tokio::test]
    async fn test_find_first_returns_matching_document() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCUMENTS_PATH)))
            .and(header("authorization", "Bearer owner"))
            .and(body_json(json!({
                "structuredQuery": {
                    "from": [{"collectionId": "recipes"}],
                    "where": {"fieldFilter": {
                        "field": {"fieldPath": "nombre_receta"},
                        "op": "EQUAL",
                        "value": {"stringValue": "Amanida"}
                    }},
                    "limit": 1
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "document": {
                    "name": "projects/test-project/databases/(default)/documents/recipes/abc123",
                    "fields": {
                        "nombre_receta": {"stringValue": "Amanida"},
                        "likes": {"integerValue": "7"}
                    },
                    "createTime": "2024-05-01T10:00:00Z",
                    "updateTime": "2024-05-01T10:00:00Z"
                },
                "readTime": "2024-05-02T10:00:00Z"
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let document = make_client(&server)
            .find_first("recipes", "nombre_receta", &json!("Amanida"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(document.id, "abc123");
        assert_eq!(
            Value::Object(document.fields),
            json!({"nombre_receta": "Amanida", "likes": 7})
        );
    }

    #[tokio::test]
    async fn test_find_first_with_no_match() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCUMENTS_PATH)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"readTime": "2024-05-02T10:00:00Z"}])),
            )
            .mount(&server)
            .await;

        let document = make_client(&server)
            .find_first("recipes", "nombre_receta", &json!("Inexistent"))
            .await
            .unwrap();
        assert_eq!(document, None);
    }

    #[tokio::test]
    async fn test_add_returns_generated_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}/recipes", DOCUMENTS_PATH)))
            .and(body_json(json!({
                "fields": {
                    "nombre_receta": {"stringValue": "Amanida"},
                    "likes": {"integerValue": "0"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/databases/(default)/documents/recipes/NEWID42",
                "fields": {
                    "nombre_receta": {"stringValue": "Amanida"},
                    "likes": {"integerValue": "0"}
                },
                "createTime": "2024-05-01T10:00:00Z",
                "updateTime": "2024-05-01T10:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut fields = Map::new();
        fields.insert("nombre_receta".to_string(), json!("Amanida"));
        fields.insert("likes".to_string(), json!(0));

        let id = make_client(&server).add("recipes", fields).await.unwrap();
        assert_eq!(id, "NEWID42");
    }

    #[tokio::test]
    async fn test_error_status_is_store_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCUMENTS_PATH)))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let err = make_client(&server)
            .find_first("recipes", "nombre_receta", &json!("Amanida"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }
}
