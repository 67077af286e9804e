//! Service wiring and the HTTP entry point.

use crate::ai::{RecipeModel, VertexRecipeClient};
use crate::auth::{MetadataTokenProvider, StaticTokenProvider, TokenProvider};
use crate::handler::{HandlerResponse, RecipeHandler};
use crate::models::Config;
use crate::store::{DocumentStore, FirestoreClient};
use crate::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Response header echoing the envelope status (`200` or `-1`).
pub const HANDLER_STATUS_HEADER: &str = "x-handler-status";

/// Token the Firestore emulator accepts for unrestricted access.
const EMULATOR_TOKEN: &str = "owner";

/// Holds the long-lived handler shared by every request.
pub struct App {
    handler: Arc<RecipeHandler>,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub model: Arc<dyn RecipeModel>,
    pub store: Arc<dyn DocumentStore>,
    pub collection: String,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices) -> Self {
        Self {
            handler: Arc::new(RecipeHandler::new(
                services.model,
                services.store,
                services.collection,
            )),
        }
    }

    /// Construct an app talking to Vertex AI and Firestore as configured.
    pub fn new(config: &Config) -> Result<Self> {
        // Reuse one HTTP connection pool across all clients.
        let http_client = reqwest::Client::new();

        let tokens: Arc<dyn TokenProvider> = match &config.access_token {
            Some(token) => {
                info!("Using access token from environment");
                Arc::new(StaticTokenProvider::new(token.clone()))
            }
            None => {
                info!("Using metadata server for access tokens");
                Arc::new(MetadataTokenProvider::new(http_client.clone()))
            }
        };

        let store_tokens: Arc<dyn TokenProvider> = if config.firestore_emulator_host.is_some() {
            Arc::new(StaticTokenProvider::new(EMULATOR_TOKEN))
        } else {
            tokens.clone()
        };

        info!(
            "Model: {} in {} (project {})",
            config.model, config.location, config.project_id
        );
        let model = VertexRecipeClient::new_with_client(
            config.project_id.clone(),
            config.location.clone(),
            config.model.clone(),
            tokens,
            http_client.clone(),
        )
        .with_base_url(config.vertex_base_url());

        info!(
            "Document store: {} (database {}, collection {})",
            config.firestore_base_url(),
            config.database,
            config.collection
        );
        let store = FirestoreClient::new_with_client(
            config.project_id.clone(),
            config.database.clone(),
            store_tokens,
            http_client,
        )
        .with_base_url(config.firestore_base_url());

        Ok(Self::with_services(AppServices {
            model: Arc::new(model),
            store: Arc::new(store),
            collection: config.collection.clone(),
        }))
    }

    pub fn handler(&self) -> &RecipeHandler {
        &self.handler
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(gen_recipe))
            .route("/genRecipe", post(gen_recipe))
            .route("/health", get(health_check))
            .with_state(self.handler.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until Ctrl-C / SIGTERM.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("Server stopped");
        Ok(())
    }
}

async fn gen_recipe(State(handler): State<Arc<RecipeHandler>>, body: Bytes) -> Response {
    match handler.handle(&body).await {
        Ok(response) => envelope_response(response),
        Err(e) => {
            error!("Unhandled failure while handling request: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn envelope_response(response: HandlerResponse) -> Response {
    let status =
        StatusCode::from_u16(response.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(
            HeaderName::from_static(HANDLER_STATUS_HEADER),
            HeaderValue::from(response.status),
        )],
        Json(response.body),
    )
        .into_response()
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "recipe-generator",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
