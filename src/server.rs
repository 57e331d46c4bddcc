//! JSON HTTP API over the vector index.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Collection metadata, `null` if not built |
//! | `POST` | `/query`  | `{ "query": "...", "k": 4 }` → `{ "results": [{ "content", "source" }] }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `model_mismatch` (409),
//! `embedding_unavailable` (503), `internal` (500).

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use groundwork_core::error::IndexError;
use groundwork_core::index::VectorIndex;
use groundwork_core::models::{CollectionInfo, Retrieved};
use groundwork_core::store::IndexStore;

use crate::config::Config;
use crate::retrieve::open_index;

/// Shared state for all handlers. One index (and so one embedder) serves
/// every request.
pub struct AppState<S> {
    pub index: Arc<VectorIndex<S>>,
    pub collection: String,
    pub default_k: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            collection: self.collection.clone(),
            default_k: self.default_k,
        }
    }
}

/// `gw serve`: bind `[server].bind` and serve until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let index = open_index(config).await?;
    let state = AppState {
        index: Arc::new(index),
        collection: config.index.collection.clone(),
        default_k: config.retrieval.top_k,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("Listening on http://{}", config.server.bind);
    tracing::info!(bind = %config.server.bind, collection = %config.index.collection, "server started");

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router<S: IndexStore + 'static>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status::<S>))
        .route("/query", post(handle_query::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        let message = err.to_string();
        match err {
            IndexError::InvalidK => bad_request(message),
            IndexError::ModelMismatch { .. } => AppError {
                status: StatusCode::CONFLICT,
                code: "model_mismatch",
                message,
            },
            IndexError::Embedding(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "embedding_unavailable",
                message,
            },
            _ => {
                tracing::error!(error = %message, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message,
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /status ============

#[derive(Serialize)]
struct StatusResponse {
    collection: String,
    info: Option<CollectionInfo>,
}

async fn handle_status<S: IndexStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<StatusResponse>, AppError> {
    let info = state.index.info(&state.collection).await?;
    Ok(Json(StatusResponse {
        collection: state.collection.clone(),
        info,
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    results: Vec<Retrieved>,
}

async fn handle_query<S: IndexStore + 'static>(
    State(state): State<AppState<S>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;

    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let k = req.k.unwrap_or(state.default_k);

    let results = state.index.query(&state.collection, &req.query, k).await?;
    tracing::debug!(k, results = results.len(), "query served");
    Ok(Json(QueryResponse { results }))
}
