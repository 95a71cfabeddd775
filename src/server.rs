//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/index-jobs` | Enqueue an index job |
//! | `GET`  | `/api/index-jobs/{id}` | Inspect an index job |
//! | `GET`  | `/api/documents/{id}` | Fetch a document |
//! | `POST` | `/api/search` | Full-text search |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::db;
use crate::get::get_document;
use crate::jobs;
use crate::migrate;
use crate::models::{Document, IndexJob, SearchHit};
use crate::search::{search_documents, SearchQuery, DEFAULT_LIMIT};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pool: SqlitePool,
}

/// Starts the HTTP server on `[server].bind` and serves until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "http api listening");
    println!("Codex API listening on http://{}", bind_addr);

    axum::serve(listener, router(pool)).await?;
    Ok(())
}

/// Builds the API router over an existing pool.
pub fn router(pool: SqlitePool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/index-jobs", post(handle_create_job))
        .route("/api/index-jobs/{id}", get(handle_get_job))
        .route("/api/documents/{id}", get(handle_get_document))
        .route("/api/search", post(handle_search))
        .layer(cors)
        .with_state(AppState { pool })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
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
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Store failures are logged in full and reported without internals.
fn internal(err: anyhow::Error) -> AppError {
    let detail = format!("{:#}", err);
    error!(error = %detail, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: "internal error".to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /api/index-jobs ============

/// Enqueues a job. The request carries no parameters; the docs root is
/// server-side configuration.
async fn handle_create_job(State(state): State<AppState>) -> Result<Response, AppError> {
    let job = jobs::enqueue(&state.pool).await.map_err(internal)?;
    let location = format!("/api/index-jobs/{}", job.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(job),
    )
        .into_response())
}

async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<IndexJob>, AppError> {
    jobs::get_job(&state.pool, id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("index job not found: {}", id)))
}

// ============ GET /api/documents/{id} ============

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Document>, AppError> {
    get_document(&state.pool, id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("document not found: {}", id)))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    limit: i64,
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    let query =
        SearchQuery::new(&request.query, request.limit).map_err(|e| bad_request(e.to_string()))?;
    let results = search_documents(&state.pool, &query)
        .await
        .map_err(internal)?;

    Ok(Json(SearchResponse {
        query: query.text,
        limit: query.limit,
        results,
    }))
}
