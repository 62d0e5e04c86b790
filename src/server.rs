//! Import HTTP API.
//!
//! Exposes batch and single-record imports plus read access to the
//! canonical store as a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/imports/{source}` | Import one page or id list; returns the batch result |
//! | `POST` | `/imports/{source}/{external_id}` | Import one record |
//! | `GET`  | `/sources` | Configured sources |
//! | `GET`  | `/publications/{id}` | Publication with contributors and mappings |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Batch request body
//!
//! ```json
//! { "update_existing": true, "page": 0, "size": 50, "query": "glacier" }
//! { "update_existing": false, "ids": ["doi:10.5072/FK2/AAA", "doi:10.5072/FK2/BBB"] }
//! ```
//!
//! `ids` and the paging fields are mutually exclusive.
//!
//! # Single import status codes
//!
//! `201` created, `200` updated or already synced, `404` unknown upstream,
//! `422` the record could not be imported.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "size must be > 0" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `unprocessable` (422), `upstream_error` (502), `internal` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::adapter::{AdapterRegistry, SourceAdapter};
use crate::batch::{self, BatchRequest, Selection};
use crate::config::Config;
use crate::db;
use crate::error::BatchError;
use crate::get::{find_publication, PublicationResponse};
use crate::mint::{MintQueue, OutboxMintQueue};
use crate::models::{BatchItemResult, BatchResult, ItemStatus, PageParams};
use crate::sources::{source_infos, SourceInfo};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
    config: Arc<Config>,
    adapters: Arc<AdapterRegistry>,
    minter: Arc<dyn MintQueue>,
}

/// Starts the HTTP server with the adapters configured under `[sources]`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let adapters = AdapterRegistry::from_config(config)?;
    run_server_with_adapters(config, adapters).await
}

/// Starts the HTTP server with an explicit adapter registry.
///
/// Useful for custom binaries that register their own [`SourceAdapter`]s.
pub async fn run_server_with_adapters(
    config: &Config,
    adapters: AdapterRegistry,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    let minter: Arc<dyn MintQueue> = Arc::new(OutboxMintQueue::new(pool.clone()));

    for name in adapters.names() {
        info!(source = name, "POST /imports/{}", name);
    }

    let state = AppState::new(pool, config.clone(), adapters, minter);

    println!("pubharvest listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/imports/{source}", post(handle_import_batch))
        .route("/imports/{source}/{external_id}", post(handle_import_one))
        .route("/sources", get(handle_sources))
        .route("/publications/{id}", get(handle_get_publication))
        .route("/health", get(handle_health))
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
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<BatchError> for AppError {
    fn from(err: BatchError) -> Self {
        let message = err.to_string();
        match err {
            BatchError::InvalidRequest(_) => bad_request(message),
            BatchError::NotFound(_) => not_found(message),
            BatchError::Fetch(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "upstream_error",
                message,
            },
            BatchError::Store(_) | BatchError::Commit(_) => {
                error!(error = %message, "batch failed");
                internal(message)
            }
        }
    }
}

impl AppState {
    /// State over an existing pool, for embedding the router elsewhere.
    pub fn new(
        pool: SqlitePool,
        config: Config,
        adapters: AdapterRegistry,
        minter: Arc<dyn MintQueue>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            adapters: Arc::new(adapters),
            minter,
        }
    }

    fn adapter(&self, source: &str) -> Result<&dyn SourceAdapter, AppError> {
        self.adapters
            .find(source)
            .ok_or_else(|| not_found(format!("no source registered with name: {}", source)))
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

// ============ GET /sources ============

#[derive(Serialize)]
struct SourceListResponse {
    sources: Vec<SourceInfo>,
}

async fn handle_sources(State(state): State<AppState>) -> Json<SourceListResponse> {
    Json(SourceListResponse {
        sources: source_infos(&state.config, &state.adapters),
    })
}

// ============ GET /publications/{id} ============

async fn handle_get_publication(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicationResponse>, AppError> {
    let publication = find_publication(&state.pool, &id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    publication
        .map(Json)
        .ok_or_else(|| not_found(format!("publication not found: {}", id)))
}

// ============ POST /imports/{source} ============

/// JSON body for `POST /imports/{source}`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportBatchBody {
    #[serde(default)]
    pub update_existing: bool,
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl ImportBatchBody {
    /// Validate the body and turn it into a batch request.
    pub fn into_request(self, default_page_size: u32) -> Result<BatchRequest, String> {
        let paging = self.page.is_some()
            || self.size.is_some()
            || self.query.is_some()
            || self.status.is_some()
            || self.scope.is_some();

        let selection = match self.ids {
            Some(_) if paging => {
                return Err("ids cannot be combined with page, size, query, status or scope".into())
            }
            Some(ids) if ids.is_empty() => return Err("ids must not be empty".into()),
            Some(ids) => Selection::Ids(ids),
            None => {
                if self.size == Some(0) {
                    return Err("size must be > 0".into());
                }
                Selection::Page(PageParams {
                    page: self.page.unwrap_or(0),
                    size: self.size.unwrap_or(default_page_size),
                    query: self.query,
                    status: self.status,
                    scope: self.scope,
                })
            }
        };

        Ok(BatchRequest {
            update_existing: self.update_existing,
            selection,
        })
    }
}

async fn handle_import_batch(
    State(state): State<AppState>,
    Path(source): Path<String>,
    body: Option<Json<ImportBatchBody>>,
) -> Result<Json<BatchResult>, AppError> {
    let adapter = state.adapter(&source)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let request = body
        .into_request(state.config.import.default_page_size)
        .map_err(bad_request)?;

    let result = batch::run_batch(
        &state.pool,
        adapter,
        state.minter.as_ref(),
        &state.config.import.owner,
        &request,
    )
    .await?;
    Ok(Json(result))
}

// ============ POST /imports/{source}/{external_id} ============

#[derive(Debug, Default, Deserialize)]
pub struct ImportOneBody {
    #[serde(default)]
    pub update_existing: bool,
}

#[derive(Serialize)]
struct ImportOneResponse {
    #[serde(flatten)]
    item: BatchItemResult,
    message: &'static str,
}

async fn handle_import_one(
    State(state): State<AppState>,
    Path((source, external_id)): Path<(String, String)>,
    body: Option<Json<ImportOneBody>>,
) -> Result<Response, AppError> {
    let adapter = state.adapter(&source)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let item = batch::import_one(
        &state.pool,
        adapter,
        state.minter.as_ref(),
        &state.config.import.owner,
        &external_id,
        body.update_existing,
    )
    .await?;

    let (status, message) = match item.status {
        ItemStatus::Created => (StatusCode::CREATED, "created"),
        ItemStatus::Updated => (StatusCode::OK, "updated"),
        ItemStatus::Unchanged | ItemStatus::Skipped => (StatusCode::OK, "already synced"),
        ItemStatus::Error => (StatusCode::UNPROCESSABLE_ENTITY, "import failed"),
    };
    Ok((status, Json(ImportOneResponse { item, message })).into_response())
}
