//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Application name and version |
//! | `GET`  | `/health` | Health check |
//! | `POST` | `/data/upload/{project_id}` | Upload a file (multipart field `file`) |
//! | `POST` | `/data/process/{project_id}` | Chunk a project's files |
//! | `GET`  | `/data/chunks/{chunk_id}` | Fetch one stored chunk |
//! | `GET`  | `/data/projects` | Page through projects |
//!
//! # Error Contract
//!
//! Failures carry only a signal:
//!
//! ```json
//! { "signal": "no_files_to_process" }
//! ```
//!
//! Client-side failures are `400`, a missing chunk is `404`, store failures
//! are `500` with signal `internal_error`. Bodies or queries that do not parse
//! are `400` with signal `invalid_request`.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::{
    extract::multipart::{Field, MultipartRejection},
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::{self, Deserializer, Unexpected};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::content::FsContentReader;
use crate::error::{ProcessError, UploadError};
use crate::models::ChunkRecord;
use crate::process::{ProcessRequest, ProcessSummary, Processor};
use crate::signal::ResponseSignal;
use crate::store::{DocumentStore, ProjectPage};
use crate::upload::{save_upload, UploadSource};

/// Room for multipart framing on top of the configured file size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    processor: Processor,
}

impl AppState {
    /// State backed by `store`, reading uploads from the configured files directory.
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        let reader = Arc::new(FsContentReader::new(config.files.dir.clone()));
        Self {
            config: Arc::new(config),
            processor: Processor::new(store, reader),
        }
    }

    fn store(&self) -> &dyn DocumentStore {
        self.processor.store().as_ref()
    }
}

/// Build the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.files.max_size_bytes() as usize + MULTIPART_OVERHEAD_BYTES;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_welcome))
        .route("/health", get(handle_health))
        .route("/data/upload/{project_id}", post(handle_upload))
        .route("/data/process/{project_id}", post(handle_process))
        .route("/data/chunks/{chunk_id}", get(handle_get_chunk))
        .route("/data/projects", get(handle_list_projects))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
///
/// The caller owns the store: it is opened before and closed after this
/// returns.
pub async fn run_server(config: &Config, store: Arc<dyn DocumentStore>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config.clone(), store));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("{} listening on http://{}", config.app.name, bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct SignalBody {
    signal: ResponseSignal,
}

/// Error type that converts into a `{ "signal": ... }` response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    signal: ResponseSignal,
}

impl AppError {
    fn new(status: StatusCode, signal: ResponseSignal) -> Self {
        Self { status, signal }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(SignalBody { signal: self.signal })).into_response()
    }
}

impl From<ProcessError> for AppError {
    fn from(err: ProcessError) -> Self {
        match &err {
            ProcessError::Store(_) => {
                tracing::error!(error = %err, "processing hit a store error");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, err.signal())
            }
            _ => {
                tracing::info!(error = %err, "processing request rejected");
                AppError::new(StatusCode::BAD_REQUEST, err.signal())
            }
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match &err {
            UploadError::Store(_) => {
                tracing::error!(error = %err, "upload hit a store error");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, err.signal())
            }
            UploadError::WriteFailed(_) => {
                tracing::error!(error = %err, "error while uploading file");
                AppError::new(StatusCode::BAD_REQUEST, err.signal())
            }
            _ => {
                tracing::info!(error = %err, "upload rejected");
                AppError::new(StatusCode::BAD_REQUEST, err.signal())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::info!(error = %rejection.body_text(), "rejected request body");
        AppError::new(StatusCode::BAD_REQUEST, ResponseSignal::InvalidRequest)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::info!(error = %rejection.body_text(), "rejected query string");
        AppError::new(StatusCode::BAD_REQUEST, ResponseSignal::InvalidRequest)
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "store error");
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, ResponseSignal::InternalError)
}

// ============ GET / and /health ============

#[derive(Serialize)]
struct WelcomeResponse {
    app_name: String,
    app_version: String,
}

async fn handle_welcome(State(state): State<AppState>) -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        app_name: state.config.app.name.clone(),
        app_version: state.config.app.version.clone(),
    })
}

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

// ============ POST /data/upload/{project_id} ============

#[derive(Serialize)]
struct UploadResponse {
    signal: ResponseSignal,
    /// Stored file name; pass this as `file_id` when processing.
    file_id: String,
    asset_id: String,
    /// Internal project identifier.
    project_id: String,
}

#[async_trait]
impl<'a> UploadSource for Field<'a> {
    async fn next_piece(&mut self) -> Result<Option<Bytes>, UploadError> {
        self.chunk()
            .await
            .map_err(|e| UploadError::Malformed(e.to_string()))
    }
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart =
        multipart.map_err(|e| AppError::from(UploadError::Malformed(e.body_text())))?;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::from(UploadError::Malformed(e.to_string())))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("file").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let result = save_upload(
            state.store(),
            &state.config.files,
            &project_id,
            &file_name,
            &content_type,
            &mut field,
        )
        .await;
        if result.is_err() {
            // Consume the rest of the body so the client reads the response.
            while let Ok(Some(_)) = field.chunk().await {}
        }
        let outcome = result?;

        return Ok(Json(UploadResponse {
            signal: ResponseSignal::FileUploadSuccess,
            file_id: outcome.asset.name,
            asset_id: outcome.asset.id,
            project_id: outcome.project.id,
        }));
    }

    Err(UploadError::Malformed("missing multipart field `file`".to_string()).into())
}

// ============ POST /data/process/{project_id} ============

/// Body of a process request. Window sizes default to `[chunking]`.
#[derive(Debug, Deserialize)]
struct ProcessBody {
    #[serde(default)]
    file_id: Option<String>,
    #[serde(default)]
    chunk_size: Option<usize>,
    #[serde(default)]
    overlap_size: Option<usize>,
    /// `1` deletes the project's existing chunks first.
    #[serde(default, deserialize_with = "reset_flag")]
    do_reset: bool,
}

/// Accept exactly `0` or `1`.
fn reset_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match u64::deserialize(deserializer)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(de::Error::invalid_value(
            Unexpected::Unsigned(other),
            &"0 or 1",
        )),
    }
}

#[derive(Serialize)]
struct ProcessResponse {
    signal: ResponseSignal,
    #[serde(flatten)]
    summary: ProcessSummary,
}

async fn handle_process(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    body: Result<Json<ProcessBody>, JsonRejection>,
) -> Result<Json<ProcessResponse>, AppError> {
    let Json(body) = body?;
    let defaults = &state.config.chunking;
    let request = ProcessRequest {
        file_id: body.file_id,
        chunk_size: body.chunk_size.unwrap_or(defaults.chunk_size),
        overlap_size: body.overlap_size.unwrap_or(defaults.overlap_size),
        do_reset: body.do_reset,
    };

    let summary = state.processor.process_project(&project_id, &request).await?;

    Ok(Json(ProcessResponse {
        signal: ResponseSignal::ProcessingSuccess,
        summary,
    }))
}

// ============ GET /data/chunks/{chunk_id} ============

async fn handle_get_chunk(
    State(state): State<AppState>,
    Path(chunk_id): Path<String>,
) -> Result<Json<ChunkRecord>, AppError> {
    state
        .store()
        .get_by_id(&chunk_id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, ResponseSignal::ChunkNotFound))
}

// ============ GET /data/projects ============

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: u64,
    #[serde(default = "default_page_size")]
    page_size: u64,
}

fn default_page() -> u64 {
    1
}
fn default_page_size() -> u64 {
    10
}

const MAX_PAGE_SIZE: u64 = 100;

async fn handle_list_projects(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<ProjectPage>, AppError> {
    let Query(query) = query?;
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);
    state
        .store()
        .list_projects(page, page_size)
        .await
        .map(Json)
        .map_err(internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> serde_json::Result<ProcessBody> {
        serde_json::from_str(body)
    }

    #[test]
    fn test_process_body_defaults() {
        let body = parse("{}").unwrap();
        assert!(body.file_id.is_none());
        assert!(body.chunk_size.is_none());
        assert!(!body.do_reset);
    }

    #[test]
    fn test_reset_flag_accepts_only_zero_or_one() {
        assert!(!parse(r#"{"do_reset": 0}"#).unwrap().do_reset);
        assert!(parse(r#"{"do_reset": 1}"#).unwrap().do_reset);
        assert!(parse(r#"{"do_reset": 2}"#).is_err());
        assert!(parse(r#"{"do_reset": true}"#).is_err());
        assert!(parse(r#"{"do_reset": -1}"#).is_err());
    }

    #[test]
    fn test_negative_chunk_size_rejected() {
        assert!(parse(r#"{"chunk_size": -5}"#).is_err());
    }

    #[tokio::test]
    async fn test_body_rejection_carries_signal() {
        let err = AppError::new(StatusCode::BAD_REQUEST, ResponseSignal::InvalidRequest);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["signal"], "invalid_request");
    }
}
