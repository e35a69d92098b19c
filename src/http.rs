//! Thin Axum routes mirroring the MCP tool surface (SPEC_FULL.md §6). Each
//! handler parses query/body params, calls straight into the [`Engine`], and
//! maps [`EngineError`] to a status code and JSON body — no business logic
//! lives here, matching this codebase's own handler style.

use crate::engine::Engine;
use crate::error::{EngineError, ErrorKind};
use crate::query::parse_file_types;
use crate::types::QueryFilters;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/api/health", get(api_health))
        .route("/api/search", get(api_search))
        .route("/api/preview", get(api_preview))
        .route("/api/status", get(api_status))
        .route("/api/scan", post(api_scan))
        .route("/api/quick_search", get(api_quick_search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

fn error_response(e: EngineError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match e.kind() {
        ErrorKind::NotIndexed => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::BackendUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::BackendProtocol => StatusCode::BAD_GATEWAY,
        ErrorKind::IndexCorrupt => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(serde_json::json!({ "error": e.kind().as_str(), "message": e.to_string() })))
}

pub async fn api_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    query: String,
    top_k: Option<usize>,
    file_types: Option<String>,
    directory: Option<String>,
    #[serde(default)]
    git_only: bool,
    min_relevance: Option<f32>,
}

pub async fn api_search(State(engine): State<Arc<Engine>>, Query(q): Query<SearchQuery>) -> impl IntoResponse {
    let file_types = match q.file_types {
        Some(raw) => match parse_file_types(&raw.split(',').map(String::from).collect::<Vec<_>>()) {
            Ok(types) => Some(types),
            Err(e) => return error_response(e).into_response(),
        },
        None => None,
    };
    let filters = QueryFilters { file_types, directory: q.directory, git_only: q.git_only, recent_days: None };

    match engine.search(&q.query, q.top_k.unwrap_or(10), filters, q.min_relevance.unwrap_or(0.0)).await {
        Ok(results) => Json(results).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    path: String,
    line_start: Option<usize>,
    line_end: Option<usize>,
}

pub async fn api_preview(State(engine): State<Arc<Engine>>, Query(q): Query<PreviewQuery>) -> impl IntoResponse {
    match engine.preview(&PathBuf::from(q.path), q.line_start, q.line_end) {
        Ok(content) => Json(serde_json::json!({ "content": content })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn api_status(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    match engine.status() {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize, Default)]
pub struct ScanBody {
    roots: Option<Vec<PathBuf>>,
    #[serde(default)]
    force_rebuild: bool,
}

pub async fn api_scan(State(engine): State<Arc<Engine>>, body: Option<Json<ScanBody>>) -> impl IntoResponse {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    match engine.scan(body.roots, body.force_rebuild).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
pub struct QuickSearchQuery {
    query: String,
    top_k: Option<usize>,
    file_types: Option<String>,
    directory: Option<String>,
    #[serde(default)]
    git_only: bool,
}

pub async fn api_quick_search(State(engine): State<Arc<Engine>>, Query(q): Query<QuickSearchQuery>) -> impl IntoResponse {
    let file_types = match q.file_types {
        Some(raw) => match parse_file_types(&raw.split(',').map(String::from).collect::<Vec<_>>()) {
            Ok(types) => Some(types),
            Err(e) => return error_response(e).into_response(),
        },
        None => None,
    };
    let filters = QueryFilters { file_types, directory: q.directory, git_only: q.git_only, recent_days: None };
    let results = engine.quick_search(&q.query, q.top_k.unwrap_or(10), filters);
    Json(results).into_response()
}
