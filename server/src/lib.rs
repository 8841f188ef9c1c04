use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use spimi_core::config::DEFAULT_PAGE_SIZE;
use spimi_core::persist::{load_meta, IndexPaths};
use spimi_core::registry::RegistryReader;
use spimi_core::search::{Hit, QueryEngine, ScoringMode};
use spimi_core::DocId;
use std::path::PathBuf;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Upper bound on `size` so one request cannot resolve the whole registry.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    /// 1-based page number.
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default)]
    pub exclude_probe: bool,
}
fn default_page() -> usize { 1 }
fn default_size() -> usize { DEFAULT_PAGE_SIZE }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub page: usize,
    pub size: usize,
    pub missing_terms: Vec<String>,
    pub results: Vec<Hit>,
}

#[derive(Clone)]
pub struct AppState {
    pub index_root: PathBuf,
}

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub fn build_app(index_dir: String) -> Result<Router> {
    // Refuse to start without a merged index.
    let paths = IndexPaths::new(&index_dir);
    let meta = load_meta(&paths)?;
    tracing::info!(index = %index_dir, num_docs = meta.num_docs, num_terms = meta.num_terms, "index loaded");
    let app_state = AppState { index_root: PathBuf::from(&index_dir) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    if params.page == 0 || params.size == 0 {
        return Err((StatusCode::BAD_REQUEST, "page and size start at 1".into()));
    }
    let size = params.size.min(MAX_PAGE_SIZE);
    let mode = if params.exclude_probe { ScoringMode::ExcludeProbe } else { ScoringMode::IncludeProbe };

    let engine = QueryEngine::new(IndexPaths::new(&state.index_root));
    let outcome = engine.search(&params.q, mode).map_err(internal)?;
    let total_hits = outcome.results.total();

    let mut pager = engine.paginate(outcome.results, size).map_err(internal)?;
    pager.skip_pages(params.page - 1);
    let results = pager
        .next_page()
        .map_err(internal)?
        .map(|p| p.hits)
        .unwrap_or_default();

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse {
        query: params.q,
        took_s: elapsed.as_secs_f64(),
        total_hits,
        page: params.page,
        size,
        missing_terms: outcome.missing,
        results,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Bounded by the registry on disk, not the meta read at startup.
    let paths = IndexPaths::new(&state.index_root);
    let mut registry = RegistryReader::open(paths.registry()).map_err(internal)?;
    match registry.url(doc_id).map_err(internal)? {
        Some(url) => Ok(Json(serde_json::json!({ "doc_id": doc_id, "url": url }))),
        None => Err((StatusCode::NOT_FOUND, "not found".into())),
    }
}
