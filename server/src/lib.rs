use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use pulse_core::{RecordStore, SentimentCounts, SharedTrends, SinkError, StoredRecord, TopTerm, WindowStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;

#[derive(Deserialize)]
pub struct TrendingParams {
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct TrendingResponse {
    pub k: usize,
    pub window: WindowStats,
    pub terms: Vec<TopTerm>,
}

#[derive(Serialize)]
pub struct SentimentResponse {
    pub total: u64,
    #[serde(flatten)]
    pub counts: SentimentCounts,
}

/// Read-only views over a running (or finished) pipeline.
#[derive(Clone)]
pub struct AppState {
    pub trends: SharedTrends,
    pub store: Arc<dyn RecordStore>,
    pub default_k: usize,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

fn store_error(err: SinkError) -> ApiError {
    tracing::warn!(error = %err, "store query failed");
    api_error(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/trending", get(trending_handler))
        .route("/records/:id", get(record_handler))
        .route("/sentiment", get(sentiment_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn trending_handler(State(state): State<AppState>, Query(params): Query<TrendingParams>) -> Json<TrendingResponse> {
    let k = params.k.unwrap_or(state.default_k).clamp(1, MAX_K);
    let terms = state.trends.top_terms(k);
    Json(TrendingResponse { k, window: state.trends.stats(), terms })
}

/// Store reads may scan the whole tree; keep them off the async workers.
async fn query_store<T, F>(state: &AppState, query: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn RecordStore) -> Result<T, SinkError> + Send + 'static,
{
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || query(store.as_ref())).await {
        Ok(result) => result.map_err(store_error),
        Err(join) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, join.to_string())),
    }
}

pub async fn record_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<StoredRecord>, ApiError> {
    let key = id.clone();
    match query_store(&state, move |store| store.get(&key)).await? {
        Some(row) => Ok(Json(row)),
        None => Err(api_error(StatusCode::NOT_FOUND, format!("record {id} not found"))),
    }
}

pub async fn sentiment_handler(State(state): State<AppState>) -> Result<Json<SentimentResponse>, ApiError> {
    let counts = query_store(&state, |store| store.sentiment_counts()).await?;
    Ok(Json(SentimentResponse { total: counts.total(), counts }))
}
