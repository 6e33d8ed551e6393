//! HTTP surface for the embedding host.
//!
//! - GET  /v1/user-config
//! - GET  /v1/app-config     (user config + app config)
//! - GET  /v1/user-info
//! - POST /v1/lottery
//! - GET  /v1/prizes
//! - POST /v1/messages       (inbound host message)
//! - GET  /v1/updates        (SSE listener)
//! - GET/PUT/DELETE /v1/cache/{key}
//! - GET  /health
//! - GET  /v1/cache/stats

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::client::{BaseData, SdkClient};
use crate::api::filter::FetchError;
use crate::cache::entry::{Expires, Tier};
use crate::cache::store::{CacheError, SharedStore};
use crate::overlay::{HostMessage, MergeOutcome, UpdateHub};
use crate::server::streaming::updates_to_sse_stream;

/// Application state shared across handlers.
pub struct AppState {
    pub client: SdkClient,
    pub hub: UpdateHub,
    pub store: SharedStore,
    pub start_time: Instant,
}

/// Build the axum router with all host routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/user-config", get(user_config))
        .route("/v1/app-config", get(app_config))
        .route("/v1/user-info", get(user_info))
        .route("/v1/lottery", post(lottery))
        .route("/v1/prizes", get(prizes))
        .route("/v1/messages", post(post_message))
        .route("/v1/updates", get(updates))
        .route(
            "/v1/cache/{key}",
            get(read_entry).put(write_entry).delete(remove_entry),
        )
        .route("/health", get(health))
        .route("/v1/cache/stats", get(cache_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ─── Response Types ────────────────────────────────────────────────────────

/// Body of `PUT /v1/cache/{key}`.
///
/// `expires` goes through the permissive conversion: a number is seconds,
/// an RFC 3339 string is an instant and anything else never expires.
#[derive(Debug, Deserialize)]
pub struct CacheWrite {
    pub value: Value,
    #[serde(default)]
    pub expires: Expires,
}

#[derive(Debug, Serialize)]
pub struct CacheEntryResponse {
    pub key: String,
    pub value: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub request_id: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub listeners: usize,
    pub cache: CacheStatsResponse,
}

/// Cache statistics response.
#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub keys: usize,
    pub tiers: Vec<TierStatsResponse>,
}

#[derive(Debug, Serialize)]
pub struct TierStatsResponse {
    pub name: String,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub writes: u64,
    pub removals: u64,
    pub hit_ratio: f64,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn error_response(status: StatusCode, message: String) -> (StatusCode, Json<ErrorResponse>) {
    let request_id = Uuid::new_v4().to_string();
    warn!(request_id = %request_id, status = status.as_u16(), error = %message, "Request failed");
    (
        status,
        Json(ErrorResponse {
            error: message,
            request_id,
        }),
    )
}

fn fetch_error(e: FetchError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        FetchError::Network(_) => StatusCode::BAD_GATEWAY,
        FetchError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

fn cache_error(e: CacheError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        CacheError::UnknownKey(_) => StatusCode::NOT_FOUND,
        CacheError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

fn params_to_json(params: HashMap<String, String>) -> Value {
    Value::Object(
        params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    )
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn user_config(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Value> {
    state
        .client
        .user_config(params_to_json(params))
        .await
        .map(Json)
        .map_err(fetch_error)
}

async fn app_config(State(state): State<Arc<AppState>>) -> ApiResult<BaseData> {
    state.client.base_data().await.map(Json).map_err(fetch_error)
}

async fn user_info(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Value> {
    state
        .client
        .user_info(params_to_json(params))
        .await
        .map(Json)
        .map_err(fetch_error)
}

async fn lottery(
    State(state): State<Arc<AppState>>,
    Json(data): Json<Value>,
) -> ApiResult<Value> {
    info!("Lottery draw requested");
    state.client.lottery(data).await.map(Json).map_err(fetch_error)
}

async fn prizes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Value> {
    state
        .client
        .prize_list(params_to_json(params))
        .await
        .map(Json)
        .map_err(fetch_error)
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<HostMessage>,
) -> ApiResult<MergeOutcome> {
    info!(kind = %message.kind, page_key = ?message.page_key, "Host message received");
    state.hub.dispatch(message).await.map(Json).map_err(cache_error)
}

async fn updates(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rx = state.hub.subscribe();
    info!(listeners = state.hub.listener_count(), "Update listener registered");
    Sse::new(updates_to_sse_stream(rx, state.hub.closed())).keep_alive(KeepAlive::default())
}

async fn read_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<CacheEntryResponse> {
    let value = state.store.lock().await.get(&key).map_err(cache_error)?;
    Ok(Json(CacheEntryResponse { key, value }))
}

async fn write_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(write): Json<CacheWrite>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .lock()
        .await
        .set(&key, write.value, write.expires)
        .map_err(cache_error)?;
    info!(key = %key, expires = ?write.expires, "Cache entry written by host");
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state.store.lock().await.remove(&key).map_err(cache_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn collect_stats(state: &AppState) -> Result<CacheStatsResponse, CacheError> {
    let store = state.store.lock().await;
    let mut tiers = Vec::with_capacity(Tier::ALL.len());
    for tier in Tier::ALL {
        let stats = store.tier_stats().get(&tier).cloned().unwrap_or_default();
        tiers.push(TierStatsResponse {
            name: tier.to_string(),
            entries: store.entry_count(tier)?,
            hits: stats.hits,
            misses: stats.misses,
            expired: stats.expired,
            writes: stats.writes,
            removals: stats.removals,
            hit_ratio: stats.hit_ratio(),
        });
    }

    Ok(CacheStatsResponse {
        keys: store.keys().len(),
        tiers,
    })
}

async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let cache = collect_stats(&state).await.map_err(cache_error)?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        listeners: state.hub.listener_count(),
        cache,
    }))
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> ApiResult<CacheStatsResponse> {
    collect_stats(&state).await.map(Json).map_err(cache_error)
}
