//! Agendo API: class scheduling, attendance, student plans and academy
//! billing for tennis and padel academies.

pub mod attendance;
pub mod audit;
pub mod billing;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod plans;
pub mod scheduling;
pub mod selection;

use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::cache::{AppCache, CacheStats};
use crate::config::Config;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub cache: AppCache,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            cache: AppCache::new(),
            config: Arc::new(config),
        }
    }
}

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(selection::OPERATOR_HEADER),
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/api/admin/cache/stats", get(cache_stats))
        .route("/api/admin/cache/invalidate", post(invalidate_cache))
        .merge(selection::router())
        .merge(scheduling::router())
        .merge(attendance::router())
        .merge(plans::router())
        .merge(billing::router())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn cache_stats(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<CacheStats> {
    Json(state.cache.stats())
}

async fn invalidate_cache(
    axum::extract::State(state): axum::extract::State<AppState>,
    _operator: selection::Operator,
) -> Json<Value> {
    state.cache.invalidate_billing();
    Json(json!({ "invalidated": true }))
}
