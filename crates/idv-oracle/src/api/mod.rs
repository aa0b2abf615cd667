//! API module for the development oracle

pub mod error;
pub mod handlers;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use error::ApiError;
use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub active_sessions: usize,
    pub session_ttl_secs: i64,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Readiness check endpoint
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> Result<Json<ReadyResponse>, ApiError> {
    Ok(Json(ReadyResponse {
        ready: true,
        active_sessions: state.store.count().await?,
        session_ttl_secs: state.config.session_ttl.num_seconds(),
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // The flow runs in a browser page on another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/v1/sessions", post(handlers::create_session))
        .route("/v1/sessions/verify", post(handlers::verify_session))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
