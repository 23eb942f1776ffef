//! Health check endpoint.
//!
//! Returns 200 OK when the record store is reachable, 503 otherwise. The
//! rate limit backend fails open, so an unreachable one only degrades the
//! reported status.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: bool,
    store_backend: &'static str,
    rate_limiter: bool,
    rate_limiter_backend: &'static str,
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (store, rate_limiter) = tokio::join!(state.store_healthy(), state.rate_limiter_healthy());

    let (status_code, status) = match (store, rate_limiter) {
        (true, true) => (StatusCode::OK, "healthy"),
        (true, false) => (StatusCode::OK, "degraded"),
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            store,
            store_backend: state.resources().store().backend(),
            rate_limiter,
            rate_limiter_backend: state.rate_limiter().backend_name(),
        }),
    )
}

/// Create the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
