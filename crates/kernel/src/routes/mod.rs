//! HTTP route handlers.

pub mod health;
pub mod resource;

use std::path::Path;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::{authenticate_bearer_token, enforce_rate_limit};
use crate::state::AppState;

/// Build the application router.
///
/// When `uploads_dir` is given its files are served under the state's
/// files URL.
pub fn app(state: AppState, uploads_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .merge(health::router())
        .merge(resource::router());

    if let Some(dir) = uploads_dir {
        router = router.nest_service(state.files_url(), ServeDir::new(dir));
    }

    // Last added = first executed: trace → rate limit → bearer auth → routes
    router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authenticate_bearer_token,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
