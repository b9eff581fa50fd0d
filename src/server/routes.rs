//! Router configuration for the web server.

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Multipart framing on top of the file itself.
const BODY_SLACK: usize = 1024 * 1024;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config().max_file_size.saturating_add(BODY_SLACK);

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        // Upload and run
        .route("/upload", post(handlers::upload))
        .route("/analyze", post(handlers::analyze))
        .route("/cancel/:task_id", post(handlers::cancel))
        // Polling
        .route("/status/:task_id", get(handlers::status))
        .route("/result/:task_id", get(handlers::result))
        // Artifacts
        .route("/download/:kind/:task_id", get(handlers::download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
