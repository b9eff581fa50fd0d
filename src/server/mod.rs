//! HTTP API for uploading papers and following their analysis.
//!
//! Every error is a JSON body `{"detail": "..."}` with the status code chosen
//! by [`ApiError`].

mod handlers;
mod routes;

pub use routes::create_router;

use crate::config::AppConfig;
use crate::error::{PaperError, TaskError};
use crate::extract::PdfiumExtractor;
use crate::gateway::build_gateway;
use crate::note::NoteRenderer;
use crate::task::{MemoryTaskStore, TaskCoordinator};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TaskCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<TaskCoordinator>) -> Self {
        Self { coordinator }
    }

    /// State wired to the production extractor, gateway and renderer.
    pub fn from_config(config: AppConfig) -> Result<Self, PaperError> {
        let gateway = build_gateway(&config)?;
        let extractor = Arc::new(PdfiumExtractor::new(config.max_image_dim));
        let renderer = NoteRenderer::from_config(&config);
        let coordinator = TaskCoordinator::new(
            Arc::new(config),
            Arc::new(MemoryTaskStore::new()),
            extractor,
            gateway,
            renderer,
        );
        Ok(Self::new(Arc::new(coordinator)))
    }

    pub fn config(&self) -> &AppConfig {
        self.coordinator.config()
    }
}

/// Start the web server.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), PaperError> {
    state.config().ensure_dirs().await?;
    let app = create_router(state);

    tracing::info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PaperError::Internal(format!("bind {addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| PaperError::Internal(format!("server: {e}")))
}

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> &str {
        match self {
            ApiError::BadRequest(d)
            | ApiError::NotFound(d)
            | ApiError::Conflict(d)
            | ApiError::PayloadTooLarge(d)
            | ApiError::Internal(d) => d,
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::NotFound(_) => ApiError::NotFound("Task not found".to_string()),
            TaskError::InvalidState { .. } => ApiError::BadRequest(e.to_string()),
            TaskError::AlreadyRunning(_) | TaskError::NotRunning { .. } => {
                ApiError::Conflict(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self.detail());
        }
        (status, Json(serde_json::json!({ "detail": self.detail() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_errors_map_to_status_codes() {
        let cases = [
            (TaskError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                TaskError::InvalidState {
                    task_id: "x".into(),
                    status: "processing".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (TaskError::AlreadyRunning("x".into()), StatusCode::CONFLICT),
            (
                TaskError::NotRunning {
                    task_id: "x".into(),
                    status: "completed".into(),
                },
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn not_found_detail_is_generic() {
        let e = ApiError::from(TaskError::NotFound("abc".into()));
        assert_eq!(e.detail(), "Task not found");
    }
}
