//! Request handlers.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::config::Artifact;
use crate::output::TaskResult;
use crate::task::{Task, TaskCoordinator, TaskOptions};

/// Service description.
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "provider": state.config().provider.as_str(),
    }))
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub task_id: String,
    pub filename: String,
    pub file_size: usize,
    pub num_pages: usize,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("File too large".to_string())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

/// Store an uploaded PDF and register a pending task for it.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let config = state.config();

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if !filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(ApiError::BadRequest(
                "Only PDF files are supported".to_string(),
            ));
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes));
        break;
    }
    let Some((filename, bytes)) = upload else {
        return Err(ApiError::BadRequest("Missing 'file' field".to_string()));
    };

    if bytes.len() > config.max_file_size {
        return Err(ApiError::BadRequest(format!(
            "File too large ({} bytes, max {} bytes)",
            bytes.len(),
            config.max_file_size
        )));
    }

    let task_id = TaskCoordinator::new_task_id();
    let path = config.upload_path(&task_id);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to prepare upload dir: {e}")))?;
    }
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to store upload: {e}")))?;

    let num_pages = state.coordinator.extractor().page_count(&path).await;
    let rejection = if num_pages == 0 {
        Some("Unable to read the PDF or the file is empty".to_string())
    } else if num_pages > config.max_pages {
        Some(format!(
            "Too many pages ({num_pages}), at most {} are supported",
            config.max_pages
        ))
    } else {
        None
    };
    if let Some(detail) = rejection {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove rejected upload {}: {}", path.display(), e);
        }
        return Err(ApiError::BadRequest(detail));
    }

    let task_id = state.coordinator.create_with_id(task_id);
    info!(%task_id, %filename, num_pages, "Upload accepted");
    Ok(Json(UploadResponse {
        task_id,
        filename,
        file_size: bytes.len(),
        num_pages,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub task_id: String,
    #[serde(flatten)]
    pub options: TaskOptions,
}

#[derive(Debug, Serialize)]
pub struct TaskMessage {
    pub task_id: String,
    pub message: String,
}

/// Start the background run for an uploaded paper.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<TaskMessage>, ApiError> {
    let coordinator = &state.coordinator;
    coordinator.status(&request.task_id)?;

    let pdf_path = state.config().upload_path(&request.task_id);
    if !tokio::fs::try_exists(&pdf_path).await.unwrap_or(false) {
        return Err(ApiError::NotFound("PDF file not found".to_string()));
    }

    coordinator.start(&request.task_id, pdf_path, request.options)?;
    Ok(Json(TaskMessage {
        task_id: request.task_id,
        message: "analysis started".to_string(),
    }))
}

pub async fn status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.coordinator.status(&task_id)?))
}

pub async fn result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResult>, ApiError> {
    Ok(Json(state.coordinator.result(&task_id)?))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskMessage>, ApiError> {
    state.coordinator.cancel(&task_id)?;
    Ok(Json(TaskMessage {
        task_id,
        message: "cancellation requested".to_string(),
    }))
}

/// Serve one of a task's artifacts as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path((kind, task_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (artifact, label, ext) = match kind.as_str() {
        "article" => (Artifact::Article, "article", "md"),
        "note" => (Artifact::Note, "note", "md"),
        "image" => (Artifact::NoteImage, "note", "png"),
        _ => return Err(ApiError::NotFound(format!("Unknown artifact '{kind}'"))),
    };
    state.coordinator.status(&task_id)?;

    let path = state.config().artifact_path(&task_id, artifact);
    let content = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("{kind} file not found")))?;

    let disposition = format!("attachment; filename=\"{label}_{task_id}.{ext}\"");
    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}
