//! Image encoding: page PNG on disk → base64.
//!
//! DashScope takes a `data:` URL inline in its JSON body; the OpenAI gateway
//! hands edgequake-llm an `ImageData`. Pages are already PNG on disk, so
//! encoding is a read plus base64; no re-compression.

use crate::error::ModelError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// Read an image and wrap it as `data:image/png;base64,…`.
pub async fn encode_image_file(path: &Path) -> Result<String, ModelError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| ModelError::Image {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let url = to_data_url(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), url.len());
    Ok(url)
}

/// Read a page PNG into an `ImageData` attachment for edgequake-llm.
///
/// `detail: "high"` keeps fine print and small tables legible to
/// GPT-4-class models.
pub async fn encode_image_data(path: &Path) -> Result<ImageData, ModelError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| ModelError::Image {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Base64-encode PNG bytes as a data URL.
pub fn to_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}
