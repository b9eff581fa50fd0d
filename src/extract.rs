//! PDF decomposition: page count, metadata, text and page rasters.
//!
//! [`PdfExtractor`] is the seam the rest of the crate depends on. The
//! production implementation, [`PdfiumExtractor`], runs every pdfium call on
//! the blocking pool and never returns an error: failures degrade to zero,
//! empty or default values and are logged.
//!
//! When libpdfium cannot be bound, poppler takes over: `pdfinfo` for the page
//! count and `pdftoppm` for rasters. Text and descriptive metadata stay empty.

use crate::output::DocumentMetadata;
use crate::pipeline::render;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything the analysis pipeline needs from a PDF.
#[async_trait]
pub trait PdfExtractor: Send + Sync {
    /// Number of pages, or 0 when the document cannot be read.
    async fn page_count(&self, path: &Path) -> usize;

    /// Descriptive fields. On total failure returns
    /// [`DocumentMetadata::unreadable`].
    async fn metadata(&self, path: &Path) -> DocumentMetadata;

    /// Text per 1-based page number. `None` selects every page.
    async fn extract_text(&self, path: &Path, pages: Option<&[usize]>) -> BTreeMap<usize, String>;

    /// Write `page_{n}.png` files into `output_dir` and return their paths.
    async fn rasterize(
        &self,
        path: &Path,
        output_dir: &Path,
        pages: Option<&[usize]>,
    ) -> Vec<PathBuf>;

    /// Every page's text joined under `--- page N ---` headers.
    async fn full_text(&self, path: &Path) -> String {
        join_pages(&self.extract_text(path, None).await)
    }
}

/// Join page texts under `--- page N ---` headers.
pub fn join_pages(pages: &BTreeMap<usize, String>) -> String {
    pages
        .iter()
        .map(|(n, text)| format!("--- page {n} ---\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// pdfium-backed extractor with a `pdftoppm` raster fallback.
#[derive(Debug, Clone)]
pub struct PdfiumExtractor {
    max_image_dim: u32,
}

impl Default for PdfiumExtractor {
    fn default() -> Self {
        Self { max_image_dim: 1000 }
    }
}

impl PdfiumExtractor {
    pub fn new(max_image_dim: u32) -> Self {
        Self { max_image_dim }
    }

    pub fn max_image_dim(&self) -> u32 {
        self.max_image_dim
    }
}

/// Run a blocking pdfium call, flattening the join error into the
/// pdfium error message.
async fn blocking<T, F>(what: &'static str, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, pdfium_render::prelude::PdfiumError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(format!("{what}: {e:?}")),
        Err(e) => Err(format!("{what} task panicked: {e}")),
    }
}

#[async_trait]
impl PdfExtractor for PdfiumExtractor {
    async fn page_count(&self, path: &Path) -> usize {
        let p = path.to_path_buf();
        match blocking("page count", move || render::page_count_blocking(&p)).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Cannot read {} with pdfium: {}", path.display(), e);
                pdfinfo_pages(path).await.unwrap_or(0)
            }
        }
    }

    async fn metadata(&self, path: &Path) -> DocumentMetadata {
        let p = path.to_path_buf();
        match blocking("metadata", move || render::metadata_blocking(&p)).await {
            Ok(m) => m,
            Err(e) => {
                warn!("Metadata extraction failed for {}: {}", path.display(), e);
                let mut meta = DocumentMetadata::unreadable(e);
                if let Some(n) = pdfinfo_pages(path).await {
                    info!("pdfinfo reports {} pages for {}", n, path.display());
                    meta.page_count = n;
                }
                meta
            }
        }
    }

    async fn extract_text(&self, path: &Path, pages: Option<&[usize]>) -> BTreeMap<usize, String> {
        let p = path.to_path_buf();
        let pages = pages.map(<[usize]>::to_vec);
        match blocking("text", move || render::text_blocking(&p, pages.as_deref())).await {
            Ok(map) => map,
            Err(e) => {
                warn!("Text extraction failed for {}: {}", path.display(), e);
                BTreeMap::new()
            }
        }
    }

    async fn rasterize(
        &self,
        path: &Path,
        output_dir: &Path,
        pages: Option<&[usize]>,
    ) -> Vec<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            warn!("Cannot create {}: {}", output_dir.display(), e);
            return Vec::new();
        }

        let max_dim = self.max_image_dim;
        let (p, out) = (path.to_path_buf(), output_dir.to_path_buf());
        let owned = pages.map(<[usize]>::to_vec);
        let primary = blocking("pdfium render", move || {
            render::rasterize_pdfium_blocking(&p, &out, owned.as_deref(), max_dim)
        })
        .await;

        match primary {
            Ok(paths) => {
                info!("Rasterised {} pages with pdfium", paths.len());
                paths
            }
            Err(e) => {
                warn!("pdfium unavailable ({}), falling back to pdftoppm", e);
                // Without pdfium the page count is unknown; pdftoppm's own
                // range check handles explicit lists.
                let total = match pages {
                    Some(_) => 0,
                    None => pdfinfo_pages(path).await.unwrap_or(0),
                };
                let paths =
                    render::rasterize_pdftoppm(path, output_dir, pages, total, max_dim).await;
                if paths.is_empty() {
                    warn!("No pages rasterised for {}", path.display());
                } else {
                    info!("Rasterised {} pages with pdftoppm", paths.len());
                }
                paths
            }
        }
    }
}

/// Page count from poppler's `pdfinfo`, for the fallback path.
pub async fn pdfinfo_pages(path: &Path) -> Option<usize> {
    which::which("pdfinfo").ok()?;
    let out = tokio::process::Command::new("pdfinfo")
        .arg(path)
        .output()
        .await
        .ok()?;
    if !out.status.success() {
        return None;
    }
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .find_map(|l| l.strip_prefix("Pages:"))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_pages_headers() {
        let mut m = BTreeMap::new();
        m.insert(2, "second".to_string());
        m.insert(1, "first".to_string());
        assert_eq!(
            join_pages(&m),
            "--- page 1 ---\nfirst\n\n--- page 2 ---\nsecond"
        );
    }

    #[tokio::test]
    async fn missing_file_degrades_to_defaults() {
        let ex = PdfiumExtractor::default();
        let path = Path::new("/nonexistent/paper.pdf");
        assert_eq!(ex.page_count(path).await, 0);
        assert!(ex.extract_text(path, None).await.is_empty());

        let meta = ex.metadata(path).await;
        assert_eq!(meta.page_count, 0);
        assert!(meta.error.is_some());
        assert!(meta.title.is_empty());
    }

    #[tokio::test]
    async fn rasterize_unreadable_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.pdf");
        std::fs::write(&bogus, b"not a pdf").unwrap();

        let ex = PdfiumExtractor::new(500);
        let out = dir.path().join("pages");
        assert!(ex.rasterize(&bogus, &out, Some(&[1])).await.is_empty());
        assert!(out.is_dir());
    }
}
