//! PDF backends: pdfium for everything, poppler's `pdftoppm` as a raster
//! fallback.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! Every pdfium entry point in this module is a plain blocking function; the
//! async wrappers in [`crate::extract`] move them onto the blocking pool.
//!
//! ## Binding
//!
//! pdfium is a shared library loaded at runtime. [`bind_pdfium`] looks at
//! `PDFIUM_LIB_PATH` first (a directory holding the platform library, or the
//! library file itself), then the system loader path, then the working
//! directory. Nothing here panics when the library is missing; callers get a
//! `PdfiumError` and degrade.
//!
//! ## Sizing
//!
//! Pages are rendered at 2× scale for crisp text and then downscaled with
//! Lanczos3 so the longest edge fits `max_image_dim`. Capping pixels instead
//! of DPI keeps memory bounded for oversized pages.

use crate::output::DocumentMetadata;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment variable naming the pdfium library location.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Render scale applied by the pdfium backend.
const PDFIUM_SCALE: f32 = 2.0;

/// Resolution used by the `pdftoppm` fallback.
const PDFTOPPM_DPI: u32 = 200;

/// Bind to the pdfium shared library.
pub fn bind_pdfium() -> Result<Pdfium, PdfiumError> {
    if let Ok(configured) = std::env::var(PDFIUM_LIB_ENV) {
        let configured = PathBuf::from(configured);
        let lib = if configured.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&configured)
        } else {
            configured
        };
        debug!("Binding pdfium from {}", lib.display());
        return Pdfium::bind_to_library(&lib).map(Pdfium::new);
    }

    Pdfium::bind_to_system_library()
        .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")))
        .map(Pdfium::new)
}

/// Scale `(width, height)` down so the longest edge is at most `max_dim`,
/// preserving aspect ratio. Images already within bounds are unchanged.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let max_dim = max_dim.max(1);
    let longest = width.max(height);
    if longest <= max_dim || longest == 0 {
        return (width, height);
    }
    let ratio = max_dim as f64 / longest as f64;
    let scale = |v: u32| ((v as f64 * ratio).round() as u32).clamp(1, max_dim);
    (scale(width), scale(height))
}

/// Resolve a page request against a document of `total` pages.
///
/// `None` means every page. Requested numbers are 1-based; out-of-range and
/// duplicate entries are dropped and the result is ascending.
pub fn select_pages(requested: Option<&[usize]>, total: usize) -> Vec<usize> {
    match requested {
        None => (1..=total).collect(),
        Some(pages) => {
            let mut selected: Vec<usize> = pages
                .iter()
                .copied()
                .filter(|&p| {
                    let ok = (1..=total).contains(&p);
                    if !ok {
                        debug!("Skipping page {} (out of range, total={})", p, total);
                    }
                    ok
                })
                .collect();
            selected.sort_unstable();
            selected.dedup();
            selected
        }
    }
}

/// File name used for a rasterised page.
pub fn page_file_name(page_num: usize) -> String {
    format!("page_{page_num}.png")
}

/// Downscale `img` to fit `max_dim` and write it as PNG.
pub fn save_scaled(img: &DynamicImage, max_dim: u32, path: &Path) -> Result<(), image::ImageError> {
    let (w, h) = fit_within(img.width(), img.height(), max_dim);
    if (w, h) == (img.width(), img.height()) {
        img.save_with_format(path, ImageFormat::Png)
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3)
            .save_with_format(path, ImageFormat::Png)
    }
}

// ── pdfium backend (blocking) ────────────────────────────────────────────────

fn open<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, PdfiumError> {
    pdfium.load_pdf_from_file(path, None)
}

pub fn page_count_blocking(path: &Path) -> Result<usize, PdfiumError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, path)?;
    Ok(document.pages().len() as usize)
}

pub fn metadata_blocking(path: &Path) -> Result<DocumentMetadata, PdfiumError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, path)?;
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> String {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .unwrap_or_default()
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        error: None,
    })
}

pub fn text_blocking(
    path: &Path,
    pages: Option<&[usize]>,
) -> Result<BTreeMap<usize, String>, PdfiumError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, path)?;
    let doc_pages = document.pages();
    let total = doc_pages.len() as usize;

    let mut out = BTreeMap::new();
    for page_num in select_pages(pages, total) {
        let text = match doc_pages.get((page_num - 1) as u16) {
            Ok(page) => match page.text() {
                Ok(t) => t.all(),
                Err(e) => {
                    warn!("No text layer on page {}: {:?}", page_num, e);
                    String::new()
                }
            },
            Err(e) => {
                warn!("Failed to load page {}: {:?}", page_num, e);
                String::new()
            }
        };
        out.insert(page_num, text);
    }
    Ok(out)
}

/// Render pages with pdfium. Fails only when the document cannot be opened;
/// individual page failures are logged and skipped.
pub fn rasterize_pdfium_blocking(
    path: &Path,
    output_dir: &Path,
    pages: Option<&[usize]>,
    max_dim: u32,
) -> Result<Vec<PathBuf>, PdfiumError> {
    let pdfium = bind_pdfium()?;
    let document = open(&pdfium, path)?;
    let doc_pages = document.pages();
    let total = doc_pages.len() as usize;
    info!("PDF loaded: {} pages", total);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(PDFIUM_SCALE);
    let mut written = Vec::new();

    for page_num in select_pages(pages, total) {
        let page = match doc_pages.get((page_num - 1) as u16) {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to load page {}: {:?}", page_num, e);
                continue;
            }
        };
        let image = match page.render_with_config(&render_config) {
            Ok(bitmap) => bitmap.as_image(),
            Err(e) => {
                warn!("Failed to render page {}: {:?}", page_num, e);
                continue;
            }
        };

        let target = output_dir.join(page_file_name(page_num));
        match save_scaled(&image, max_dim, &target) {
            Ok(()) => {
                debug!(
                    "Rendered page {} → {}x{} px → {}",
                    page_num,
                    image.width(),
                    image.height(),
                    target.display()
                );
                written.push(target);
            }
            Err(e) => warn!("Failed to save page {}: {}", page_num, e),
        }
    }

    Ok(written)
}

// ── pdftoppm backend ─────────────────────────────────────────────────────────

/// Render pages with poppler's `pdftoppm`, one process per page.
///
/// Needs the page count to resolve `pages = None`; pass 0 when unknown and
/// only explicit page lists will be rendered.
pub async fn rasterize_pdftoppm(
    path: &Path,
    output_dir: &Path,
    pages: Option<&[usize]>,
    total: usize,
    max_dim: u32,
) -> Vec<PathBuf> {
    if which::which("pdftoppm").is_err() {
        warn!("pdftoppm not found on PATH (install poppler-utils)");
        return Vec::new();
    }

    let selected = match pages {
        Some(p) if total == 0 => {
            let mut p = p.iter().copied().filter(|&n| n >= 1).collect::<Vec<_>>();
            p.sort_unstable();
            p.dedup();
            p
        }
        _ => select_pages(pages, total),
    };

    let mut written = Vec::new();
    for page_num in selected {
        let prefix = output_dir.join(format!("page_{page_num}"));
        let page_str = page_num.to_string();
        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &PDFTOPPM_DPI.to_string()])
            .args(["-f", &page_str, "-l", &page_str, "-singlefile"])
            .arg(path)
            .arg(&prefix)
            .status()
            .await;

        match status {
            Ok(s) if s.success() => {}
            Ok(s) => {
                warn!("pdftoppm failed on page {} ({})", page_num, s);
                continue;
            }
            Err(e) => {
                warn!("pdftoppm could not be started: {}", e);
                break;
            }
        }

        let target = prefix.with_extension("png");
        let resized = {
            let target = target.clone();
            tokio::task::spawn_blocking(move || {
                image::open(&target).and_then(|img| save_scaled(&img, max_dim, &target))
            })
            .await
        };
        match resized {
            Ok(Ok(())) => written.push(target),
            Ok(Err(e)) => warn!("Failed to resize page {}: {}", page_num, e),
            Err(e) => warn!("Resize task for page {} panicked: {}", page_num, e),
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn fit_within_keeps_small_images() {
        assert_eq!(fit_within(800, 600, 1000), (800, 600));
        assert_eq!(fit_within(1000, 1000, 1000), (1000, 1000));
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        // US Letter at 2× scale: 1224 × 1584
        let (w, h) = fit_within(1224, 1584, 1000);
        assert_eq!(h, 1000);
        assert_eq!(w, 773);
        let (w, h) = fit_within(3000, 1000, 1000);
        assert_eq!((w, h), (1000, 333));
    }

    #[test]
    fn fit_within_never_collapses_to_zero() {
        let (w, h) = fit_within(10_000, 1, 1000);
        assert_eq!(w, 1000);
        assert_eq!(h, 1);
    }

    #[test]
    fn fit_within_treats_zero_cap_as_one_pixel() {
        assert_eq!(fit_within(800, 600, 0), (1, 1));
    }

    #[test]
    fn select_pages_all_and_filtered() {
        assert_eq!(select_pages(None, 3), vec![1, 2, 3]);
        assert_eq!(select_pages(Some(&[3, 0, 7, 1, 3]), 3), vec![1, 3]);
        assert!(select_pages(Some(&[1, 2]), 0).is_empty());
    }

    #[test]
    fn save_scaled_caps_longest_edge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(page_file_name(1));
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2400, 1200, Rgba([0, 0, 0, 255])));
        save_scaled(&img, 1000, &path).unwrap();

        let back = image::open(&path).unwrap();
        assert_eq!((back.width(), back.height()), (1000, 500));
    }

    #[test]
    fn page_file_names() {
        assert_eq!(page_file_name(12), "page_12.png");
    }
}
