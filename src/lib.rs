//! # paperlens
//!
//! Analyse research-paper PDFs with multimodal LLMs and turn them into a
//! long-form article, a short social note and a rendered note image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract   page count, metadata, per-page text, page rasters (pdfium)
//!  ├─ 2. Analyse   one vision call per page, then key facts as JSON, then summary
//!  ├─ 3. Translate key facts field by field (optional)
//!  ├─ 4. Content   article + note (free text), structured note (JSON or fallback)
//!  └─ 5. Render    HTML template → PNG (wkhtmltoimage, then headless Chromium)
//! ```
//!
//! Runs are wrapped in tasks by [`TaskCoordinator`] and exposed over HTTP by
//! [`server`]. Every external dependency sits behind a trait
//! ([`PdfExtractor`], [`ModelGateway`], [`ScreenshotBackend`], [`TaskStore`])
//! so the whole flow can run against in-process fakes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paperlens::{
//!     build_gateway, AnalysisOptions, AppConfig, Language, NoopProgress,
//!     PaperAnalysisPipeline, PdfiumExtractor,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let pipeline = PaperAnalysisPipeline::new(
//!         Arc::new(PdfiumExtractor::new(config.max_image_dim)),
//!         build_gateway(&config)?,
//!     );
//!     let options = AnalysisOptions {
//!         translate: false,
//!         language: Language::English,
//!         page_image_dir: config.page_image_dir("demo"),
//!     };
//!     let result = pipeline
//!         .run("paper.pdf".as_ref(), &options, &NoopProgress, &CancellationToken::new())
//!         .await?;
//!     println!("{}", result.summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `paperlens` binary (clap + anyhow + tracing-subscriber) |
//! | `browser` | on      | Headless Chromium as the secondary note-image backend |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod content;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod note;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{AnalysisOptions, PaperAnalysisPipeline};
pub use config::{AppConfig, AppConfigBuilder, Artifact, ProviderKind};
pub use content::ContentGenerator;
pub use error::{ModelError, PaperError, RenderError, TaskError};
pub use extract::{PdfExtractor, PdfiumExtractor};
pub use gateway::{build_gateway, ChatMessage, CompletionOptions, ModelGateway};
pub use note::{NoteRenderer, ScreenshotBackend};
pub use output::{
    save_analysis, AnalysisResult, DocumentMetadata, KeyInfo, PageAnalysis, StructuredNote,
    TaskResult,
};
pub use progress::{NoopProgress, ProgressSink, SharedProgress, Stage};
pub use prompts::Language;
pub use task::{MemoryTaskStore, Task, TaskCoordinator, TaskOptions, TaskStatus, TaskStore};
