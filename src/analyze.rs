//! Paper analysis pipeline.
//!
//! ## Stages
//!
//! ```text
//! metadata ─▶ rasterize ─▶ text ─▶ per-page analysis ─▶ key facts ─▶ [translate] ─▶ summary
//! ```
//!
//! Only an unreadable document (zero pages) or cancellation aborts a run.
//! Every model failure degrades locally: a page gets an inline error string,
//! key facts fall back to the empty record, a failed translation keeps the
//! original value, and the summary becomes an inline error string.

use crate::error::PaperError;
use crate::extract::PdfExtractor;
use crate::gateway::{ChatMessage, CompletionOptions, ModelGateway};
use crate::output::{truncate_chars, AnalysisResult, KeyInfo, PageAnalysis};
use crate::pipeline::postprocess::parse_or_else;
use crate::pipeline::render::page_file_name;
use crate::progress::{ProgressSink, Stage};
use crate::prompts::{self, Language};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pages whose text feeds key-fact extraction.
pub const KEY_INFO_PAGES: usize = 3;
/// Character cap on the key-fact prompt input.
pub const KEY_INFO_MAX_CHARS: usize = 3000;
const KEY_INFO_TEMPERATURE: f32 = 0.3;

/// Page analyses that feed the summary.
pub const SUMMARY_PAGES: usize = 10;
/// Character cap on the page analyses in the summary prompt.
pub const SUMMARY_MAX_CHARS: usize = 2000;
const SUMMARY_TEMPERATURE: f32 = 0.7;
const SUMMARY_MAX_TOKENS: u32 = 2000;

/// Per-run knobs.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Translate key facts into `language`.
    pub translate: bool,
    /// Language of commentary, summary and translations.
    pub language: Language,
    /// Where page rasters go. Created if absent.
    pub page_image_dir: PathBuf,
}

/// Drives one PDF through every analysis stage.
#[derive(Clone)]
pub struct PaperAnalysisPipeline {
    extractor: Arc<dyn PdfExtractor>,
    gateway: Arc<dyn ModelGateway>,
}

impl PaperAnalysisPipeline {
    pub fn new(extractor: Arc<dyn PdfExtractor>, gateway: Arc<dyn ModelGateway>) -> Self {
        Self { extractor, gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn ModelGateway> {
        &self.gateway
    }

    /// Analyse `pdf_path` end to end.
    ///
    /// # Errors
    /// * [`PaperError::UnreadableDocument`] when the PDF has no readable pages.
    /// * [`PaperError::Cancelled`] when `cancel` fires before a model call.
    pub async fn run(
        &self,
        pdf_path: &Path,
        options: &AnalysisOptions,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PaperError> {
        let start = Instant::now();

        progress.on_stage(Stage::Metadata);
        let metadata = self.extractor.metadata(pdf_path).await;
        let num_pages = metadata.page_count;
        if num_pages == 0 {
            return Err(PaperError::UnreadableDocument {
                path: pdf_path.to_path_buf(),
            });
        }
        info!("Analysing {} ({} pages)", pdf_path.display(), num_pages);

        progress.on_stage(Stage::Rasterize);
        let images = self
            .extractor
            .rasterize(pdf_path, &options.page_image_dir, None)
            .await;
        debug!("{} page images available", images.len());

        progress.on_stage(Stage::ExtractText);
        let texts = self.extractor.extract_text(pdf_path, None).await;

        progress.on_stage(Stage::AnalyzePages);
        let page_analyses = self
            .analyze_pages(num_pages, &texts, &images, options.language, progress, cancel)
            .await?;

        progress.on_stage(Stage::KeyInfo);
        check(cancel)?;
        let mut key_info = self.extract_key_info(&texts).await;

        if options.translate {
            progress.on_stage(Stage::Translate);
            key_info = self
                .translate_key_info(key_info, options.language, cancel)
                .await?;
        }

        progress.on_stage(Stage::Summary);
        check(cancel)?;
        let summary = self
            .summarize(&key_info, &page_analyses, options.language)
            .await;

        info!(
            "Analysis finished: {} pages in {}ms",
            num_pages,
            start.elapsed().as_millis()
        );

        Ok(AnalysisResult {
            metadata,
            key_info,
            summary,
            page_analyses,
            num_pages,
        })
    }

    async fn analyze_pages(
        &self,
        num_pages: usize,
        texts: &BTreeMap<usize, String>,
        images: &[PathBuf],
        language: Language,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageAnalysis>, PaperError> {
        let mut out = Vec::with_capacity(num_pages);

        for page_num in 1..=num_pages {
            check(cancel)?;
            progress.on_page_start(page_num, num_pages);

            let text = texts.get(&page_num).map(String::as_str).unwrap_or("");
            let image = find_page_image(images, page_num);
            let prompt = prompts::page_analysis_prompt(page_num, language);

            let analysis = match self.gateway.analyze_page(text, image, Some(&prompt)).await {
                Ok(a) => {
                    progress.on_page_complete(page_num, num_pages);
                    a
                }
                Err(e) => {
                    warn!("Page {}: analysis failed: {}", page_num, e);
                    let msg = format!("Error analysing page {page_num}: {e}");
                    progress.on_page_error(page_num, num_pages, &msg);
                    msg
                }
            };
            out.push(PageAnalysis::new(page_num, text, analysis));
        }
        Ok(out)
    }

    async fn extract_key_info(&self, texts: &BTreeMap<usize, String>) -> KeyInfo {
        let opening = (1..=KEY_INFO_PAGES.min(texts.len()))
            .map(|n| texts.get(&n).map(String::as_str).unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = prompts::key_info_prompt(truncate_chars(&opening, KEY_INFO_MAX_CHARS));

        match self
            .gateway
            .complete(
                &[ChatMessage::user(prompt)],
                &CompletionOptions::with_temperature(KEY_INFO_TEMPERATURE),
            )
            .await
        {
            Ok(response) => parse_or_else(&response, "key info", KeyInfo::default),
            Err(e) => {
                warn!("Key info extraction failed: {}", e);
                KeyInfo::default()
            }
        }
    }

    /// Translate every non-empty string and list element of `key_info`.
    ///
    /// A field whose translation fails keeps its original value.
    pub async fn translate_key_info(
        &self,
        mut key_info: KeyInfo,
        target: Language,
        cancel: &CancellationToken,
    ) -> Result<KeyInfo, PaperError> {
        for (name, value) in key_info.text_fields_mut() {
            if value.is_empty() {
                continue;
            }
            check(cancel)?;
            let translated = self.gateway.translate(value, target, None).await;
            match translated {
                Ok(t) => *value = t,
                Err(e) => warn!("Translating {} failed, keeping original: {}", name, e),
            }
        }

        for (name, items) in key_info.list_fields_mut() {
            for item in items.iter_mut().filter(|i| !i.is_empty()) {
                check(cancel)?;
                let translated = self.gateway.translate(item, target, None).await;
                match translated {
                    Ok(t) => *item = t,
                    Err(e) => warn!("Translating an item of {} failed: {}", name, e),
                }
            }
        }
        Ok(key_info)
    }

    async fn summarize(
        &self,
        key_info: &KeyInfo,
        page_analyses: &[PageAnalysis],
        language: Language,
    ) -> String {
        let analyses = page_analyses
            .iter()
            .take(SUMMARY_PAGES)
            .map(|pa| format!("Page {}: {}", pa.page_num, pa.analysis))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = prompts::summary_prompt(
            key_info,
            truncate_chars(&analyses, SUMMARY_MAX_CHARS),
            language,
        );

        let options =
            CompletionOptions::with_temperature(SUMMARY_TEMPERATURE).max_tokens(SUMMARY_MAX_TOKENS);
        match self
            .gateway
            .complete(&[ChatMessage::user(prompt)], &options)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!("Summary generation failed: {}", e);
                format!("Error generating summary: {e}")
            }
        }
    }
}

pub(crate) fn check(cancel: &CancellationToken) -> Result<(), PaperError> {
    if cancel.is_cancelled() {
        Err(PaperError::Cancelled)
    } else {
        Ok(())
    }
}

fn find_page_image(images: &[PathBuf], page_num: usize) -> Option<&Path> {
    let name = page_file_name(page_num);
    images
        .iter()
        .find(|p| p.file_name().is_some_and(|f| f == name.as_str()))
        .map(PathBuf::as_path)
}
