//! Data produced by the analysis pipeline and the content generator.
//!
//! Everything here is plain serde data: it is returned from the HTTP API,
//! written to `{task_id}_analysis.json`, and handed between pipeline stages.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum characters of source text kept on each [`PageAnalysis`].
pub const PAGE_TEXT_PREVIEW_CHARS: usize = 500;

/// PDF-level descriptive fields.
///
/// Every string is best effort: missing or unparseable entries are empty,
/// never absent. `error` is set only when the document could not be opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub creator: String,
    pub producer: String,
    pub creation_date: String,
    pub modification_date: String,
    #[serde(rename = "num_pages")]
    pub page_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentMetadata {
    /// The all-empty record returned when the PDF cannot be read.
    pub fn unreadable(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Model commentary for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Source text, truncated to [`PAGE_TEXT_PREVIEW_CHARS`] plus `...`.
    pub text: String,
    /// Free-text model commentary, or an inline error message.
    pub analysis: String,
}

impl PageAnalysis {
    pub fn new(page_num: usize, source_text: &str, analysis: String) -> Self {
        Self {
            page_num,
            text: preview(source_text, PAGE_TEXT_PREVIEW_CHARS),
            analysis,
        }
    }
}

/// Paper-level facts extracted by the model.
///
/// Fields missing from the model's JSON default to empty so a partially
/// filled response still parses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyInfo {
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: Vec<String>,
    pub main_contributions: Vec<String>,
    pub methodology: String,
    pub main_results: String,
    pub conclusions: String,
}

impl KeyInfo {
    /// Mutable references to every string field, in declaration order.
    pub fn text_fields_mut(&mut self) -> [(&'static str, &mut String); 5] {
        [
            ("title", &mut self.title),
            ("abstract", &mut self.abstract_text),
            ("methodology", &mut self.methodology),
            ("main_results", &mut self.main_results),
            ("conclusions", &mut self.conclusions),
        ]
    }

    /// Mutable references to every list field, in declaration order.
    pub fn list_fields_mut(&mut self) -> [(&'static str, &mut Vec<String>); 3] {
        [
            ("authors", &mut self.authors),
            ("keywords", &mut self.keywords),
            ("main_contributions", &mut self.main_contributions),
        ]
    }
}

/// Aggregate output of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub metadata: DocumentMetadata,
    pub key_info: KeyInfo,
    pub summary: String,
    pub page_analyses: Vec<PageAnalysis>,
    pub num_pages: usize,
}

/// Fielded social note, used for both text and image output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredNote {
    pub title: String,
    pub hook: String,
    pub key_points: Vec<String>,
    pub highlight: String,
    pub conclusion: String,
}

/// What a completed task hands back to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub analysis: AnalysisResult,
    pub article: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_path: Option<PathBuf>,
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_path: Option<PathBuf>,
    pub image_path: Option<PathBuf>,
}

/// Write an analysis result as pretty JSON, creating parent directories.
pub async fn save_analysis(result: &AnalysisResult, path: &Path) -> Result<(), crate::PaperError> {
    let write_err = |source| crate::PaperError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let json = serde_json::to_string_pretty(result)
        .map_err(|e| crate::PaperError::Internal(format!("serialise analysis: {e}")))?;
    tokio::fs::write(path, json).await.map_err(write_err)
}

/// Keep the first `max_chars` characters, appending `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Keep the first `max_chars` characters with no marker.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
