//! Publication content derived from an [`AnalysisResult`].
//!
//! Free-text generators return inline error strings on failure so a task can
//! still complete with a readable artifact. The structured note has a
//! deterministic fallback, [`StructuredNote::fallback`], so the note image can
//! always be rendered.

use crate::gateway::{ChatMessage, CompletionOptions, ModelGateway};
use crate::output::{truncate_chars, AnalysisResult, StructuredNote};
use crate::pipeline::postprocess::parse_model_json;
use crate::prompts::{self, Language};
use std::sync::Arc;
use tracing::warn;

const ARTICLE_TEMPERATURE: f32 = 0.8;
const ARTICLE_MAX_TOKENS: u32 = 3000;
const NOTE_TEMPERATURE: f32 = 0.9;
const NOTE_MAX_TOKENS: u32 = 2000;
const STRUCTURED_NOTE_MAX_TOKENS: u32 = 1500;

/// Title used when neither the note nor the key facts carry one.
pub const DEFAULT_NOTE_TITLE: &str = "📚 Paper digest";

impl StructuredNote {
    /// Deterministic note built from the analysis alone.
    pub fn fallback(result: &AnalysisResult) -> Self {
        let k = &result.key_info;
        let title = if k.title.trim().is_empty() {
            DEFAULT_NOTE_TITLE.to_string()
        } else {
            format!("📚 {}", k.title)
        };
        let highlight = if result.summary.is_empty() {
            "A paper well worth a closer look.".to_string()
        } else {
            truncate_chars(&result.summary, 200).to_string()
        };

        Self {
            title,
            hook: "Let's dig into an interesting paper today!".to_string(),
            key_points: vec![
                format!("✨ Main contributions: {}", k.main_contributions.join(", ")),
                format!("🔬 Methodology: {}", truncate_chars(&k.methodology, 100)),
                format!("📊 Main results: {}", truncate_chars(&k.main_results, 100)),
            ],
            highlight,
            conclusion: "What do you think of this work? Share your thoughts in the comments!"
                .to_string(),
        }
    }
}

/// Writes the article and the social note.
#[derive(Clone)]
pub struct ContentGenerator {
    gateway: Arc<dyn ModelGateway>,
    language: Language,
}

impl ContentGenerator {
    pub fn new(gateway: Arc<dyn ModelGateway>, language: Language) -> Self {
        Self { gateway, language }
    }

    /// Long-form Markdown article.
    pub async fn article(&self, result: &AnalysisResult) -> String {
        let prompt = prompts::article_prompt(result, self.language);
        let options =
            CompletionOptions::with_temperature(ARTICLE_TEMPERATURE).max_tokens(ARTICLE_MAX_TOKENS);
        self.free_text("article", prompt, options).await
    }

    /// Short Markdown note.
    pub async fn note_text(&self, result: &AnalysisResult) -> String {
        let prompt = prompts::note_prompt(result, self.language);
        let options =
            CompletionOptions::with_temperature(NOTE_TEMPERATURE).max_tokens(NOTE_MAX_TOKENS);
        self.free_text("note", prompt, options).await
    }

    /// Fielded note for the image template. Never fails.
    pub async fn note_structured(&self, result: &AnalysisResult) -> StructuredNote {
        let prompt = prompts::structured_note_prompt(result, self.language);
        let options = CompletionOptions::with_temperature(NOTE_TEMPERATURE)
            .max_tokens(STRUCTURED_NOTE_MAX_TOKENS);

        let response = match self
            .gateway
            .complete(&[ChatMessage::user(prompt)], &options)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Structured note generation failed: {}", e);
                return StructuredNote::fallback(result);
            }
        };

        match parse_model_json::<StructuredNote>(&response) {
            Ok(note) if !note.title.trim().is_empty() || !note.key_points.is_empty() => note,
            Ok(_) => {
                warn!("Structured note came back empty, using fallback");
                StructuredNote::fallback(result)
            }
            Err(e) => {
                warn!("Failed to parse structured note JSON: {}", e);
                StructuredNote::fallback(result)
            }
        }
    }

    async fn free_text(&self, what: &str, prompt: String, options: CompletionOptions) -> String {
        match self
            .gateway
            .complete(&[ChatMessage::user(prompt)], &options)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("{} generation failed: {}", what, e);
                format!("Error generating {what}: {e}")
            }
        }
    }
}
