//! Prompt templates for every model call the crate makes.
//!
//! All prompt text lives here so wording changes touch exactly one file and
//! unit tests can inspect prompts without a provider. Builders take the
//! inputs they interpolate and return owned strings; truncation of long
//! inputs is the caller's job.

use crate::output::{AnalysisResult, KeyInfo};

/// Output language for generated prose and translations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Chinese,
    English,
}

impl Language {
    /// Map a language code to a [`Language`]. Unknown codes fall back to
    /// Chinese.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en-gb" | "english" => Language::English,
            _ => Language::Chinese,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::Chinese => "zh",
            Language::English => "en",
        }
    }

    /// Name used inside prompts.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Chinese => "Simplified Chinese",
            Language::English => "English",
        }
    }
}

/// Used by `analyze_page` when the caller passes no prompt.
pub const DEFAULT_PAGE_PROMPT: &str = "Analyse this page of a research paper and extract:
1. An overview of the main content
2. Key concepts and techniques
3. Important data and results
4. How it connects to other parts of the paper

Answer in a professional but accessible tone.";

/// Per-page analysis prompt.
pub fn page_analysis_prompt(page_num: usize, lang: Language) -> String {
    format!(
        "Analyse this page of a research paper (page {page_num}) and extract:
1. An overview of the main content (2-3 sentences)
2. Key concepts and technical terms
3. Important data, figures or results
4. How it connects to other parts of the paper

Answer in {lang}, professional but easy to follow. If the page is mostly figures or tables, describe what they show and what they mean.",
        lang = lang.name()
    )
}

/// Attach page text below a page prompt.
pub fn with_page_text(prompt: &str, page_text: &str) -> String {
    format!("{prompt}\n\nPage text:\n{page_text}")
}

/// Key-facts extraction prompt over the opening pages.
pub fn key_info_prompt(first_pages_text: &str) -> String {
    format!(
        r#"Extract the key information from the following research paper and return it as JSON:

{{
    "title": "paper title",
    "authors": ["author 1", "author 2"],
    "abstract": "abstract",
    "keywords": ["keyword 1", "keyword 2"],
    "main_contributions": ["contribution 1", "contribution 2"],
    "methodology": "overview of the method",
    "main_results": "main results",
    "conclusions": "conclusions"
}}

Opening pages of the paper:
{first_pages_text}

Return only the JSON, with no other text."#
    )
}

/// Translation prompt.
pub fn translate_prompt(text: &str, target: Language, source: Option<Language>) -> String {
    let from = match source {
        Some(lang) => format!(" from {}", lang.name()),
        None => String::new(),
    };
    format!(
        "Translate the following text{from} into {}. Keep technical terms accurate and make the result read naturally. Return only the translation.\n\n{text}",
        target.name()
    )
}

/// Narrative summary prompt. `analyses` is the pre-truncated page commentary.
pub fn summary_prompt(key_info: &KeyInfo, analyses: &str, lang: Language) -> String {
    format!(
        "Based on the information below, write an in-depth explanatory summary of the paper (500-800 words).

Key information:
Title: {title}
Abstract: {abstract_text}
Main contributions: {contributions}
Methodology: {methodology}
Main results: {results}

Page analyses:
{analyses}

Write in {lang}. Keep it professional yet accessible, suitable for a popular-science article.",
        title = key_info.title,
        abstract_text = key_info.abstract_text,
        contributions = key_info.main_contributions.join(", "),
        methodology = key_info.methodology,
        results = key_info.main_results,
        lang = lang.name(),
    )
}

/// Long-form article prompt.
pub fn article_prompt(result: &AnalysisResult, lang: Language) -> String {
    let k = &result.key_info;
    let title = if k.title.is_empty() {
        result.metadata.title.as_str()
    } else {
        k.title.as_str()
    };
    format!(
        "Based on the paper analysis below, write a popular-science article in Markdown suitable for a newsletter or blog.

Requirements:
1. A title that draws readers in
2. An engaging introduction
3. Accessible language; avoid unexplained jargon
4. Section headings to structure the body
5. Emphasise what is novel and why it matters in practice
6. Close with a summary and some reflection

Paper information:
Title: {title}
Authors: {authors}
Abstract: {abstract_text}
Main contributions: {contributions}
Methodology: {methodology}
Main results: {results}

In-depth summary:
{summary}

Write the complete Markdown article in {lang}, with title, introduction, body and conclusion.",
        authors = k.authors.join(", "),
        abstract_text = k.abstract_text,
        contributions = k.main_contributions.join(", "),
        methodology = k.methodology,
        results = k.main_results,
        summary = result.summary,
        lang = lang.name(),
    )
}

/// Short social-media note prompt.
pub fn note_prompt(result: &AnalysisResult, lang: Language) -> String {
    let k = &result.key_info;
    format!(
        "Based on the paper analysis below, write a short social-media note in Markdown.

Requirements:
1. An eye-catching title, emoji welcome
2. Open with a hook
3. Bullet points, each starting with an emoji
4. Light and lively tone that stays accurate
5. Keep it concise, 500-800 characters
6. End with a question that invites discussion

Paper information:
Title: {title}
Main contributions: {contributions}
Main results: {results}

In-depth summary:
{summary}

Write the complete note in {lang}.",
        title = k.title,
        contributions = k.main_contributions.join(", "),
        results = k.main_results,
        summary = result.summary,
        lang = lang.name(),
    )
}

/// Structured note prompt; the answer must be a JSON object.
pub fn structured_note_prompt(result: &AnalysisResult, lang: Language) -> String {
    let k = &result.key_info;
    format!(
        r#"Based on the paper analysis below, produce the structured content of a social-media note as JSON:

{{
    "title": "catchy title (emoji allowed)",
    "hook": "one opening sentence that grabs attention",
    "key_points": [
        "point 1 (emoji allowed)",
        "point 2 (emoji allowed)"
    ],
    "highlight": "the core highlight in 1-2 sentences",
    "conclusion": "wrap-up with a question for readers"
}}

Paper information:
Title: {title}
Main contributions: {contributions}
Main results: {results}

In-depth summary:
{summary}

Write the values in {lang}. Return only the JSON, with no other text."#,
        title = k.title,
        contributions = k.main_contributions.join(", "),
        results = k.main_results,
        summary = result.summary,
        lang = lang.name(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes() {
        assert_eq!(Language::from_code("en"), Language::English);
        assert_eq!(Language::from_code("ZH"), Language::Chinese);
        assert_eq!(Language::from_code("fr"), Language::Chinese);
        assert_eq!(Language::English.code(), "en");
    }

    #[test]
    fn page_prompt_names_page_and_language() {
        let p = page_analysis_prompt(7, Language::English);
        assert!(p.contains("page 7"));
        assert!(p.contains("English"));
    }

    #[test]
    fn key_info_prompt_lists_every_field() {
        let p = key_info_prompt("Attention Is All You Need");
        for field in [
            "\"title\"",
            "\"authors\"",
            "\"abstract\"",
            "\"keywords\"",
            "\"main_contributions\"",
            "\"methodology\"",
            "\"main_results\"",
            "\"conclusions\"",
        ] {
            assert!(p.contains(field), "missing {field}");
        }
        assert!(p.contains("Attention Is All You Need"));
    }

    #[test]
    fn translate_prompt_mentions_source_when_known() {
        let p = translate_prompt("hello", Language::Chinese, Some(Language::English));
        assert!(p.contains("from English"));
        assert!(p.ends_with("hello"));
        assert!(!translate_prompt("x", Language::English, None).contains(" from "));
    }

    #[test]
    fn article_prompt_falls_back_to_metadata_title() {
        let mut r = AnalysisResult::default();
        r.metadata.title = "PDF Title".into();
        assert!(article_prompt(&r, Language::Chinese).contains("Title: PDF Title"));
        r.key_info.title = "Model Title".into();
        assert!(article_prompt(&r, Language::Chinese).contains("Title: Model Title"));
    }
}
