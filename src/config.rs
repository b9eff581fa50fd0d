//! Service configuration.
//!
//! Every knob lives in [`AppConfig`], built through [`AppConfigBuilder`] or
//! loaded from the environment with [`AppConfig::from_env`]. The CLI binary
//! maps its flags onto the builder; tests build configs directly with
//! temporary directories.

use crate::error::PaperError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Hosted model provider, fixed for the lifetime of a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI-compatible `/chat/completions` endpoint (default).
    #[default]
    OpenAi,
    /// Alibaba DashScope native generation API (Qwen models).
    DashScope,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DashScope => "dashscope",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::DashScope => "qwen-vl-max",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = PaperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "dashscope" | "qwen" => Ok(ProviderKind::DashScope),
            other => Err(PaperError::InvalidConfig(format!(
                "unknown provider '{other}' (expected openai or dashscope)"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the analysis service.
///
/// # Example
/// ```rust
/// use paperlens::{AppConfig, ProviderKind};
///
/// let config = AppConfig::builder()
///     .provider(ProviderKind::DashScope)
///     .max_pages(40)
///     .build()
///     .unwrap();
/// assert_eq!(config.vision_model(), "qwen-vl-max");
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which provider every gateway call goes to. Default: OpenAI-compatible.
    pub provider: ProviderKind,

    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible endpoint, without a trailing slash.
    pub openai_base_url: String,

    pub dashscope_api_key: Option<String>,
    pub dashscope_base_url: String,

    /// Model for text-only completions. `None` uses the provider default.
    pub text_model: Option<String>,
    /// Model for vision completions. `None` uses the provider default.
    pub vision_model: Option<String>,

    /// Where uploaded PDFs are stored as `{task_id}.pdf`.
    pub upload_dir: PathBuf,
    /// Where artifacts are written as `{task_id}_article.md` etc.
    pub output_dir: PathBuf,
    /// Scratch space for page rasters, `{task_id}/page_{n}.png`.
    pub temp_dir: PathBuf,

    /// Upload ceiling in bytes. Default: 100 MiB.
    pub max_file_size: usize,
    /// Page ceiling checked at upload time. Default: 100.
    pub max_pages: usize,
    /// Pages per model call hint. Default: 5.
    ///
    /// Recorded for operators but the page-analysis loop still issues one
    /// call per page; see DESIGN.md.
    pub chunk_size: usize,

    /// Longest edge of a rasterised page in pixels. Default: 1000.
    pub max_image_dim: u32,

    /// Note image width in pixels. Default: 1080.
    pub note_width: u32,
    /// Note image height in pixels. Default: 1920.
    pub note_height: u32,
    /// Optional HTML template overriding the built-in note layout.
    pub note_template: Option<PathBuf>,

    /// HTTP timeout for a single provider request, in seconds. Default: 300.
    pub api_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            dashscope_api_key: None,
            dashscope_base_url: "https://dashscope.aliyuncs.com/api/v1".to_string(),
            text_model: None,
            vision_model: None,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            temp_dir: PathBuf::from("temp"),
            max_file_size: 100 * 1024 * 1024,
            max_pages: 100,
            chunk_size: 5,
            max_image_dim: 1000,
            note_width: 1080,
            note_height: 1920,
            note_template: None,
            api_timeout_secs: 300,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("dashscope_api_key", &redact(&self.dashscope_api_key))
            .field("dashscope_base_url", &self.dashscope_base_url)
            .field("text_model", &self.text_model)
            .field("vision_model", &self.vision_model)
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("temp_dir", &self.temp_dir)
            .field("max_file_size", &self.max_file_size)
            .field("max_pages", &self.max_pages)
            .field("max_image_dim", &self.max_image_dim)
            .field("note_width", &self.note_width)
            .field("note_height", &self.note_height)
            .finish()
    }
}

impl AppConfig {
    /// Create a new builder for `AppConfig`.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first if present.
    /// Unset variables keep their defaults; malformed numbers are rejected.
    pub fn from_env() -> Result<Self, PaperError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Split out of
    /// [`AppConfig::from_env`] so tests don't have to touch process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PaperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut b = AppConfig::builder();

        if let Some(p) = get("PAPERLENS_PROVIDER") {
            b = b.provider(p.parse()?);
        }
        if let Some(k) = get("OPENAI_API_KEY") {
            b = b.openai_api_key(k);
        }
        if let Some(u) = get("OPENAI_BASE_URL") {
            b = b.openai_base_url(u);
        }
        if let Some(k) = get("DASHSCOPE_API_KEY") {
            b = b.dashscope_api_key(k);
        }
        if let Some(u) = get("DASHSCOPE_BASE_URL") {
            b = b.dashscope_base_url(u);
        }
        if let Some(m) = get("PAPERLENS_TEXT_MODEL") {
            b = b.text_model(m);
        }
        if let Some(m) = get("PAPERLENS_VISION_MODEL") {
            b = b.vision_model(m);
        }
        if let Some(d) = get("PAPERLENS_UPLOAD_DIR") {
            b = b.upload_dir(d);
        }
        if let Some(d) = get("PAPERLENS_OUTPUT_DIR") {
            b = b.output_dir(d);
        }
        if let Some(d) = get("PAPERLENS_TEMP_DIR") {
            b = b.temp_dir(d);
        }
        if let Some(v) = get("PAPERLENS_MAX_FILE_SIZE") {
            b = b.max_file_size(parse_num("PAPERLENS_MAX_FILE_SIZE", &v)?);
        }
        if let Some(v) = get("PAPERLENS_MAX_PAGES") {
            b = b.max_pages(parse_num("PAPERLENS_MAX_PAGES", &v)?);
        }
        if let Some(v) = get("PAPERLENS_CHUNK_SIZE") {
            b = b.chunk_size(parse_num("PAPERLENS_CHUNK_SIZE", &v)?);
        }
        if let Some(v) = get("PAPERLENS_MAX_IMAGE_DIM") {
            b = b.max_image_dim(parse_num("PAPERLENS_MAX_IMAGE_DIM", &v)?);
        }
        if let Some(v) = get("PAPERLENS_NOTE_WIDTH") {
            b = b.note_width(parse_num("PAPERLENS_NOTE_WIDTH", &v)?);
        }
        if let Some(v) = get("PAPERLENS_NOTE_HEIGHT") {
            b = b.note_height(parse_num("PAPERLENS_NOTE_HEIGHT", &v)?);
        }
        if let Some(t) = get("PAPERLENS_NOTE_TEMPLATE") {
            b = b.note_template(t);
        }
        if let Some(v) = get("PAPERLENS_API_TIMEOUT") {
            b = b.api_timeout_secs(parse_num("PAPERLENS_API_TIMEOUT", &v)?);
        }

        b.build()
    }

    /// Model used for text-only completions.
    pub fn text_model(&self) -> &str {
        self.text_model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Model used for vision completions.
    pub fn vision_model(&self) -> &str {
        self.vision_model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn upload_path(&self, task_id: &str) -> PathBuf {
        self.upload_dir.join(format!("{task_id}.pdf"))
    }

    pub fn page_image_dir(&self, task_id: &str) -> PathBuf {
        self.temp_dir.join(task_id)
    }

    pub fn artifact_path(&self, task_id: &str, artifact: Artifact) -> PathBuf {
        self.output_dir.join(artifact.file_name(task_id))
    }

    /// Create the upload, output and temp directories.
    pub async fn ensure_dirs(&self) -> Result<(), PaperError> {
        for dir in [&self.upload_dir, &self.output_dir, &self.temp_dir] {
            create_dir(dir).await?;
        }
        Ok(())
    }
}

async fn create_dir(dir: &Path) -> Result<(), PaperError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PaperError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, PaperError> {
    value
        .trim()
        .parse()
        .map_err(|_| PaperError::InvalidConfig(format!("{key} must be a number, got '{value}'")))
}

/// Files written to the output directory for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Article,
    Note,
    NoteImage,
    Analysis,
}

impl Artifact {
    pub fn file_name(&self, task_id: &str) -> String {
        match self {
            Artifact::Article => format!("{task_id}_article.md"),
            Artifact::Note => format!("{task_id}_note.md"),
            Artifact::NoteImage => format!("{task_id}_note.png"),
            Artifact::Analysis => format!("{task_id}_analysis.json"),
        }
    }

    /// Content type served on download.
    pub fn content_type(&self) -> &'static str {
        match self {
            Artifact::Article | Artifact::Note => "text/markdown",
            Artifact::NoteImage => "image/png",
            Artifact::Analysis => "application/json",
        }
    }
}

/// Builder for [`AppConfig`].
#[derive(Debug)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.openai_api_key = Some(key.into());
        self
    }

    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.openai_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn dashscope_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.dashscope_api_key = Some(key.into());
        self
    }

    pub fn dashscope_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.dashscope_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = Some(model.into());
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = Some(model.into());
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    /// Convenience for tests and one-shot runs: put all three directories
    /// under `root`.
    pub fn root_dir(self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.upload_dir(root.join("uploads"))
            .output_dir(root.join("outputs"))
            .temp_dir(root.join("temp"))
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = pages;
        self
    }

    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages.max(1);
        self
    }

    pub fn max_image_dim(mut self, px: u32) -> Self {
        self.config.max_image_dim = px;
        self
    }

    pub fn note_width(mut self, px: u32) -> Self {
        self.config.note_width = px;
        self
    }

    pub fn note_height(mut self, px: u32) -> Self {
        self.config.note_height = px;
        self
    }

    pub fn note_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.note_template = Some(path.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AppConfig, PaperError> {
        let c = &self.config;
        if c.max_pages == 0 {
            return Err(PaperError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if c.max_file_size == 0 {
            return Err(PaperError::InvalidConfig(
                "max_file_size must be ≥ 1 byte".into(),
            ));
        }
        if c.max_image_dim == 0 {
            return Err(PaperError::InvalidConfig(
                "max_image_dim must be ≥ 1 pixel".into(),
            ));
        }
        if c.note_width == 0 || c.note_height == 0 {
            return Err(PaperError::InvalidConfig(format!(
                "note image must be non-empty, got {}x{}",
                c.note_width, c.note_height
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(PaperError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let c = AppConfig::default();
        assert_eq!(c.max_file_size, 100 * 1024 * 1024);
        assert_eq!(c.max_pages, 100);
        assert_eq!(c.chunk_size, 5);
        assert_eq!(c.max_image_dim, 1000);
        assert_eq!((c.note_width, c.note_height), (1080, 1920));
        assert_eq!(c.text_model(), "gpt-4o");
    }

    #[test]
    fn provider_default_models() {
        let c = AppConfig::builder()
            .provider(ProviderKind::DashScope)
            .build()
            .unwrap();
        assert_eq!(c.vision_model(), "qwen-vl-max");

        let c = AppConfig::builder().vision_model("gpt-4.1").build().unwrap();
        assert_eq!(c.vision_model(), "gpt-4.1");
        assert_eq!(c.text_model(), "gpt-4o");
    }

    #[test]
    fn provider_parsing() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("qwen".parse::<ProviderKind>().unwrap(), ProviderKind::DashScope);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn build_rejects_zero_pages() {
        assert!(AppConfig::builder().max_pages(0).build().is_err());
    }

    #[test]
    fn build_rejects_zero_image_dim() {
        let err = AppConfig::builder().max_image_dim(0).build().unwrap_err();
        assert!(err.to_string().contains("max_image_dim"), "got: {err}");
        assert_eq!(
            AppConfig::builder().max_image_dim(512).build().unwrap().max_image_dim,
            512
        );

        let err = AppConfig::from_lookup(|k| {
            (k == "PAPERLENS_MAX_IMAGE_DIM").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("max_image_dim"), "got: {err}");
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let c = AppConfig::builder()
            .openai_base_url("https://api.302.ai/v1/")
            .build()
            .unwrap();
        assert_eq!(c.openai_base_url, "https://api.302.ai/v1");
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let env: HashMap<&str, &str> = [
            ("PAPERLENS_PROVIDER", "dashscope"),
            ("DASHSCOPE_API_KEY", "sk-test"),
            ("PAPERLENS_MAX_PAGES", "12"),
            ("PAPERLENS_OUTPUT_DIR", "/tmp/out"),
            ("PAPERLENS_NOTE_WIDTH", ""),
        ]
        .into_iter()
        .collect();

        let c = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.provider, ProviderKind::DashScope);
        assert_eq!(c.dashscope_api_key.as_deref(), Some("sk-test"));
        assert_eq!(c.max_pages, 12);
        assert_eq!(c.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(c.note_width, 1080, "blank values keep the default");
    }

    #[test]
    fn from_lookup_rejects_bad_numbers() {
        let err = AppConfig::from_lookup(|k| {
            (k == "PAPERLENS_MAX_PAGES").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("PAPERLENS_MAX_PAGES"));
    }

    #[test]
    fn artifact_paths() {
        let c = AppConfig::builder().root_dir("/data").build().unwrap();
        assert_eq!(
            c.artifact_path("t1", Artifact::NoteImage),
            PathBuf::from("/data/outputs/t1_note.png")
        );
        assert_eq!(c.upload_path("t1"), PathBuf::from("/data/uploads/t1.pdf"));
        assert_eq!(c.page_image_dir("t1"), PathBuf::from("/data/temp/t1"));
        assert_eq!(Artifact::Note.content_type(), "text/markdown");
    }
}
