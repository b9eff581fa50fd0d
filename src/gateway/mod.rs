//! Model gateway: one capability interface over hosted LLM providers.
//!
//! The pipeline and the content generator only ever see
//! `Arc<dyn ModelGateway>`. Which provider sits behind it is fixed at
//! construction by [`build_gateway`]; there is no per-call switching.
//!
//! Gateways never catch errors. Every failed call comes back as a
//! [`ModelError`] and the call site decides how to degrade.

mod dashscope;
mod openai;

pub use dashscope::DashScopeGateway;
pub use openai::OpenAiGateway;

use crate::config::{AppConfig, ProviderKind};
use crate::error::{ModelError, PaperError};
use crate::prompts::{self, Language};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Who a chat message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A plain-text chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling options for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    /// Overrides the gateway's text or vision model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl CompletionOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Temperature used for translations.
pub const TRANSLATE_TEMPERATURE: f32 = 0.3;

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Short provider name used in logs and errors.
    fn provider(&self) -> &'static str;

    /// Text-only completion.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ModelError>;

    /// Completion with PNG images attached.
    async fn complete_with_image(
        &self,
        messages: &[ChatMessage],
        image_paths: &[PathBuf],
        options: &CompletionOptions,
    ) -> Result<String, ModelError>;

    /// Comment on one page. Uses the vision path when `image_path` exists on
    /// disk, text only otherwise.
    async fn analyze_page(
        &self,
        page_text: &str,
        image_path: Option<&Path>,
        prompt: Option<&str>,
    ) -> Result<String, ModelError> {
        let prompt = prompt.unwrap_or(prompts::DEFAULT_PAGE_PROMPT);
        let messages = [ChatMessage::user(prompts::with_page_text(prompt, page_text))];
        let options = CompletionOptions::default();

        match image_path {
            Some(p) if tokio::fs::try_exists(p).await.unwrap_or(false) => {
                self.complete_with_image(&messages, &[p.to_path_buf()], &options)
                    .await
            }
            _ => self.complete(&messages, &options).await,
        }
    }

    /// Translate `text` into `target`.
    async fn translate(
        &self,
        text: &str,
        target: Language,
        source: Option<Language>,
    ) -> Result<String, ModelError> {
        let messages = [ChatMessage::user(prompts::translate_prompt(
            text, target, source,
        ))];
        self.complete(
            &messages,
            &CompletionOptions::with_temperature(TRANSLATE_TEMPERATURE),
        )
        .await
    }
}

/// Build the gateway selected by `config.provider`.
///
/// OpenAI goes through edgequake-llm's [`ProviderFactory`](edgequake_llm::ProviderFactory);
/// DashScope's native multimodal endpoint is called directly over reqwest.
pub fn build_gateway(config: &AppConfig) -> Result<Arc<dyn ModelGateway>, PaperError> {
    let gateway: Arc<dyn ModelGateway> = match config.provider {
        ProviderKind::OpenAi => {
            let key =
                require_key(config.openai_api_key.as_deref(), config.provider, "OPENAI_API_KEY")?;
            warn_unless_in_env("OPENAI_API_KEY", key, "");
            warn_unless_in_env("OPENAI_BASE_URL", &config.openai_base_url, "https://api.openai.com/v1");
            Arc::new(OpenAiGateway::from_factory(
                config.text_model(),
                config.vision_model(),
            )?)
        }
        ProviderKind::DashScope => {
            let key = require_key(
                config.dashscope_api_key.as_deref(),
                config.provider,
                "DASHSCOPE_API_KEY",
            )?;
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.api_timeout_secs))
                .build()
                .map_err(|e| PaperError::Internal(format!("HTTP client: {e}")))?;
            Arc::new(DashScopeGateway::new(
                client,
                key,
                &config.dashscope_base_url,
                config.text_model(),
                config.vision_model(),
            ))
        }
    };
    debug!(
        "Model gateway: {} (text={}, vision={})",
        gateway.provider(),
        config.text_model(),
        config.vision_model()
    );
    Ok(gateway)
}

/// edgequake-llm reads OpenAI settings from the process environment, so a
/// value set only through the builder does not reach it.
fn warn_unless_in_env(var: &str, value: &str, default: &str) {
    let from_env = std::env::var(var).ok();
    let effective = from_env.as_deref().unwrap_or(default);
    if value != effective {
        warn!("{var} differs from the configured value; the OpenAI provider uses the environment");
    }
}

fn require_key<'a>(
    key: Option<&'a str>,
    provider: ProviderKind,
    env_var: &str,
) -> Result<&'a str, PaperError> {
    key.filter(|k| !k.trim().is_empty())
        .ok_or_else(|| PaperError::ProviderNotConfigured {
            provider: provider.to_string(),
            hint: format!("Set {env_var} in the environment or a .env file."),
        })
}

/// POST a JSON body and return the parsed JSON response.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    api_key: &str,
    body: &B,
) -> Result<serde_json::Value, ModelError> {
    debug!("POST {}", url);
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| {
            error!(error = ?e, "Failed to send request to {}", provider);
            ModelError::Transport {
                provider: provider.to_string(),
                detail: e.to_string(),
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, "{} API returned error", provider);
        return Err(ModelError::Api {
            provider: provider.to_string(),
            status: status.as_u16(),
            message: api_error_message(&body),
        });
    }

    response.json().await.map_err(|e| ModelError::Parse {
        provider: provider.to_string(),
        detail: e.to_string(),
    })
}

/// Pull the human-readable message out of a provider error body.
fn api_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let msg = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .and_then(|m| m.as_str())
    });
    match msg {
        Some(m) => m.to_string(),
        None => crate::output::preview(body.trim(), 500),
    }
}

pub(crate) fn parse_error(provider: &str, detail: impl Into<String>) -> ModelError {
    ModelError::Parse {
        provider: provider.to_string(),
        detail: detail.into(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_reported() {
        let config = AppConfig::builder().build().unwrap();
        let err = build_gateway(&config).err().expect("no key configured");
        assert!(err.to_string().contains("OPENAI_API_KEY"), "got: {err}");

        let config = AppConfig::builder()
            .provider(ProviderKind::DashScope)
            .dashscope_api_key("  ")
            .build()
            .unwrap();
        let err = build_gateway(&config).err().expect("blank key rejected");
        assert!(err.to_string().contains("DASHSCOPE_API_KEY"));
    }

    #[test]
    fn builds_dashscope_gateway() {
        let config = AppConfig::builder()
            .provider(ProviderKind::DashScope)
            .dashscope_api_key("sk-test")
            .build()
            .unwrap();
        assert_eq!(build_gateway(&config).unwrap().provider(), "dashscope");
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#),
            "bad key"
        );
        assert_eq!(
            api_error_message(r#"{"code":"Throttling","message":"slow down"}"#),
            "slow down"
        );
        assert_eq!(api_error_message("  gateway timeout \n"), "gateway timeout");
    }

    #[test]
    fn options_defaults() {
        let o = CompletionOptions::default();
        assert_eq!(o.temperature, 0.7);
        assert!(o.max_tokens.is_none());
        let o = CompletionOptions::with_temperature(0.3).max_tokens(2000).model("m");
        assert_eq!((o.temperature, o.max_tokens), (0.3, Some(2000)));
        assert_eq!(o.model.as_deref(), Some("m"));
    }

    /// Records which path `analyze_page` takes.
    struct PathRecorder;

    #[async_trait]
    impl ModelGateway for PathRecorder {
        fn provider(&self) -> &'static str {
            "recorder"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            options: &CompletionOptions,
        ) -> Result<String, ModelError> {
            Ok(format!("text:{}:{}", options.temperature, messages[0].content))
        }

        async fn complete_with_image(
            &self,
            _messages: &[ChatMessage],
            image_paths: &[PathBuf],
            _options: &CompletionOptions,
        ) -> Result<String, ModelError> {
            Ok(format!("vision:{}", image_paths.len()))
        }
    }

    #[tokio::test]
    async fn analyze_page_uses_vision_only_when_image_exists() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("page_1.png");
        std::fs::write(&img, b"png").unwrap();

        let g = PathRecorder;
        assert_eq!(g.analyze_page("t", Some(&img), None).await.unwrap(), "vision:1");

        let missing = dir.path().join("page_2.png");
        let out = g.analyze_page("body", Some(&missing), Some("P")).await.unwrap();
        assert!(out.starts_with("text:"));
        assert!(out.ends_with("P\n\nPage text:\nbody"));
    }

    #[tokio::test]
    async fn translate_uses_low_temperature() {
        let out = PathRecorder
            .translate("hello", Language::Chinese, None)
            .await
            .unwrap();
        assert!(out.starts_with("text:0.3:"), "got: {out}");
        assert!(out.ends_with("hello"));
    }
}
