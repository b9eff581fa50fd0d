//! OpenAI gateway: a thin adapter over an edgequake-llm provider.
//!
//! edgequake-llm owns the wire protocol (request shape, image parts, token
//! limits per model family). This module only converts messages and options
//! between the two vocabularies and maps `LlmError` onto [`ModelError`].

use super::{ChatMessage, CompletionOptions, ModelGateway, Role};
use crate::error::{ModelError, PaperError};
use crate::pipeline::encode::encode_image_data;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage as LlmMessage, CompletionOptions as LlmOptions, ImageData, LLMProvider,
    ProviderFactory,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

const PROVIDER: &str = "openai";

/// Gateway for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiGateway {
    text: Arc<dyn LLMProvider>,
    vision: Arc<dyn LLMProvider>,
    text_model: String,
    vision_model: String,
}

impl fmt::Debug for OpenAiGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiGateway")
            .field("text_model", &self.text_model)
            .field("vision_model", &self.vision_model)
            .finish()
    }
}

impl OpenAiGateway {
    /// Wrap providers the caller already built and configured.
    pub fn new(
        text: Arc<dyn LLMProvider>,
        vision: Arc<dyn LLMProvider>,
        text_model: impl Into<String>,
        vision_model: impl Into<String>,
    ) -> Self {
        Self {
            text,
            vision,
            text_model: text_model.into(),
            vision_model: vision_model.into(),
        }
    }

    /// Build both providers through [`ProviderFactory`], which reads the
    /// OpenAI credentials from the environment.
    pub fn from_factory(
        text_model: impl Into<String>,
        vision_model: impl Into<String>,
    ) -> Result<Self, PaperError> {
        let text_model = text_model.into();
        let vision_model = vision_model.into();
        let text = create_provider(&text_model).map_err(not_configured)?;
        let vision = if vision_model == text_model {
            Arc::clone(&text)
        } else {
            create_provider(&vision_model).map_err(not_configured)?
        };
        Ok(Self::new(text, vision, text_model, vision_model))
    }

    /// The provider for this call: the configured one, or a fresh one when
    /// the options name a different model.
    fn provider_for(
        &self,
        options: &CompletionOptions,
        vision: bool,
    ) -> Result<(Arc<dyn LLMProvider>, String), ModelError> {
        let (provider, default_model) = if vision {
            (&self.vision, &self.vision_model)
        } else {
            (&self.text, &self.text_model)
        };
        match options.model.as_deref() {
            Some(m) if m != default_model.as_str() => {
                let p = create_provider(m).map_err(|e| provider_error(&e))?;
                Ok((p, m.to_string()))
            }
            _ => Ok((Arc::clone(provider), default_model.clone())),
        }
    }

    async fn send(
        &self,
        provider: &Arc<dyn LLMProvider>,
        messages: &[LlmMessage],
        options: &CompletionOptions,
    ) -> Result<String, ModelError> {
        let response = provider
            .chat(messages, Some(&to_llm_options(options)))
            .await
            .map_err(|e| provider_error(&e))?;
        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

fn create_provider(model: &str) -> Result<Arc<dyn LLMProvider>, String> {
    ProviderFactory::create_llm_provider(PROVIDER, model).map_err(|e| e.to_string())
}

fn not_configured(detail: String) -> PaperError {
    PaperError::ProviderNotConfigured {
        provider: PROVIDER.to_string(),
        hint: format!("Set OPENAI_API_KEY in the environment or a .env file.\nError: {detail}"),
    }
}

/// Map an edgequake-llm failure onto [`ModelError`].
fn provider_error(e: &dyn fmt::Display) -> ModelError {
    ModelError::Provider {
        provider: PROVIDER.to_string(),
        detail: e.to_string(),
    }
}

fn to_llm_options(options: &CompletionOptions) -> LlmOptions {
    LlmOptions {
        temperature: Some(options.temperature),
        max_tokens: options.max_tokens.map(|t| t as usize),
        ..Default::default()
    }
}

/// Convert chat turns. Images ride on user turns; system turns stay text-only.
fn to_llm_messages(messages: &[ChatMessage], images: &[ImageData]) -> Vec<LlmMessage> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::System => LlmMessage::system(&m.content),
            Role::User if !images.is_empty() => {
                LlmMessage::user_with_images(&m.content, images.to_vec())
            }
            Role::User => LlmMessage::user(&m.content),
            Role::Assistant => LlmMessage::assistant(&m.content),
        })
        .collect()
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip_all, fields(model))]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ModelError> {
        let (provider, model) = self.provider_for(options, false)?;
        tracing::Span::current().record("model", model.as_str());
        self.send(&provider, &to_llm_messages(messages, &[]), options)
            .await
    }

    #[instrument(skip_all, fields(model, images = image_paths.len()))]
    async fn complete_with_image(
        &self,
        messages: &[ChatMessage],
        image_paths: &[PathBuf],
        options: &CompletionOptions,
    ) -> Result<String, ModelError> {
        let (provider, model) = self.provider_for(options, true)?;
        tracing::Span::current().record("model", model.as_str());

        let mut images = Vec::with_capacity(image_paths.len());
        for path in image_paths {
            images.push(encode_image_data(path).await?);
        }
        debug!("Attaching {} images", images.len());

        self.send(&provider, &to_llm_messages(messages, &images), options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_carry_temperature_and_token_cap() {
        let opts = to_llm_options(&CompletionOptions::with_temperature(0.3).max_tokens(2000));
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(2000));

        let opts = to_llm_options(&CompletionOptions::default());
        assert_eq!(opts.temperature, Some(0.7));
        assert_eq!(opts.max_tokens, None);
    }

    #[test]
    fn every_turn_is_converted() {
        let turns = [
            ChatMessage::system("be brief"),
            ChatMessage::user("describe"),
            ChatMessage::assistant("ok"),
        ];
        assert_eq!(to_llm_messages(&turns, &[]).len(), 3);
        let images = [ImageData::new("aGk=", "image/png")];
        assert_eq!(to_llm_messages(&turns, &images).len(), 3);
    }

    #[test]
    fn provider_failures_become_model_errors() {
        let err = provider_error(&"rate limited (429)");
        match &err {
            ModelError::Provider { provider, detail } => {
                assert_eq!(provider, "openai");
                assert_eq!(detail, "rate limited (429)");
            }
            other => panic!("expected Provider error, got {other:?}"),
        }
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn factory_failure_names_the_key() {
        let err = not_configured("missing OPENAI_API_KEY".to_string());
        let msg = err.to_string();
        assert!(msg.contains("openai"), "got: {msg}");
        assert!(msg.contains("OPENAI_API_KEY"), "got: {msg}");
    }
}
