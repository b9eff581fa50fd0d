//! Alibaba DashScope native generation API (Qwen models).
//!
//! Text and vision go to different services:
//!
//! * text:   `POST {base}/services/aigc/text-generation/generation`
//! * vision: `POST {base}/services/aigc/multimodal-generation/generation`
//!
//! Both wrap the conversation in `input.messages` and take sampling knobs in
//! `parameters`. Vision requests collapse every message into a single user
//! turn whose content is a list of `{"text": …}` and `{"image": …}` items.

use super::{parse_error, post_json, ChatMessage, CompletionOptions, ModelGateway};
use crate::error::ModelError;
use crate::pipeline::encode::encode_image_file;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::instrument;

const PROVIDER: &str = "dashscope";

#[derive(Serialize)]
struct GenerationRequest<'a, M> {
    model: &'a str,
    input: Input<M>,
    parameters: Parameters,
}

#[derive(Serialize)]
struct Input<M> {
    messages: Vec<M>,
}

#[derive(Serialize)]
struct Parameters {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    result_format: &'static str,
}

impl From<&CompletionOptions> for Parameters {
    fn from(o: &CompletionOptions) -> Self {
        Self {
            temperature: o.temperature,
            max_tokens: o.max_tokens,
            result_format: "message",
        }
    }
}

#[derive(Serialize)]
struct MultimodalMessage {
    role: &'static str,
    content: Vec<MultimodalItem>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MultimodalItem {
    Text { text: String },
    Image { image: String },
}

/// Gateway for the DashScope native API.
#[derive(Debug, Clone)]
pub struct DashScopeGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    vision_model: String,
}

impl DashScopeGateway {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: &str,
        text_model: impl Into<String>,
        vision_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            text_model: text_model.into(),
            vision_model: vision_model.into(),
        }
    }

    async fn generate<M: Serialize + Send + Sync>(
        &self,
        service: &str,
        model: &str,
        messages: Vec<M>,
        options: &CompletionOptions,
    ) -> Result<String, ModelError> {
        let url = format!("{}/services/aigc/{}/generation", self.base_url, service);
        let request = GenerationRequest {
            model,
            input: Input { messages },
            parameters: options.into(),
        };
        let value = post_json(&self.client, PROVIDER, &url, &self.api_key, &request).await?;
        extract_text(&value).ok_or_else(|| parse_error(PROVIDER, "no message content in output"))
    }
}

/// Read the answer text from a generation response.
///
/// `output.choices[0].message.content` is a string for text generation and
/// a list of `{"text": …}` items for multimodal generation. Older
/// text-format responses put the answer in `output.text`.
fn extract_text(value: &Value) -> Option<String> {
    let output = value.get("output")?;
    if let Some(content) = output.pointer("/choices/0/message/content") {
        return match content {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|i| i.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(""),
            ),
            _ => None,
        };
    }
    output.get("text").and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl ModelGateway for DashScopeGateway {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip_all, fields(model))]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ModelError> {
        let model = options.model.as_deref().unwrap_or(&self.text_model);
        tracing::Span::current().record("model", model);
        self.generate("text-generation", model, messages.to_vec(), options)
            .await
    }

    #[instrument(skip_all, fields(model, images = image_paths.len()))]
    async fn complete_with_image(
        &self,
        messages: &[ChatMessage],
        image_paths: &[PathBuf],
        options: &CompletionOptions,
    ) -> Result<String, ModelError> {
        let model = options.model.as_deref().unwrap_or(&self.vision_model);
        tracing::Span::current().record("model", model);

        let mut content: Vec<MultimodalItem> = messages
            .iter()
            .map(|m| MultimodalItem::Text {
                text: m.content.clone(),
            })
            .collect();
        for path in image_paths {
            content.push(MultimodalItem::Image {
                image: encode_image_file(path).await?,
            });
        }

        let message = MultimodalMessage {
            role: "user",
            content,
        };
        self.generate("multimodal-generation", model, vec![message], options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::test_support::serve;
    use axum::http::StatusCode;
    use serde_json::json;

    fn gateway(base: &str) -> DashScopeGateway {
        DashScopeGateway::new(reqwest::Client::new(), "sk-test", base, "qwen-plus", "qwen-vl-max")
    }

    #[test]
    fn extract_text_shapes() {
        let text = json!({"output":{"choices":[{"message":{"role":"assistant","content":"ok"}}]}});
        assert_eq!(extract_text(&text).as_deref(), Some("ok"));

        let mm = json!({"output":{"choices":[{"message":{"content":[{"text":"a "},{"text":"b"}]}}]}});
        assert_eq!(extract_text(&mm).as_deref(), Some("a b"));

        let legacy = json!({"output":{"text":"old"}});
        assert_eq!(extract_text(&legacy).as_deref(), Some("old"));

        assert!(extract_text(&json!({"request_id":"x"})).is_none());
    }

    #[tokio::test]
    async fn text_generation_request_shape() {
        let (base, seen) = serve(
            StatusCode::OK,
            json!({"output":{"choices":[{"message":{"content":"译文"}}]}}),
        )
        .await;

        let out = gateway(&base)
            .complete(
                &[ChatMessage::user("translate me")],
                &CompletionOptions::with_temperature(0.3),
            )
            .await
            .unwrap();
        assert_eq!(out, "译文");

        let seen = seen.lock().unwrap();
        let (path, body) = &seen[0];
        assert_eq!(path, "/services/aigc/text-generation/generation");
        assert_eq!(body["model"], "qwen-plus");
        assert_eq!(body["input"]["messages"][0]["content"], "translate me");
        assert_eq!(body["parameters"]["result_format"], "message");
    }

    #[tokio::test]
    async fn multimodal_request_collapses_to_one_user_turn() {
        let (base, seen) = serve(
            StatusCode::OK,
            json!({"output":{"choices":[{"message":{"content":[{"text":"a figure"}]}}]}}),
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("page_2.png");
        std::fs::write(&img, [0x89, b'P', b'N', b'G']).unwrap();

        let out = gateway(&base)
            .complete_with_image(
                &[ChatMessage::user("what is this")],
                &[img],
                &CompletionOptions::default().max_tokens(100),
            )
            .await
            .unwrap();
        assert_eq!(out, "a figure");

        let seen = seen.lock().unwrap();
        let (path, body) = &seen[0];
        assert_eq!(path, "/services/aigc/multimodal-generation/generation");
        assert_eq!(body["model"], "qwen-vl-max");
        let messages = body["input"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        let content = messages[0]["content"].as_array().unwrap();
        assert_eq!(content[0]["text"], "what is this");
        assert!(content[1]["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(body["parameters"]["max_tokens"], 100);
    }

    #[tokio::test]
    async fn error_body_message_is_surfaced() {
        let (base, _) = serve(
            StatusCode::BAD_REQUEST,
            json!({"code":"InvalidParameter","message":"model not found"}),
        )
        .await;
        let err = gateway(&base)
            .complete(&[ChatMessage::user("x")], &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not found"), "got: {err}");
    }

    #[tokio::test]
    async fn missing_image_fails_before_request() {
        let (base, seen) = serve(StatusCode::OK, json!({})).await;
        let err = gateway(&base)
            .complete_with_image(
                &[ChatMessage::user("x")],
                &[PathBuf::from("/nonexistent/page_9.png")],
                &CompletionOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Image { .. }));
        assert!(seen.lock().unwrap().is_empty());
    }
}
