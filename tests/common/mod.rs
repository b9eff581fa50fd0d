//! In-process stand-ins for pdfium, the model provider and the screenshot
//! tools, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use paperlens::{
    AppConfig, ChatMessage, CompletionOptions, DocumentMetadata, MemoryTaskStore, ModelError,
    ModelGateway, NoteRenderer, PdfExtractor, RenderError, ScreenshotBackend, Task,
    TaskCoordinator,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const KEY_INFO_JSON: &str = r#"```json
{"title": "Attention Is All You Need", "authors": ["Vaswani"], "abstract": "Transformers.",
 "keywords": ["attention"], "main_contributions": ["Transformer"],
 "methodology": "Self-attention", "main_results": "BLEU 28.4", "conclusions": "Attention suffices."}
```"#;

pub const NOTE_JSON: &str = r#"{"title": "🔥 Attention", "hook": "h", "key_points": ["a", "b"], "highlight": "x", "conclusion": "c"}"#;

/// Extractor reporting a fixed page count for any path.
pub struct FakePdf {
    pub pages: usize,
}

#[async_trait]
impl PdfExtractor for FakePdf {
    async fn page_count(&self, _path: &Path) -> usize {
        self.pages
    }

    async fn metadata(&self, _path: &Path) -> DocumentMetadata {
        DocumentMetadata {
            title: "Fake paper".into(),
            page_count: self.pages,
            ..Default::default()
        }
    }

    async fn extract_text(&self, _path: &Path, _pages: Option<&[usize]>) -> BTreeMap<usize, String> {
        (1..=self.pages)
            .map(|n| (n, format!("text of page {n}")))
            .collect()
    }

    async fn rasterize(&self, _path: &Path, _dir: &Path, _pages: Option<&[usize]>) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Gateway answering by prompt shape, optionally slowly. Panics on any
/// prompt containing `panic_on`.
#[derive(Default)]
pub struct FakeGateway {
    pub delay: Option<Duration>,
    pub panic_on: Option<&'static str>,
    pub calls: AtomicUsize,
}

impl FakeGateway {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelGateway for FakeGateway {
    fn provider(&self) -> &'static str {
        "fake"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let prompt = &messages[messages.len() - 1].content;
        if let Some(needle) = self.panic_on.filter(|n| prompt.contains(n)) {
            panic!("gateway blew up on {needle:?}");
        }
        let reply = if prompt.contains("return it as JSON") {
            KEY_INFO_JSON.to_string()
        } else if prompt.contains("structured content of a social-media note") {
            NOTE_JSON.to_string()
        } else if prompt.starts_with("Translate") {
            prompt.rsplit("\n\n").next().unwrap_or_default().to_string()
        } else {
            "generated text".to_string()
        };
        Ok(reply)
    }

    async fn complete_with_image(
        &self,
        messages: &[ChatMessage],
        _images: &[PathBuf],
        options: &CompletionOptions,
    ) -> Result<String, ModelError> {
        self.complete(messages, options).await
    }
}

/// Screenshot backend writing a PNG signature instead of a real image.
#[derive(Default)]
pub struct FakeShot {
    pub fail: bool,
}

#[async_trait]
impl ScreenshotBackend for FakeShot {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn capture(
        &self,
        _html: &str,
        output: &Path,
        _width: u32,
        _height: u32,
    ) -> Result<(), RenderError> {
        if self.fail {
            return Err(RenderError::Backend {
                backend: "fake",
                detail: "no display".into(),
            });
        }
        tokio::fs::write(output, b"\x89PNG\r\n\x1a\n")
            .await
            .map_err(|e| RenderError::Backend {
                backend: "fake",
                detail: e.to_string(),
            })
    }
}

pub fn config(root: &Path) -> AppConfig {
    AppConfig::builder()
        .root_dir(root)
        .max_pages(10)
        .build()
        .unwrap()
}

pub fn coordinator(
    config: AppConfig,
    pdf: FakePdf,
    gateway: Arc<FakeGateway>,
    shot: FakeShot,
) -> Arc<TaskCoordinator> {
    let renderer = NoteRenderer::from_config(&config).with_backends(Arc::new(shot), None);
    Arc::new(TaskCoordinator::new(
        Arc::new(config),
        Arc::new(MemoryTaskStore::new()),
        Arc::new(pdf),
        gateway,
        renderer,
    ))
}

/// Poll until the task reaches a terminal state.
pub async fn wait_terminal(coordinator: &TaskCoordinator, task_id: &str) -> Task {
    for _ in 0..500 {
        let task = coordinator.status(task_id).unwrap();
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not finish");
}
