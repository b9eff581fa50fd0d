//! Note image rendering: render a Jinja template to HTML, then screenshot it.
//!
//! The primary backend is `wkhtmltoimage`; the secondary, when the `browser`
//! feature is enabled, is headless Chromium. A render fails only when both
//! backends fail, and the error carries both messages.

mod backends;
pub mod template;

#[cfg(feature = "browser")]
pub use backends::Chromium;
pub use backends::{ScreenshotBackend, Wkhtmltoimage};

use crate::config::AppConfig;
use crate::content::DEFAULT_NOTE_TITLE;
use crate::error::RenderError;
use crate::output::StructuredNote;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Turns structured notes into PNG images.
#[derive(Clone)]
pub struct NoteRenderer {
    primary: Arc<dyn ScreenshotBackend>,
    secondary: Option<Arc<dyn ScreenshotBackend>>,
    template: Option<PathBuf>,
    width: u32,
    height: u32,
}

impl NoteRenderer {
    /// Renderer with the default backends and the configured size and
    /// template.
    pub fn from_config(config: &AppConfig) -> Self {
        #[cfg(feature = "browser")]
        let secondary: Option<Arc<dyn ScreenshotBackend>> = Some(Arc::new(Chromium));
        #[cfg(not(feature = "browser"))]
        let secondary: Option<Arc<dyn ScreenshotBackend>> = None;

        Self {
            primary: Arc::new(Wkhtmltoimage),
            secondary,
            template: config.note_template.clone(),
            width: config.note_width,
            height: config.note_height,
        }
    }

    /// Replace the screenshot backends.
    pub fn with_backends(
        mut self,
        primary: Arc<dyn ScreenshotBackend>,
        secondary: Option<Arc<dyn ScreenshotBackend>>,
    ) -> Self {
        self.primary = primary;
        self.secondary = secondary;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Render `note` into `output_path`.
    pub async fn render(
        &self,
        note: &StructuredNote,
        output_path: &Path,
    ) -> Result<PathBuf, RenderError> {
        let context = template::NoteContext::new(note, DEFAULT_NOTE_TITLE, self.width, self.height);
        let (name, source) = self.load_template(self.template.as_deref()).await?;
        let html = template::render(&name, &source, &context)?;
        self.capture(&html, output_path).await
    }

    /// Render arbitrary fields into a template.
    ///
    /// Every field is exposed under its key, lists included, so templates can
    /// loop with `{% for %}`. `title`, `width` and `height` are always set.
    /// `template` overrides the configured template for this call.
    pub async fn render_custom(
        &self,
        title: &str,
        fields: &HashMap<String, Value>,
        output_path: &Path,
        template: Option<&Path>,
    ) -> Result<PathBuf, RenderError> {
        let mut context = fields.clone();
        context.insert("title".into(), Value::from(title));
        context.insert("width".into(), Value::from(self.width));
        context.insert("height".into(), Value::from(self.height));

        let (name, source) = self
            .load_template(template.or(self.template.as_deref()))
            .await?;
        let html = template::render(&name, &source, &context)?;
        self.capture(&html, output_path).await
    }

    /// Custom template if given and present, else the built-in one. Returns
    /// the template's name and source.
    async fn load_template(&self, custom: Option<&Path>) -> Result<(String, String), RenderError> {
        match custom {
            Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => {
                let source = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| RenderError::Template {
                        path: path.to_path_buf(),
                        source,
                    })?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| template::DEFAULT_TEMPLATE_NAME.to_string());
                Ok((name, source))
            }
            Some(path) => {
                warn!(
                    "Template {} not found, using the built-in layout",
                    path.display()
                );
                Ok(default_template())
            }
            None => Ok(default_template()),
        }
    }

    async fn capture(&self, html: &str, output_path: &Path) -> Result<PathBuf, RenderError> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| RenderError::OutputDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let primary_err = match self
            .primary
            .capture(html, output_path, self.width, self.height)
            .await
        {
            Ok(()) => {
                info!("Note image written by {}", self.primary.name());
                return Ok(output_path.to_path_buf());
            }
            Err(e) => {
                warn!("{} failed: {}", self.primary.name(), e);
                e
            }
        };

        let Some(secondary) = &self.secondary else {
            return Err(RenderError::AllBackendsFailed {
                primary: primary_err.to_string(),
                secondary: "no secondary backend available".into(),
            });
        };

        match secondary
            .capture(html, output_path, self.width, self.height)
            .await
        {
            Ok(()) => {
                info!("Note image written by {}", secondary.name());
                Ok(output_path.to_path_buf())
            }
            Err(e) => {
                warn!("{} failed: {}", secondary.name(), e);
                Err(RenderError::AllBackendsFailed {
                    primary: primary_err.to_string(),
                    secondary: e.to_string(),
                })
            }
        }
    }
}

fn default_template() -> (String, String) {
    (
        template::DEFAULT_TEMPLATE_NAME.to_string(),
        template::DEFAULT_TEMPLATE.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Writes the HTML it was given instead of a PNG.
    #[derive(Default)]
    struct HtmlDump {
        fail: bool,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ScreenshotBackend for HtmlDump {
        fn name(&self) -> &'static str {
            "dump"
        }

        async fn capture(
            &self,
            html: &str,
            output: &Path,
            _width: u32,
            _height: u32,
        ) -> Result<(), RenderError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(RenderError::Backend {
                    backend: "dump",
                    detail: "refused".into(),
                });
            }
            tokio::fs::write(output, html).await.map_err(|e| RenderError::Backend {
                backend: "dump",
                detail: e.to_string(),
            })
        }
    }

    fn renderer(primary: Arc<HtmlDump>, secondary: Option<Arc<HtmlDump>>) -> NoteRenderer {
        let config = AppConfig::builder().build().unwrap();
        NoteRenderer::from_config(&config).with_backends(
            primary,
            secondary.map(|s| s as Arc<dyn ScreenshotBackend>),
        )
    }

    #[tokio::test]
    async fn render_fills_default_template() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/note.png");
        let note = StructuredNote {
            title: "T & A".into(),
            key_points: vec!["one".into(), "two".into()],
            ..Default::default()
        };

        let path = renderer(Arc::new(HtmlDump::default()), None)
            .render(&note, &out)
            .await
            .unwrap();
        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("<h1>T &amp; A</h1>"));
        assert!(html.contains("<li>one</li>"));
        assert!(html.contains("width: 1080px"));
        assert!(!html.contains("{{"));
        assert!(!html.contains("{%"));
    }

    #[tokio::test]
    async fn configured_template_loops_over_key_points() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = dir.path().join("list.html");
        std::fs::write(
            &tpl,
            "<h2>{{ title }}</h2><ol>{% for p in key_points %}<li>{{ loop.index }}. {{ p }}</li>{% endfor %}</ol>",
        )
        .unwrap();
        let config = AppConfig::builder().note_template(&tpl).build().unwrap();
        let renderer = NoteRenderer::from_config(&config)
            .with_backends(Arc::new(HtmlDump::default()), None);

        let note = StructuredNote {
            title: "Q&A".into(),
            key_points: vec!["x < y".into(), "<b>bold</b>".into()],
            ..Default::default()
        };
        let out = dir.path().join("n.png");
        renderer.render(&note, &out).await.unwrap();
        let html = std::fs::read_to_string(&out).unwrap();
        assert!(html.starts_with("<h2>Q&amp;A</h2><ol><li>1. x &lt; y</li>"), "got: {html}");
        assert!(html.contains("<li>2. &lt;b&gt;bold"), "got: {html}");
        assert!(html.ends_with("</ol>"));
    }

    #[tokio::test]
    async fn custom_fields_can_be_lists() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = dir.path().join("tags.html");
        std::fs::write(&tpl, "{% for t in tags %}[{{ t }}]{% endfor %}").unwrap();

        let fields = HashMap::from([(
            "tags".to_string(),
            serde_json::json!(["nlp", "a & b"]),
        )]);
        let out = dir.path().join("tags.png");
        renderer(Arc::new(HtmlDump::default()), None)
            .render_custom("T", &fields, &out, Some(&tpl))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "[nlp][a &amp; b]");
    }

    #[tokio::test]
    async fn secondary_used_when_primary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let primary = Arc::new(HtmlDump {
            fail: true,
            ..Default::default()
        });
        let secondary = Arc::new(HtmlDump::default());
        renderer(primary.clone(), Some(secondary.clone()))
            .render(&StructuredNote::default(), &dir.path().join("n.png"))
            .await
            .unwrap();
        assert_eq!(*primary.calls.lock().unwrap(), 1);
        assert_eq!(*secondary.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn both_failing_reports_both() {
        let dir = tempfile::tempdir().unwrap();
        let failing = || {
            Arc::new(HtmlDump {
                fail: true,
                ..Default::default()
            })
        };
        let err = renderer(failing(), Some(failing()))
            .render(&StructuredNote::default(), &dir.path().join("n.png"))
            .await
            .unwrap_err();
        match err {
            RenderError::AllBackendsFailed { primary, secondary } => {
                assert!(primary.contains("refused"));
                assert!(secondary.contains("refused"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn custom_template_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = dir.path().join("card.html");
        std::fs::write(&tpl, "<h2>{{title}}</h2><p>{{venue}}</p><i>{{width}}</i>").unwrap();

        let fields = HashMap::from([("venue".to_string(), Value::from("NeurIPS <2017>"))]);
        let out = dir.path().join("custom.png");
        renderer(Arc::new(HtmlDump::default()), None)
            .render_custom("Title", &fields, &out, Some(&tpl))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "<h2>Title</h2><p>NeurIPS &lt;2017&gt;</p><i>1080</i>"
        );
    }

    #[tokio::test]
    async fn missing_custom_template_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("n.png");
        renderer(Arc::new(HtmlDump::default()), None)
            .render_custom("X", &HashMap::new(), &out, Some(&dir.path().join("nope.html")))
            .await
            .unwrap();
        assert!(std::fs::read_to_string(&out).unwrap().contains("<h1>X</h1>"));
    }
}
