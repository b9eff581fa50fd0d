//! HTML → PNG screenshot backends.

use crate::error::RenderError;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Renders an HTML document to a PNG of the given size.
#[async_trait]
pub trait ScreenshotBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn capture(
        &self,
        html: &str,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError>;
}

/// The `wkhtmltoimage` command-line tool.
#[derive(Debug, Clone, Default)]
pub struct Wkhtmltoimage;

const WKHTMLTOIMAGE: &str = "wkhtmltoimage";

fn backend_err(backend: &'static str, detail: impl Into<String>) -> RenderError {
    RenderError::Backend {
        backend,
        detail: detail.into(),
    }
}

#[async_trait]
impl ScreenshotBackend for Wkhtmltoimage {
    fn name(&self) -> &'static str {
        WKHTMLTOIMAGE
    }

    async fn capture(
        &self,
        html: &str,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        let binary = which::which(WKHTMLTOIMAGE)
            .map_err(|_| backend_err(WKHTMLTOIMAGE, "not found on PATH"))?;

        let page = tempfile::Builder::new()
            .prefix("note-")
            .suffix(".html")
            .tempfile()
            .map_err(|e| backend_err(WKHTMLTOIMAGE, format!("temp file: {e}")))?;
        tokio::fs::write(page.path(), html)
            .await
            .map_err(|e| backend_err(WKHTMLTOIMAGE, format!("temp file: {e}")))?;

        let out = Command::new(binary)
            .args(["--width", &width.to_string(), "--height", &height.to_string()])
            .args(["--format", "png", "--quiet", "--enable-local-file-access"])
            .arg(page.path())
            .arg(output)
            .output()
            .await
            .map_err(|e| backend_err(WKHTMLTOIMAGE, e.to_string()))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(backend_err(
                WKHTMLTOIMAGE,
                format!("{}: {}", out.status, stderr.trim()),
            ));
        }
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(backend_err(WKHTMLTOIMAGE, "no image was written"));
        }
        debug!("wkhtmltoimage wrote {}", output.display());
        Ok(())
    }
}

#[cfg(feature = "browser")]
pub use chromium::Chromium;

#[cfg(feature = "browser")]
mod chromium {
    use super::{backend_err, ScreenshotBackend};
    use crate::error::RenderError;
    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
    use chromiumoxide::handler::viewport::Viewport;
    use chromiumoxide::page::ScreenshotParams;
    use chromiumoxide::{Browser, BrowserConfig};
    use futures::StreamExt;
    use std::path::Path;
    use tracing::{debug, info};

    const CHROMIUM: &str = "chromium";

    /// Headless Chromium over the DevTools protocol. Launches a fresh
    /// browser per capture.
    #[derive(Debug, Clone, Default)]
    pub struct Chromium;

    #[async_trait]
    impl ScreenshotBackend for Chromium {
        fn name(&self) -> &'static str {
            CHROMIUM
        }

        async fn capture(
            &self,
            html: &str,
            output: &Path,
            width: u32,
            height: u32,
        ) -> Result<(), RenderError> {
            let err = |e: &dyn std::fmt::Display| backend_err(CHROMIUM, e.to_string());

            let config = BrowserConfig::builder()
                .window_size(width, height)
                .viewport(Viewport {
                    width,
                    height,
                    device_scale_factor: None,
                    emulating_mobile: false,
                    is_landscape: false,
                    has_touch: false,
                })
                .no_sandbox()
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .build()
                .map_err(|e| err(&e))?;

            info!("Launching headless Chromium for note capture");
            let (mut browser, mut handler) = Browser::launch(config).await.map_err(|e| err(&e))?;
            let events = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            let shot = async {
                let page = browser.new_page("about:blank").await?;
                page.set_content(html).await?;
                page.save_screenshot(
                    ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .full_page(false)
                        .build(),
                    output,
                )
                .await?;
                let _ = page.close().await;
                Ok::<_, chromiumoxide::error::CdpError>(())
            }
            .await;

            let _ = browser.close().await;
            let _ = browser.wait().await;
            events.abort();

            shot.map_err(|e| err(&e))?;
            debug!("Chromium wrote {}", output.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wkhtmltoimage_reports_its_name_on_failure() {
        // Writing into a missing directory fails whether or not the tool is
        // installed.
        let err = Wkhtmltoimage
            .capture("<p>x</p>", Path::new("/nonexistent/dir/note.png"), 100, 100)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("wkhtmltoimage:"), "got: {err}");
    }
}
