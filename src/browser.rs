use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A controlled browser session. Extraction strategies only see this trait,
/// so tests run against fakes instead of a live Chromium.
///
/// `wait_for` and `inner_text` take JavaScript probe expressions; this is
/// what lets the LeyChile extractor reach into the content iframe.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    /// Wait until `probe` evaluates truthy, bounded by `timeout`. The wait
    /// is cancellable: on timeout it returns an error instead of hanging.
    async fn wait_for(&self, probe: &str, timeout: Duration) -> Result<()>;
    /// Full rendered document HTML.
    async fn body_html(&self) -> Result<String>;
    /// `innerText` of the element `expr` resolves to.
    async fn inner_text(&self, expr: &str) -> Result<String>;
    async fn screenshot(&self, path: &Path) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Chromium-backed session. One exclusively-owned instance per extraction
/// run; `close` must be called on every exit path.
pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumBrowser {
    pub async fn launch() -> Result<Self> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .build()
            .map_err(|e| anyhow!("invalid browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch browser")?;

        // The handler drives the CDP websocket until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open browser page")?;

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler_task,
        })
    }
}

#[async_trait]
impl BrowserSession for ChromiumBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        self.page
            .wait_for_navigation()
            .await
            .with_context(|| format!("navigation to {url} did not settle"))?;
        Ok(())
    }

    async fn wait_for(&self, probe: &str, timeout: Duration) -> Result<()> {
        let check = format!("Boolean({probe})");
        let poll = async {
            loop {
                let found = self
                    .page
                    .evaluate(check.as_str())
                    .await
                    .ok()
                    .and_then(|v| v.into_value::<bool>().ok())
                    .unwrap_or(false);
                if found {
                    return;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| anyhow!("timed out after {}s waiting for {probe}", timeout.as_secs()))
    }

    async fn body_html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .context("failed to read page content")
    }

    async fn inner_text(&self, expr: &str) -> Result<String> {
        let js = format!("({expr}).innerText");
        self.page
            .evaluate(js.as_str())
            .await
            .with_context(|| format!("evaluation of {expr} failed"))?
            .into_value::<String>()
            .with_context(|| format!("{expr} produced no text"))
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
                path,
            )
            .await
            .with_context(|| format!("failed to save screenshot to {}", path.display()))?;
        debug!("Screenshot saved: {}", path.display());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close browser")?;
        browser.wait().await.context("browser did not exit")?;
        self.handler_task.abort();
        Ok(())
    }
}
