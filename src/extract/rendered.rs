use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::html::{body_text, normalize_lines};
use super::ExtractStrategy;
use crate::browser::BrowserSession;
use crate::record::{NormInput, NormRecord};

/// Probe for the LeyChile content iframe becoming reachable.
const FRAME_PROBE: &str = "document.getElementById('iFrmNorma') \
     && document.getElementById('iFrmNorma').contentDocument";
/// Probe for the norm text container inside that iframe.
const CONTAINER_PROBE: &str = "document.getElementById('iFrmNorma')\
     .contentDocument.querySelector('div#textoNorma')";

/// Catch-all strategy: render the page, strip boilerplate, keep body text.
pub struct RenderedPageExtractor {
    browser: Arc<dyn BrowserSession>,
    settle_delay: Duration,
}

impl RenderedPageExtractor {
    pub fn new(browser: Arc<dyn BrowserSession>, settle_delay: Duration) -> Self {
        Self {
            browser,
            settle_delay,
        }
    }
}

#[async_trait]
impl ExtractStrategy for RenderedPageExtractor {
    fn name(&self) -> &'static str {
        "rendered-universal"
    }

    async fn extract(&self, input: &NormInput) -> NormRecord {
        let url = &input.public_url;
        info!("[{}] rendering {}", self.name(), url);

        if let Err(e) = self.browser.navigate(url).await {
            return NormRecord::failure(input, format!("navigation failed: {e}"));
        }
        // Give client-side rendering a moment to fill the DOM.
        tokio::time::sleep(self.settle_delay).await;

        let html = match self.browser.body_html().await {
            Ok(h) => h,
            Err(e) => return NormRecord::failure(input, format!("DOM access failed: {e}")),
        };

        let text = body_text(&html);
        if text.is_empty() {
            warn!("No textual content found at {}", url);
            return NormRecord::empty(input);
        }
        NormRecord::success(
            input,
            text,
            json!({"info": "universal rendered extraction, no raw JSON payload"}),
            None,
        )
    }
}

/// LeyChile-specific rendered fallback: the norm text lives in a named
/// iframe, so both the frame and its text container must appear before
/// extraction. A missing landmark is a structural failure for that URL,
/// never a retry.
pub struct LeychileRenderedExtractor {
    browser: Arc<dyn BrowserSession>,
    wait_timeout: Duration,
    /// Pre-extraction screenshot for debugging, best-effort.
    screenshot_path: Option<PathBuf>,
}

impl LeychileRenderedExtractor {
    pub fn new(
        browser: Arc<dyn BrowserSession>,
        wait_timeout: Duration,
        screenshot_path: Option<PathBuf>,
    ) -> Self {
        Self {
            browser,
            wait_timeout,
            screenshot_path,
        }
    }
}

#[async_trait]
impl ExtractStrategy for LeychileRenderedExtractor {
    fn name(&self) -> &'static str {
        "rendered-leychile"
    }

    async fn extract(&self, input: &NormInput) -> NormRecord {
        let url = &input.public_url;
        info!("[{}] rendering {}", self.name(), url);

        if let Err(e) = self.browser.navigate(url).await {
            return NormRecord::failure(input, format!("navigation failed: {e}"));
        }

        if let Some(path) = &self.screenshot_path {
            if let Err(e) = self.browser.screenshot(path).await {
                warn!("Screenshot failed for {}: {}", url, e);
            }
        }

        if let Err(e) = self.browser.wait_for(FRAME_PROBE, self.wait_timeout).await {
            return NormRecord::failure(input, format!("content frame iFrmNorma never appeared: {e}"));
        }
        if let Err(e) = self
            .browser
            .wait_for(CONTAINER_PROBE, self.wait_timeout)
            .await
        {
            return NormRecord::failure(input, format!("container div#textoNorma never appeared: {e}"));
        }

        let raw = match self.browser.inner_text(CONTAINER_PROBE).await {
            Ok(t) => t,
            Err(e) => return NormRecord::failure(input, format!("text extraction failed: {e}")),
        };

        let text = normalize_lines(&raw);
        if text.is_empty() {
            warn!("Norm container at {} was empty", url);
            return NormRecord::empty(input);
        }
        NormRecord::success(
            input,
            text,
            json!({"info": "rendered LeyChile extraction, no raw JSON payload"}),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use std::path::Path;

    #[derive(Default)]
    struct FakeBrowser {
        html: String,
        inner_text: String,
        fail_navigate: bool,
        fail_wait: bool,
    }

    #[async_trait]
    impl BrowserSession for FakeBrowser {
        async fn navigate(&self, url: &str) -> Result<()> {
            if self.fail_navigate {
                Err(anyhow!("net::ERR_NAME_NOT_RESOLVED {url}"))
            } else {
                Ok(())
            }
        }

        async fn wait_for(&self, probe: &str, timeout: Duration) -> Result<()> {
            if self.fail_wait {
                Err(anyhow!(
                    "timed out after {}s waiting for {probe}",
                    timeout.as_secs()
                ))
            } else {
                Ok(())
            }
        }

        async fn body_html(&self) -> Result<String> {
            Ok(self.html.clone())
        }

        async fn inner_text(&self, _expr: &str) -> Result<String> {
            Ok(self.inner_text.clone())
        }

        async fn screenshot(&self, _path: &Path) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn input() -> NormInput {
        NormInput::from_url("https://www.minsal.cl/reglamento/")
    }

    #[tokio::test]
    async fn universal_extracts_clean_body_text() {
        let browser = Arc::new(FakeBrowser {
            html: "<html><body><nav>menu</nav><div> Título </div>\n<p>Cuerpo</p></body></html>"
                .into(),
            ..Default::default()
        });
        let extractor = RenderedPageExtractor::new(browser, Duration::ZERO);
        let rec = extractor.extract(&input()).await;
        assert!(rec.is_successful());
        assert_eq!(rec.clean_text.as_deref(), Some("Título\nCuerpo"));
    }

    #[tokio::test]
    async fn universal_navigation_failure_is_error_record() {
        let browser = Arc::new(FakeBrowser {
            fail_navigate: true,
            ..Default::default()
        });
        let extractor = RenderedPageExtractor::new(browser, Duration::ZERO);
        let rec = extractor.extract(&input()).await;
        assert!(rec.error_reason.as_deref().unwrap().contains("navigation failed"));
    }

    #[tokio::test]
    async fn universal_empty_body_is_empty_not_error() {
        let browser = Arc::new(FakeBrowser {
            html: "<html><body><script>x()</script></body></html>".into(),
            ..Default::default()
        });
        let extractor = RenderedPageExtractor::new(browser, Duration::ZERO);
        let rec = extractor.extract(&input()).await;
        assert!(rec.error_reason.is_none());
        assert!(!rec.is_successful());
    }

    #[tokio::test]
    async fn leychile_wait_timeout_is_terminal_error() {
        let browser = Arc::new(FakeBrowser {
            fail_wait: true,
            ..Default::default()
        });
        let extractor = LeychileRenderedExtractor::new(browser, Duration::from_secs(1), None);
        let rec = extractor.extract(&input()).await;
        assert!(rec
            .error_reason
            .as_deref()
            .unwrap()
            .contains("iFrmNorma never appeared"));
    }

    #[tokio::test]
    async fn leychile_extracts_normalized_frame_text() {
        let browser = Arc::new(FakeBrowser {
            inner_text: "  Ley 16.744  \n\n  Artículo 1.-  \n".into(),
            ..Default::default()
        });
        let extractor = LeychileRenderedExtractor::new(browser, Duration::from_secs(1), None);
        let rec = extractor.extract(&input()).await;
        assert!(rec.is_successful());
        assert_eq!(rec.clean_text.as_deref(), Some("Ley 16.744\nArtículo 1.-"));
    }
}
