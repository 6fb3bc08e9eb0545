use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, REFERER, USER_AGENT};
use serde_json::Value;
use tracing::info;

use super::html::flatten_fragment;
use super::ExtractStrategy;
use crate::classifier::{classify, Classification};
use crate::record::{NormInput, NormRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extracts norms through the structured LeyChile JSON API.
pub struct StructuredApiExtractor {
    client: reqwest::Client,
}

impl StructuredApiExtractor {
    /// The upstream API rejects default HTTP clients, so the request
    /// carries a realistic browser header set.
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36",
            ),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-ES,es;q=0.9"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.bcn.cl/"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .context("failed to build API HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ExtractStrategy for StructuredApiExtractor {
    fn name(&self) -> &'static str {
        "leychile-api"
    }

    async fn extract(&self, input: &NormInput) -> NormRecord {
        let endpoint = match classify(&input.public_url) {
            Classification::StructuredApi { endpoint }
            | Classification::StructuredPublic { endpoint } => endpoint,
            Classification::MissingNormId => {
                return NormRecord::failure(
                    input,
                    "no idNorma query parameter found in public URL",
                );
            }
            Classification::Unstructured => {
                return NormRecord::failure(
                    input,
                    "URL not recognized as a LeyChile public or API URL",
                );
            }
        };

        info!("[{}] fetching {}", self.name(), endpoint);
        let response = match self.client.get(&endpoint).send().await {
            Ok(r) => r,
            Err(e) => return NormRecord::failure(input, format!("request failed: {e}")),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return NormRecord::failure(input, format!("failed to read response: {e}")),
        };

        if !status.is_success() {
            return NormRecord::failure_with_body(input, format!("HTTP {}", status.as_u16()), body);
        }

        let payload: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) => {
                return NormRecord::failure_with_body(
                    input,
                    "API did not return valid JSON (possible block or error page)",
                    body,
                );
            }
        };

        match flatten_payload(&payload) {
            Some(clean_text) => NormRecord::success(input, clean_text, payload, Some(endpoint)),
            // A JSON body with no fragment list is a broken structural
            // assumption, not an empty document.
            None => NormRecord::failure(
                input,
                "no HTML fragment list found under 'data.html' or 'html'",
            ),
        }
    }
}

/// Locate the HTML-fragment list at one of the two known payload shapes and
/// flatten each fragment's `t` markup to text. `None` when neither shape is
/// present or the list is empty; an empty list is the same broken structure
/// as a missing one.
fn flatten_payload(payload: &Value) -> Option<String> {
    let fragments = payload
        .get("data")
        .and_then(|d| d.get("html"))
        .or_else(|| payload.get("html"))?
        .as_array()
        .filter(|f| !f.is_empty())?;

    let texts: Vec<String> = fragments
        .iter()
        .filter_map(|f| f.get("t").and_then(|t| t.as_str()))
        .map(flatten_fragment)
        .filter(|t| !t.is_empty())
        .collect();

    Some(texts.join("\n\n"))
}
