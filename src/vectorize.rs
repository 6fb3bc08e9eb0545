use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::db;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Chunking & averaging ──

/// Split text into fixed-size, non-overlapping character chunks; the last
/// chunk may be shorter. Concatenating the chunks reconstructs the input.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Element-wise arithmetic mean of the chunk vectors. `None` when no chunk
/// succeeded: a record without a real vector stays pending, it never gets
/// an all-zero placeholder.
pub fn average_embeddings(embeddings: &[Vec<f32>]) -> Option<Vec<f32>> {
    let dim = embeddings.first()?.len();
    let mut sum = vec![0f64; dim];
    for e in embeddings {
        for (s, v) in sum.iter_mut().zip(e) {
            *s += *v as f64;
        }
    }
    let n = embeddings.len() as f64;
    Some(sum.into_iter().map(|s| (s / n) as f32).collect())
}

// ── Embedding provider ──

/// External embedding provider: text in, fixed-dimension vector out,
/// fallible per call.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Google Generative Language `embedContent` client.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    dimension: usize,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, endpoint: String, model: String, dimension: usize) -> Result<Self> {
        ensure!(!api_key.trim().is_empty(), "missing embedding API key");
        ensure!(!model.trim().is_empty(), "missing embedding model name");
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build embedding HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/{}:embedContent?key={}", self.endpoint, self.model, self.api_key);
        let request = EmbedContentRequest {
            model: &self.model,
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type: "RETRIEVAL_DOCUMENT",
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("embedding request failed ({}): {}", status, body);
        }

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .context("failed to parse embedding response")?;
        let values = parsed.embedding.values;
        ensure!(
            values.len() == self.dimension,
            "provider returned {} dims, expected {}",
            values.len(),
            self.dimension
        );
        Ok(values)
    }
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    #[serde(rename = "taskType")]
    task_type: &'a str,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbedValues,
}

#[derive(Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

// ── Batch loop ──

pub struct VectorizeReport {
    pub embedded: usize,
    pub skipped: usize,
    pub batches: usize,
}

/// Pull bounded batches of unembedded records until none remain, attaching
/// one averaged vector per record. Idempotent and resumable: embedded
/// records are never re-selected, and a crash mid-record leaves it pending.
/// A sweep that embeds nothing ends the run so permanently failing records
/// wait for the next invocation instead of spinning.
pub async fn run(conn: &Connection, embedder: &dyn Embedder, cfg: &Config) -> Result<VectorizeReport> {
    ensure!(
        embedder.dimension() == cfg.vector_dim,
        "embedder produces {} dims but the store expects {}",
        embedder.dimension(),
        cfg.vector_dim
    );

    let total = db::count_total(conn)?;
    let pending_at_start = db::count_pending(conn)?;
    info!(
        "Vectorizing: {} records total, {} pending",
        total, pending_at_start
    );

    let pb = ProgressBar::new(pending_at_start as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut report = VectorizeReport {
        embedded: 0,
        skipped: 0,
        batches: 0,
    };

    loop {
        let batch = db::fetch_pending(conn, cfg.batch_size)?;
        if batch.is_empty() {
            info!("No norms pending vectorization.");
            break;
        }
        report.batches += 1;

        let mut progressed = 0usize;
        for norm in &batch {
            match vectorize_one(conn, embedder, cfg, norm).await? {
                true => {
                    progressed += 1;
                    pb.inc(1);
                }
                false => {
                    warn!("id={} could not be vectorized; left pending", norm.id);
                    report.skipped += 1;
                }
            }
        }
        report.embedded += progressed;

        let pending = db::count_pending(conn)?;
        let done = total.saturating_sub(pending);
        let pct = if total > 0 {
            done as f64 / total as f64 * 100.0
        } else {
            100.0
        };
        info!(
            "Progress: {}/{} records vectorized ({:.1}%), {} pending",
            done, total, pct, pending
        );

        if progressed == 0 {
            warn!(
                "Batch made no progress; {} records stay pending for the next run",
                pending
            );
            break;
        }
    }

    pb.finish_and_clear();
    Ok(report)
}

/// Chunk, embed, average, write back. Returns whether a vector was written.
async fn vectorize_one(
    conn: &Connection,
    embedder: &dyn Embedder,
    cfg: &Config,
    norm: &db::PendingNorm,
) -> Result<bool> {
    let chunks = chunk_text(&norm.clean_text, cfg.chunk_size);
    let mut vectors = Vec::with_capacity(chunks.len());

    for (i, chunk) in chunks.iter().enumerate() {
        match embedder.embed(chunk).await {
            Ok(v) if v.len() == cfg.vector_dim => vectors.push(v),
            Ok(v) => warn!(
                "Chunk {}/{} for id={} returned {} dims (expected {}), excluded",
                i + 1,
                chunks.len(),
                norm.id,
                v.len(),
                cfg.vector_dim
            ),
            Err(e) => warn!(
                "Embedding failed on chunk {}/{} for id={}: {}",
                i + 1,
                chunks.len(),
                norm.id,
                e
            ),
        }
        // Provider rate limit.
        tokio::time::sleep(cfg.embed_delay).await;
    }

    match average_embeddings(&vectors) {
        Some(avg) => {
            db::update_embedding(conn, norm.id, &avg, cfg.vector_dim)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{NormInput, NormRecord};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> Config {
        Config {
            db_path: "unused".into(),
            results_dir: "unused".into(),
            embed_api_key: None,
            embed_endpoint: "http://localhost".into(),
            embed_model: "test".into(),
            vector_dim: 2,
            chunk_size: 4,
            batch_size: 10,
            embed_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            wait_timeout: Duration::ZERO,
        }
    }

    struct FakeEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeEmbedder {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("provider unavailable");
            }
            // Alternate unit vectors so the average is observable.
            Ok(if n % 2 == 0 {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            })
        }
    }

    fn seeded_conn(texts: &[(&str, &str)]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        for (name, text) in texts {
            let input = NormInput {
                name: Some(name.to_string()),
                ..NormInput::from_url("https://example.org")
            };
            let rec = NormRecord::success(&input, text.to_string(), json!({"html": []}), None);
            db::upsert(&conn, &rec).unwrap();
        }
        conn
    }

    #[test]
    fn chunking_reconstructs_text() {
        let text = "áéíóú".repeat(5); // 25 chars, multibyte
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks.len(), 3); // ceil(25/10)
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks[1].chars().count(), 10);
        assert_eq!(chunks[2].chars().count(), 5);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunking_exact_multiple_and_empty() {
        assert_eq!(chunk_text("abcd", 2), vec!["ab", "cd"]);
        assert!(chunk_text("", 2).is_empty());
    }

    #[test]
    fn averaging_unit_vectors() {
        let avg = average_embeddings(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(avg, vec![0.5, 0.5]);
    }

    #[test]
    fn averaging_nothing_is_none() {
        assert!(average_embeddings(&[]).is_none());
    }

    #[tokio::test]
    async fn run_embeds_all_pending_records() {
        let conn = seeded_conn(&[("ley-1", "abcdefgh"), ("ley-2", "xy")]);
        let embedder = FakeEmbedder::new(false);
        let report = run(&conn, &embedder, &test_config()).await.unwrap();

        assert_eq!(report.embedded, 2);
        assert_eq!(db::count_pending(&conn).unwrap(), 0);
        // "abcdefgh" with chunk size 4 is two chunks: [1,0] and [0,1].
        let first = db::fetch_embedding(&conn, 1).unwrap().unwrap();
        assert_eq!(first, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn second_run_performs_zero_writes() {
        let conn = seeded_conn(&[("ley-1", "abcd")]);
        let cfg = test_config();

        let embedder = FakeEmbedder::new(false);
        run(&conn, &embedder, &cfg).await.unwrap();
        let calls_after_first = embedder.calls.load(Ordering::SeqCst);

        let report = run(&conn, &embedder, &cfg).await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn failing_provider_leaves_records_pending_and_terminates() {
        let conn = seeded_conn(&[("ley-1", "abcd")]);
        let embedder = FakeEmbedder::new(true);
        let report = run(&conn, &embedder, &test_config()).await.unwrap();

        assert_eq!(report.embedded, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(db::count_pending(&conn).unwrap(), 1);
        assert!(db::fetch_embedding(&conn, 1).unwrap().is_none());
    }

    #[tokio::test]
    async fn gemini_embedder_parses_response() {
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/test:embedContent");
                then.status(200)
                    .json_body(json!({"embedding": {"values": [0.25, 0.75]}}));
            })
            .await;

        let embedder = GeminiEmbedder::new(
            "key".into(),
            server.url(""),
            "models/test".into(),
            2,
        )
        .unwrap();
        let v = embedder.embed("texto").await.unwrap();
        assert_eq!(v, vec![0.25, 0.75]);
    }

    #[tokio::test]
    async fn gemini_embedder_rejects_wrong_dimension() {
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/test:embedContent");
                then.status(200)
                    .json_body(json!({"embedding": {"values": [0.25]}}));
            })
            .await;

        let embedder = GeminiEmbedder::new(
            "key".into(),
            server.url(""),
            "models/test".into(),
            2,
        )
        .unwrap();
        assert!(embedder.embed("texto").await.is_err());
    }
}
