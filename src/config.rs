use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "data/normas.sqlite";
const DEFAULT_RESULTS_DIR: &str = "results";
const DEFAULT_EMBED_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_EMBED_MODEL: &str = "models/embedding-001";

/// Runtime configuration, resolved once from the environment and passed
/// explicitly into component constructors.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub results_dir: PathBuf,
    /// API key for the embedding provider. Only required by `vectorize`.
    pub embed_api_key: Option<String>,
    pub embed_endpoint: String,
    pub embed_model: String,
    /// Expected embedding dimension; vectors of any other length are rejected.
    pub vector_dim: usize,
    /// Characters per chunk submitted to the embedding provider.
    pub chunk_size: usize,
    /// Records pulled per vectorization batch.
    pub batch_size: usize,
    /// Pause between embedding requests (provider rate limit).
    pub embed_delay: Duration,
    /// Settle delay after navigation, for client-side rendering.
    pub settle_delay: Duration,
    /// Upper bound on DOM landmark waits in the rendered path.
    pub wait_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: env_or("NORMA_DB_PATH", DEFAULT_DB_PATH).into(),
            results_dir: env_or("NORMA_RESULTS_DIR", DEFAULT_RESULTS_DIR).into(),
            embed_api_key: std::env::var("GEMINI_API_KEY").ok(),
            embed_endpoint: env_or("EMBED_ENDPOINT", DEFAULT_EMBED_ENDPOINT),
            embed_model: env_or("EMBED_MODEL", DEFAULT_EMBED_MODEL),
            vector_dim: env_parse("VECTOR_DIM", 768),
            chunk_size: env_parse("CHUNK_SIZE", 2000),
            batch_size: env_parse("BATCH_SIZE", 20),
            embed_delay: Duration::from_millis(env_parse("EMBED_DELAY_MS", 500)),
            settle_delay: Duration::from_secs(env_parse("SETTLE_SECS", 3)),
            wait_timeout: Duration::from_secs(env_parse("WAIT_TIMEOUT_SECS", 60)),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
