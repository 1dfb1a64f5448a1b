use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,

    pub qdrant_url: String,
    pub collection: String,
    pub vector_dim: usize,

    /// Minimum record count the L1 volume check expects per version.
    pub expected_min_volume: usize,

    /// Optional text-embedding sidecar; hash fallback when unset.
    pub embed_url: Option<String>,

    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub audit_timeout: Duration,

    /// How many ranked outliers are handed to the audit.
    pub outlier_limit: usize,

    pub seed_demo: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let qdrant_url = get("QDRANT_URL")?;
        let collection =
            std::env::var("QDRANT_COLLECTION").unwrap_or_else(|_| "alignops_vectors".to_string());
        let vector_dim = get_parsed("VECTOR_DIM", 768usize)?;

        let expected_min_volume = get_parsed("L1_EXPECTED_MIN_VOLUME", 10usize)?;

        let embed_url = std::env::var("EMBED_URL").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();
        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
        let gemini_base_url = std::env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
        let audit_timeout = Duration::from_secs(get_parsed("AUDIT_TIMEOUT_SECS", 30u64)?);

        let outlier_limit = get_parsed("OUTLIER_SAMPLE_LIMIT", 5usize)?;

        let seed_demo = std::env::var("SEED_DEMO")
            .ok()
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(false);

        let bind_addr =
            std::env::var("GATE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Tiny sanity checks (fail fast, fail loud)
        if !qdrant_url.starts_with("http://") && !qdrant_url.starts_with("https://") {
            bail!("QDRANT_URL must start with http:// or https://");
        }
        if vector_dim == 0 {
            bail!("VECTOR_DIM must be positive");
        }

        Ok(Self {
            bind_addr,
            qdrant_url,
            collection,
            vector_dim,
            expected_min_volume,
            embed_url,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            audit_timeout,
            outlier_limit,
            seed_demo,
        })
    }
}

fn get(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Missing required env var: {key}"))
}

fn get_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}
