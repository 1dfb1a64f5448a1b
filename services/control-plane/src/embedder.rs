//! Embedding provider seam.
//!
//! `HttpEmbedder` talks to a text-embeddings sidecar; `HashEmbedder` is the
//! deterministic fallback for environments without one. Both return one
//! result per input pair, in input order, with equal-length vectors.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::types::FetchStatus;

#[derive(Clone, Debug)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub fetch_status: FetchStatus,
    pub used_fallback: bool,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(
        &self,
        image_urls: &[String],
        captions: &[String],
    ) -> anyhow::Result<Vec<Embedding>>;
}

/// Deterministic pseudo-embedding: SHA-256 of the caption cycled out to the
/// target dimension and mapped into [-1, 1]. Same caption, same vector.
fn pseudo_embedding(text: &str, dim: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    digest
        .iter()
        .cycle()
        .take(dim)
        .map(|b| (f32::from(*b) / 255.0) * 2.0 - 1.0)
        .collect()
}

pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(
        &self,
        _image_urls: &[String],
        captions: &[String],
    ) -> anyhow::Result<Vec<Embedding>> {
        Ok(captions
            .iter()
            .map(|caption| Embedding {
                vector: pseudo_embedding(caption, self.dim),
                fetch_status: FetchStatus::Ok,
                used_fallback: true,
            })
            .collect())
    }
}

/// Client for a text-embedding HTTP service (`POST /embed`, TEI-style).
/// Captions drive the embedding; image bytes are not fetched here. When the
/// batch request fails, items are retried one by one and only the ones that
/// still fail degrade to hash fallbacks, so `fetch_status` stays per item.
pub struct HttpEmbedder {
    base_url: String,
    dim: usize,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(base_url: String, dim: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            dim,
            client: reqwest::Client::new(),
        }
    }

    async fn request_batch(&self, captions: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url);
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "inputs": captions }))
            .send()
            .await?
            .error_for_status()?;
        let vectors: Vec<Vec<f32>> = resp.json().await?;
        if vectors.len() != captions.len() {
            anyhow::bail!(
                "embedding service returned {} vectors for {} inputs",
                vectors.len(),
                captions.len()
            );
        }
        Ok(vectors)
    }

    async fn request_single(&self, caption: &str) -> anyhow::Result<Vec<f32>> {
        let inputs = [caption.to_string()];
        let mut vectors = self.request_batch(&inputs).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding service returned an empty batch"))
    }
}

/// One embedding per input, in input order: a successful result is used
/// as-is, a failed one becomes that item's hash fallback.
fn resolve_items(
    captions: &[String],
    dim: usize,
    results: Vec<anyhow::Result<Vec<f32>>>,
) -> Vec<Embedding> {
    captions
        .iter()
        .zip(results)
        .map(|(caption, result)| match result {
            Ok(vector) => Embedding {
                vector,
                fetch_status: FetchStatus::Ok,
                used_fallback: false,
            },
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed for one item, using hash fallback");
                Embedding {
                    vector: pseudo_embedding(caption, dim),
                    fetch_status: FetchStatus::Fail,
                    used_fallback: true,
                }
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(
        &self,
        _image_urls: &[String],
        captions: &[String],
    ) -> anyhow::Result<Vec<Embedding>> {
        match self.request_batch(captions).await {
            Ok(vectors) => Ok(resolve_items(
                captions,
                self.dim,
                vectors.into_iter().map(Ok).collect(),
            )),
            Err(e) => {
                tracing::warn!(error = %e, "embedding batch failed, retrying items individually");
                let mut results = Vec::with_capacity(captions.len());
                for caption in captions {
                    results.push(self.request_single(caption).await);
                }
                Ok(resolve_items(captions, self.dim, results))
            }
        }
    }
}
