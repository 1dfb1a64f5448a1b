//! Vector store seam and its Qdrant REST implementation.
//!
//! The collection is created lazily on first write with a fixed
//! dimensionality and a cosine index; reads scroll exhaustively with the
//! store's paging cursor.

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::types::{FetchStatus, SamplePair};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PointPayload {
    pub dataset_id: String,
    pub version: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub image_fetch_status: Option<FetchStatus>,
    #[serde(default)]
    pub fallback_used: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self) -> anyhow::Result<()>;

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> anyhow::Result<()>;

    /// All points of one dataset version, vectors and payloads included.
    async fn scroll_points(&self, dataset_id: &str, version: &str)
        -> anyhow::Result<Vec<VectorPoint>>;

    /// Up to `limit` image/caption pairs of one dataset version. Payload
    /// projection only; no vectors travel. Points missing either field are
    /// skipped.
    async fn get_samples(
        &self,
        dataset_id: &str,
        version: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<SamplePair>>;
}

/// Deterministic point id for `(dataset_id, version, index)`. A composite
/// hash folded into a UUID keeps re-ingestion idempotent per slot without
/// the collision surface of a truncated integer hash.
pub fn point_id(dataset_id: &str, version: &str, index: usize) -> String {
    let digest = blake3::hash(format!("{dataset_id}:{version}:{index}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    Uuid::from_bytes(bytes).to_string()
}

pub struct QdrantStore {
    base_url: String,
    collection: String,
    vector_dim: usize,
    client: reqwest::Client,
}

const SCROLL_PAGE: usize = 256;

impl QdrantStore {
    pub fn new(base_url: String, collection: String, vector_dim: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("failed to build qdrant http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
            vector_dim,
            client,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        let url = format!("{}/readyz", self.base_url);
        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<RawPoint>,
    next_page_offset: Option<JsonValue>,
}

#[derive(Deserialize)]
struct RawPoint {
    id: JsonValue,
    #[serde(default)]
    vector: Option<Vec<f32>>,
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self) -> anyhow::Result<()> {
        let resp = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .context("qdrant collection lookup failed")?;
        if resp.status().is_success() {
            return Ok(());
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            bail!("qdrant collection lookup: HTTP {}", resp.status());
        }

        tracing::info!(collection = %self.collection, dim = self.vector_dim, "creating qdrant collection");
        self.client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.vector_dim, "distance": "Cosine" }
            }))
            .send()
            .await
            .context("qdrant collection create failed")?
            .error_for_status()
            .context("qdrant collection create rejected")?;
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> anyhow::Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({
            "points": points
                .iter()
                .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
                .collect::<Vec<_>>()
        });
        let url = format!("{}/points?wait=true", self.collection_url());
        self.client
            .put(url)
            .json(&body)
            .send()
            .await
            .context("qdrant upsert failed")?
            .error_for_status()
            .context("qdrant upsert rejected")?;
        Ok(())
    }

    async fn scroll_points(
        &self,
        dataset_id: &str,
        version: &str,
    ) -> anyhow::Result<Vec<VectorPoint>> {
        let url = format!("{}/points/scroll", self.collection_url());
        let filter = json!({
            "must": [
                { "key": "dataset_id", "match": { "value": dataset_id } },
                { "key": "version", "match": { "value": version } },
            ]
        });

        let mut out = Vec::new();
        let mut offset: Option<JsonValue> = None;
        loop {
            let mut body = json!({
                "filter": filter,
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": true,
            });
            if let Some(cursor) = &offset {
                body["offset"] = cursor.clone();
            }

            let resp: ScrollResponse = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .context("qdrant scroll failed")?
                .error_for_status()
                .context("qdrant scroll rejected")?
                .json()
                .await
                .context("qdrant scroll returned malformed body")?;

            for raw in resp.result.points {
                let (Some(vector), Some(payload)) = (raw.vector, raw.payload) else {
                    continue;
                };
                let id = match raw.id {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                };
                out.push(VectorPoint { id, vector, payload });
            }

            match resp.result.next_page_offset {
                Some(cursor) if !cursor.is_null() => offset = Some(cursor),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn get_samples(
        &self,
        dataset_id: &str,
        version: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<SamplePair>> {
        let url = format!("{}/points/scroll", self.collection_url());
        let body = json!({
            "filter": {
                "must": [
                    { "key": "dataset_id", "match": { "value": dataset_id } },
                    { "key": "version", "match": { "value": version } },
                ]
            },
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });

        let resp: ScrollResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("qdrant sample scroll failed")?
            .error_for_status()
            .context("qdrant sample scroll rejected")?
            .json()
            .await
            .context("qdrant sample scroll returned malformed body")?;

        Ok(resp
            .result
            .points
            .into_iter()
            .filter_map(|raw| {
                let payload = raw.payload?;
                Some(SamplePair {
                    image_url: payload.image_url?,
                    caption: payload.caption?,
                })
            })
            .collect())
    }
}
