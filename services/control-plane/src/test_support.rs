//! In-memory collaborators for pipeline-level tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::embedder::HashEmbedder;
use crate::llm::AuditService;
use crate::state::{AppState, DatasetRegistry, SharedState};
use crate::types::{L2Reasoning, OutlierSample, ReasoningTrace, SamplePair, Status};
use crate::vector_store::{VectorPoint, VectorStore};

#[derive(Default)]
pub struct MemoryVectorStore {
    points: Mutex<Vec<VectorPoint>>,
    pub fail_upserts: bool,
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> anyhow::Result<()> {
        if self.fail_upserts {
            anyhow::bail!("simulated vector store outage");
        }
        let mut stored = self.points.lock().await;
        // same id overwrites, like a real upsert
        for point in points {
            stored.retain(|p| p.id != point.id);
            stored.push(point);
        }
        Ok(())
    }

    async fn scroll_points(
        &self,
        dataset_id: &str,
        version: &str,
    ) -> anyhow::Result<Vec<VectorPoint>> {
        Ok(self
            .points
            .lock()
            .await
            .iter()
            .filter(|p| p.payload.dataset_id == dataset_id && p.payload.version == version)
            .cloned()
            .collect())
    }

    async fn get_samples(
        &self,
        dataset_id: &str,
        version: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<SamplePair>> {
        Ok(self
            .points
            .lock()
            .await
            .iter()
            .filter(|p| p.payload.dataset_id == dataset_id && p.payload.version == version)
            .filter_map(|p| {
                Some(SamplePair {
                    image_url: p.payload.image_url.clone()?,
                    caption: p.payload.caption.clone()?,
                })
            })
            .take(limit)
            .collect())
    }
}

pub struct StaticAudit(pub L2Reasoning);

#[async_trait]
impl AuditService for StaticAudit {
    async fn audit(
        &self,
        _drift: &HashMap<String, f64>,
        _images: &[String],
        _captions: &[String],
        _context: &[OutlierSample],
    ) -> anyhow::Result<L2Reasoning> {
        Ok(self.0.clone())
    }
    fn model_name(&self) -> &str {
        "static-model"
    }
}

pub struct FailingAudit;

#[async_trait]
impl AuditService for FailingAudit {
    async fn audit(
        &self,
        _drift: &HashMap<String, f64>,
        _images: &[String],
        _captions: &[String],
        _context: &[OutlierSample],
    ) -> anyhow::Result<L2Reasoning> {
        anyhow::bail!("connection refused")
    }
    fn model_name(&self) -> &str {
        "failing-model"
    }
}

pub struct HangingAudit;

#[async_trait]
impl AuditService for HangingAudit {
    async fn audit(
        &self,
        _drift: &HashMap<String, f64>,
        _images: &[String],
        _captions: &[String],
        _context: &[OutlierSample],
    ) -> anyhow::Result<L2Reasoning> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!()
    }
    fn model_name(&self) -> &str {
        "hanging-model"
    }
}

pub fn verdict(status: Status, confidence: f64) -> L2Reasoning {
    L2Reasoning {
        model_name: "static-model".into(),
        distribution_drift: HashMap::from([("cosine_mean_shift".to_string(), 0.42)]),
        reasoning_trace: ReasoningTrace {
            summary: "summary".into(),
            key_observations: vec!["obs".into()],
            decision_rationale: "rationale".into(),
            recommended_action: None,
        },
        judgment_summary: "judgment".into(),
        flagged_samples: vec![],
        confidence_score: confidence,
        l2_status: status,
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".into(),
        qdrant_url: "http://localhost:6333".into(),
        collection: "test_vectors".into(),
        vector_dim: 16,
        expected_min_volume: 3,
        embed_url: None,
        gemini_api_key: None,
        gemini_model: "test-model".into(),
        gemini_base_url: "https://generativelanguage.googleapis.com".into(),
        audit_timeout: Duration::from_secs(1),
        outlier_limit: 5,
        seed_demo: false,
    }
}

pub fn state_with_auditor(auditor: Arc<dyn AuditService>) -> SharedState {
    Arc::new(AppState {
        config: test_config(),
        registry: DatasetRegistry::new(),
        embedder: Arc::new(HashEmbedder::new(16)),
        vectors: Arc::new(MemoryVectorStore::default()),
        auditor,
    })
}

pub fn state_with_failing_vectors() -> SharedState {
    Arc::new(AppState {
        config: test_config(),
        registry: DatasetRegistry::new(),
        embedder: Arc::new(HashEmbedder::new(16)),
        vectors: Arc::new(MemoryVectorStore {
            fail_upserts: true,
            ..Default::default()
        }),
        auditor: Arc::new(FailingAudit),
    })
}
