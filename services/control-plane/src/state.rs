//! Shared application state and the dataset-version registry.
//!
//! The registry is the only mutable shared resource in the core. Each key
//! owns its own mutex so `apply_status` is serialized per version while
//! unrelated versions proceed concurrently; proposals are computed outside
//! the critical section and no lock is held across an I/O boundary.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::embedder::Embedder;
use crate::error::GateError;
use crate::llm::AuditService;
use crate::types::DatasetVersion;
use crate::vector_store::VectorStore;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub registry: DatasetRegistry,
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorStore>,
    pub auditor: Arc<dyn AuditService>,
}

pub fn version_key(dataset_id: &str, version: &str) -> String {
    format!("{dataset_id}:{version}")
}

/// Append-only keyed store of dataset-version records. Records are never
/// deleted; re-validation replaces reports but history only grows.
#[derive(Default)]
pub struct DatasetRegistry {
    records: RwLock<HashMap<String, Arc<Mutex<DatasetVersion>>>>,
    /// Latest in-flight ingestion per key; superseded runs get cancelled.
    ingests: Mutex<HashMap<String, CancellationToken>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(
        &self,
        record: DatasetVersion,
    ) -> Result<Arc<Mutex<DatasetVersion>>, GateError> {
        let key = version_key(&record.dataset_id, &record.version);
        let mut map = self.records.write().await;
        if map.contains_key(&key) {
            return Err(GateError::Conflict(key));
        }
        let entry = Arc::new(Mutex::new(record));
        map.insert(key, entry.clone());
        Ok(entry)
    }

    pub async fn get(
        &self,
        dataset_id: &str,
        version: &str,
    ) -> Result<Arc<Mutex<DatasetVersion>>, GateError> {
        let key = version_key(dataset_id, version);
        self.records
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(GateError::NotFound(key))
    }

    /// Snapshot of every version of one dataset, oldest first.
    pub async fn list_versions(&self, dataset_id: &str) -> Vec<DatasetVersion> {
        let entries: Vec<Arc<Mutex<DatasetVersion>>> =
            self.records.read().await.values().cloned().collect();

        let mut out = Vec::new();
        for entry in entries {
            let record = entry.lock().await;
            if record.dataset_id == dataset_id {
                out.push(record.clone());
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.version.cmp(&b.version)));
        out
    }

    /// Register a new ingestion run for a key, cancelling any run still in
    /// flight so a stale L1 result cannot overwrite a newer attempt.
    pub async fn begin_ingest(&self, key: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let mut map = self.ingests.lock().await;
        if let Some(previous) = map.insert(key.to_string(), token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Drop a finished run's token so the side map stays bounded by
    /// in-flight work. A cancelled token means a newer run owns the entry,
    /// so it is left alone.
    pub async fn finish_ingest(&self, key: &str, token: &CancellationToken) {
        let mut map = self.ingests.lock().await;
        if !token.is_cancelled() {
            map.remove(key);
        }
    }

    #[cfg(test)]
    pub async fn ingest_inflight(&self, key: &str) -> bool {
        self.ingests.lock().await.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate;
    use crate::types::{NewDatasetVersion, Status, StatusSource};

    fn record(dataset_id: &str, version: &str) -> DatasetVersion {
        DatasetVersion::new(NewDatasetVersion {
            dataset_id: dataset_id.into(),
            version: version.into(),
            source_id: "src-1".into(),
            lineage_parent_version: None,
            tags: vec![],
        })
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_a_conflict() {
        let registry = DatasetRegistry::new();
        registry.insert(record("demo", "v1")).await.unwrap();
        let err = registry.insert(record("demo", "v1")).await.unwrap_err();
        assert!(matches!(err, GateError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_versions_filters_and_orders() {
        let registry = DatasetRegistry::new();
        registry.insert(record("demo", "v1")).await.unwrap();
        registry.insert(record("demo", "v2")).await.unwrap();
        registry.insert(record("other", "v1")).await.unwrap();

        let versions = registry.list_versions("demo").await;
        assert_eq!(versions.len(), 2);
        assert!(versions.iter().all(|v| v.dataset_id == "demo"));
    }

    #[tokio::test]
    async fn test_concurrent_transitions_on_one_key_keep_history_consistent() {
        let registry = Arc::new(DatasetRegistry::new());
        registry.insert(record("demo", "v1")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let entry = registry.get("demo", "v1").await.unwrap();
                let mut rec = entry.lock().await;
                let status = if i % 2 == 0 { Status::Warn } else { Status::Pass };
                gate::apply_status(&mut rec, status, StatusSource::L2, None);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let entry = registry.get("demo", "v1").await.unwrap();
        let rec = entry.lock().await;
        assert_eq!(rec.status_history.len(), 32);
        assert_eq!(rec.status, rec.status_history.last().unwrap().status);
        for pair in rec.status_history.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_begin_ingest_cancels_previous_run() {
        let registry = DatasetRegistry::new();
        let first = registry.begin_ingest("demo:v1").await;
        assert!(!first.is_cancelled());

        let second = registry.begin_ingest("demo:v1").await;
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn test_finish_ingest_drops_only_the_owning_token() {
        let registry = DatasetRegistry::new();

        let token = registry.begin_ingest("demo:v1").await;
        registry.finish_ingest("demo:v1", &token).await;
        assert!(!registry.ingest_inflight("demo:v1").await);

        // A superseded run must not evict its successor's token.
        let stale = registry.begin_ingest("demo:v1").await;
        let _current = registry.begin_ingest("demo:v1").await;
        registry.finish_ingest("demo:v1", &stale).await;
        assert!(registry.ingest_inflight("demo:v1").await);
    }
}
