use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Gate verdict for a dataset version. Closed set: anything else is a
/// deserialization failure at the boundary, never a silently-accepted state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    Validating,
    Pass,
    Warn,
    Block,
}

/// Which actor last asserted the current status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusSource {
    System,
    L1,
    L2,
    Manual,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusHistoryItem {
    pub status: Status,
    pub source: StatusSource,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Result of the deterministic L1 gate. Immutable once produced; a
/// re-validation replaces the whole report (history still records each
/// transition).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct L1Report {
    pub schema_passed: bool,
    pub volume_actual: i64,
    pub volume_expected: i64,
    /// Seconds since the newest recognized timestamp, or -1 when no record
    /// carried a parseable timestamp.
    pub freshness_delay_sec: i64,
    #[serde(default = "default_report_status")]
    pub l1_status: Status,
    #[serde(default)]
    pub details: HashMap<String, JsonValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub summary: String,
    pub key_observations: Vec<String>,
    pub decision_rationale: String,
    #[serde(default)]
    pub recommended_action: Option<String>,
}

/// Result of the semantic L2 gate as returned by (or synthesized for) the
/// LLM audit service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct L2Reasoning {
    #[serde(default)]
    pub model_name: String,
    /// cosine_mean_shift and friends.
    pub distribution_drift: HashMap<String, f64>,
    pub reasoning_trace: ReasoningTrace,
    pub judgment_summary: String,
    #[serde(default)]
    pub flagged_samples: Vec<String>,
    pub confidence_score: f64,
    #[serde(default = "default_report_status")]
    pub l2_status: Status,
}

fn default_report_status() -> Status {
    Status::Pending
}

/// A registered dataset version. Mutated only through `gate::apply_status`;
/// the history is append-only and never reordered or pruned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetVersion {
    pub dataset_id: String,
    pub version: String,
    pub created_at: DateTime<Utc>,

    pub status: Status,
    pub status_source: StatusSource,
    pub status_history: Vec<StatusHistoryItem>,

    #[serde(default)]
    pub l1_report: Option<L1Report>,
    #[serde(default)]
    pub l2_reasoning: Option<L2Reasoning>,

    pub source_id: String,
    #[serde(default)]
    pub lineage_parent_version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DatasetVersion {
    pub fn new(spec: NewDatasetVersion) -> Self {
        Self {
            dataset_id: spec.dataset_id,
            version: spec.version,
            created_at: Utc::now(),
            status: Status::Pending,
            status_source: StatusSource::System,
            status_history: Vec::new(),
            l1_report: None,
            l2_reasoning: None,
            source_id: spec.source_id,
            lineage_parent_version: spec.lineage_parent_version,
            tags: spec.tags,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewDatasetVersion {
    pub dataset_id: String,
    pub version: String,
    pub source_id: String,
    #[serde(default)]
    pub lineage_parent_version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDatasetRequest {
    pub dataset: NewDatasetVersion,
    /// Raw records to ingest (embed + upsert + L1). May be empty, in which
    /// case the version is registered as PENDING without ingestion.
    #[serde(default)]
    pub raw_data: Vec<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    pub status: Option<Status>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerL2Request {
    /// Version to compare against. Falls back to the record's
    /// lineage_parent_version when omitted.
    pub baseline_version: Option<String>,
}

/// Per-item outcome of the embedding provider's image fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStatus {
    Ok,
    Fail,
}

/// Image/caption projection of a stored point, for sample previews.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SamplePair {
    pub image_url: String,
    pub caption: String,
}

/// A sampled point ranked by combined distance to both version centroids.
#[derive(Clone, Debug, Serialize)]
pub struct OutlierSample {
    pub point_id: String,
    pub image_url: String,
    pub caption: String,
    pub dist_to_target_mean: f32,
    pub dist_to_baseline_mean: f32,
    pub outlier_score: f32,
}
