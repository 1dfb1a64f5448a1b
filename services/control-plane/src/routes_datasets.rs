//! HTTP surface of the gate. Handlers validate input, compute proposals
//! outside any lock, and hold a record's mutex only for the in-memory
//! `apply_status` critical section.

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::audit::{self, AuditOutcome};
use crate::drift;
use crate::error::GateError;
use crate::gate;
use crate::ingest;
use crate::state::SharedState;
use crate::types::{
    ApproveRequest, CreateDatasetRequest, DatasetVersion, L1Report, L2Reasoning, SamplePair,
    Status, StatusSource, TriggerL2Request,
};

const DEFAULT_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct SamplesQuery {
    pub limit: Option<usize>,
}

pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Register a new dataset version. With raw records the version starts in
/// VALIDATING and ingestion runs in the background; without, it parks in
/// PENDING until records arrive.
pub async fn create_dataset(
    State(state): State<SharedState>,
    Json(req): Json<CreateDatasetRequest>,
) -> Result<(StatusCode, Json<DatasetVersion>), GateError> {
    let mut record = DatasetVersion::new(req.dataset);
    let has_data = !req.raw_data.is_empty();
    if has_data {
        gate::apply_status(
            &mut record,
            Status::Validating,
            StatusSource::System,
            Some("dataset version created; ingestion started".to_string()),
        );
    } else {
        gate::apply_status(
            &mut record,
            Status::Pending,
            StatusSource::System,
            Some("dataset version created without records".to_string()),
        );
    }

    let entry = state.registry.insert(record).await?;
    let snapshot = entry.lock().await.clone();
    info!(dataset_id = %snapshot.dataset_id, version = %snapshot.version, ingest = has_data, "dataset version registered");

    if has_data {
        ingest::spawn(
            state.clone(),
            snapshot.dataset_id.clone(),
            snapshot.version.clone(),
            req.raw_data,
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Version timeline of one dataset, oldest first.
pub async fn list_versions(
    State(state): State<SharedState>,
    Path(dataset_id): Path<String>,
) -> Json<Vec<DatasetVersion>> {
    Json(state.registry.list_versions(&dataset_id).await)
}

pub async fn get_version(
    State(state): State<SharedState>,
    Path((dataset_id, version)): Path<(String, String)>,
) -> Result<Json<DatasetVersion>, GateError> {
    let entry = state.registry.get(&dataset_id, &version).await?;
    let record = entry.lock().await.clone();
    Ok(Json(record))
}

/// Stored image/caption pairs of one version, for previewing what was
/// ingested. Payload projection only; no vectors travel.
pub async fn get_samples(
    State(state): State<SharedState>,
    Path((dataset_id, version)): Path<(String, String)>,
    Query(query): Query<SamplesQuery>,
) -> Result<Json<Vec<SamplePair>>, GateError> {
    // 404 for unregistered versions instead of an empty list.
    state.registry.get(&dataset_id, &version).await?;
    let samples = state
        .vectors
        .get_samples(
            &dataset_id,
            &version,
            query.limit.unwrap_or(DEFAULT_SAMPLE_LIMIT),
        )
        .await
        .map_err(|e| GateError::ExternalService {
            service: "vector-store",
            message: format!("{e:#}"),
        })?;
    Ok(Json(samples))
}

/// Apply an externally computed L1 report. A non-PASS report is forced to
/// BLOCK before it reaches the gate.
pub async fn validate_l1(
    State(state): State<SharedState>,
    Path((dataset_id, version)): Path<(String, String)>,
    Json(report): Json<L1Report>,
) -> Result<Json<DatasetVersion>, GateError> {
    let entry = state.registry.get(&dataset_id, &version).await?;
    let target = gate::l1_target_status(&report);
    let reason = format!(
        "schema_passed={}, volume={}/{}, freshness_delay_sec={}",
        report.schema_passed, report.volume_actual, report.volume_expected,
        report.freshness_delay_sec
    );

    let mut record = entry.lock().await;
    record.l1_report = Some(report);
    gate::apply_status(&mut record, target, StatusSource::L1, Some(reason));
    Ok(Json(record.clone()))
}

/// Apply an externally computed L2 judgment. Rejected without mutation when
/// the record is blocked by L1, or when the payload fails the shape check.
pub async fn audit_l2(
    State(state): State<SharedState>,
    Path((dataset_id, version)): Path<(String, String)>,
    Json(reasoning): Json<L2Reasoning>,
) -> Result<Json<DatasetVersion>, GateError> {
    audit::validate_reasoning(&reasoning).map_err(GateError::Validation)?;
    let entry = state.registry.get(&dataset_id, &version).await?;

    let mut record = entry.lock().await;
    gate::ensure_l2_allowed(&record)?;
    let reason = reasoning.judgment_summary.clone();
    let status = reasoning.l2_status;
    record.l2_reasoning = Some(reasoning);
    gate::apply_status(&mut record, status, StatusSource::L2, Some(reason));
    Ok(Json(record.clone()))
}

/// Full L2 pipeline: centroids of target and baseline, drift statistic,
/// outlier ranking, semantic audit, gate write. When the audit degrades to
/// the WARN fallback the record is still written, and the failure is
/// reported to the caller as a 502.
pub async fn trigger_l2(
    State(state): State<SharedState>,
    Path((dataset_id, version)): Path<(String, String)>,
    body: Option<Json<TriggerL2Request>>,
) -> Result<Json<DatasetVersion>, GateError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let entry = state.registry.get(&dataset_id, &version).await?;

    let baseline = {
        let record = entry.lock().await;
        // Checked again under the lock before the write; this early check
        // just avoids spending vector-store and LLM calls on a dead record.
        gate::ensure_l2_allowed(&record)?;
        req.baseline_version
            .or_else(|| record.lineage_parent_version.clone())
            .ok_or_else(|| {
                GateError::Validation(
                    "no baseline version: set lineage_parent_version or pass baseline_version"
                        .to_string(),
                )
            })?
    };

    let target_points = state
        .vectors
        .scroll_points(&dataset_id, &version)
        .await
        .map_err(|e| GateError::ExternalService {
            service: "vector-store",
            message: format!("{e:#}"),
        })?;
    let baseline_points = state
        .vectors
        .scroll_points(&dataset_id, &baseline)
        .await
        .map_err(|e| GateError::ExternalService {
            service: "vector-store",
            message: format!("{e:#}"),
        })?;

    let mean_target = drift::mean_of_points(&target_points).ok_or_else(|| {
        GateError::Validation(format!("no vectors stored for {dataset_id}:{version}"))
    })?;
    let mean_baseline = drift::mean_of_points(&baseline_points).ok_or_else(|| {
        GateError::Validation(format!("no vectors stored for {dataset_id}:{baseline}"))
    })?;

    let stats = drift::drift_stats(&mean_target, &mean_baseline)?;
    let outliers = drift::rank_outliers(
        &target_points,
        &mean_target,
        &mean_baseline,
        state.config.outlier_limit,
    );

    let outcome = audit::request_audit(
        state.auditor.as_ref(),
        &stats,
        &outliers,
        state.config.audit_timeout,
    )
    .await?;

    let (snapshot, failure) = {
        let mut record = entry.lock().await;
        // The L1 verdict may have flipped while we were on the network.
        gate::ensure_l2_allowed(&record)?;

        let (reasoning, failure) = match outcome {
            AuditOutcome::Accepted(r) => (r, None),
            AuditOutcome::Degraded { reasoning, failure } => (reasoning, Some(failure)),
        };
        let reason = reasoning.judgment_summary.clone();
        let status = reasoning.l2_status;
        record.l2_reasoning = Some(reasoning);
        gate::apply_status(&mut record, status, StatusSource::L2, Some(reason));
        (record.clone(), failure)
    };

    match failure {
        None => Ok(Json(snapshot)),
        Some(message) => Err(GateError::ExternalService {
            service: "llm-audit",
            message: format!("{message}; record degraded to WARN"),
        }),
    }
}

/// Human-in-the-loop transition. May set any status except overriding an
/// L1 BLOCK.
pub async fn approve(
    State(state): State<SharedState>,
    Path((dataset_id, version)): Path<(String, String)>,
    body: Option<Json<ApproveRequest>>,
) -> Result<Json<DatasetVersion>, GateError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let target = req.status.unwrap_or(Status::Pass);
    let reason = req
        .reason
        .unwrap_or_else(|| "manual operator decision".to_string());

    let entry = state.registry.get(&dataset_id, &version).await?;
    let mut record = entry.lock().await;
    gate::ensure_manual_allowed(&record)?;
    gate::apply_status(&mut record, target, StatusSource::Manual, Some(reason));
    Ok(Json(record.clone()))
}
