//! Background ingestion: embed raw records, upsert points into the vector
//! store, then run L1 and feed the verdict through the gate.
//!
//! Runs detached from the request that started it. Failures never crash the
//! process; they terminate by writing BLOCK with source L1 and a reason. A
//! run superseded by a newer ingestion of the same key writes nothing.

use anyhow::Context;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::gate;
use crate::state::{version_key, SharedState};
use crate::types::{L1Report, Status, StatusSource};
use crate::validator;
use crate::vector_store::{point_id, PointPayload, VectorPoint};

pub async fn spawn(state: SharedState, dataset_id: String, version: String, raw_data: Vec<JsonValue>) {
    let key = version_key(&dataset_id, &version);
    let cancel = state.registry.begin_ingest(&key).await;
    tokio::spawn(run(state, dataset_id, version, raw_data, cancel));
}

pub async fn run(
    state: SharedState,
    dataset_id: String,
    version: String,
    raw_data: Vec<JsonValue>,
    cancel: CancellationToken,
) {
    let key = version_key(&dataset_id, &version);
    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            info!(%dataset_id, %version, "ingestion superseded by a newer run");
            return;
        }
        result = embed_and_validate(&state, &dataset_id, &version, &raw_data) => result,
    };

    let Ok(entry) = state.registry.get(&dataset_id, &version).await else {
        state.registry.finish_ingest(&key, &cancel).await;
        return;
    };
    let mut record = entry.lock().await;
    if cancel.is_cancelled() {
        // A newer ingestion owns this record now; a stale verdict must not
        // overwrite its transitions.
        return;
    }

    match outcome {
        Ok(report) => {
            let target = gate::l1_target_status(&report);
            let reason = format!(
                "L1 validation: schema_passed={}, volume={}/{}, freshness_delay_sec={}",
                report.schema_passed,
                report.volume_actual,
                report.volume_expected,
                report.freshness_delay_sec
            );
            info!(%dataset_id, %version, status = ?target, "ingestion complete");
            record.l1_report = Some(report);
            gate::apply_status(&mut record, target, StatusSource::L1, Some(reason));
        }
        Err(e) => {
            error!(%dataset_id, %version, error = ?e, "ingestion failed");
            gate::apply_status(
                &mut record,
                Status::Block,
                StatusSource::L1,
                Some(format!("ingestion failed: {e:#}")),
            );
        }
    }
    drop(record);
    state.registry.finish_ingest(&key, &cancel).await;
}

async fn embed_and_validate(
    state: &SharedState,
    dataset_id: &str,
    version: &str,
    raw_data: &[JsonValue],
) -> anyhow::Result<L1Report> {
    state
        .vectors
        .ensure_collection()
        .await
        .context("vector store init failed")?;

    let image_urls: Vec<String> = raw_data.iter().map(|r| str_field(r, "image_url")).collect();
    let captions: Vec<String> = raw_data.iter().map(|r| str_field(r, "caption")).collect();

    let embeddings = state
        .embedder
        .embed(&image_urls, &captions)
        .await
        .context("embedding failed")?;

    let points: Vec<VectorPoint> = embeddings
        .iter()
        .enumerate()
        .map(|(i, emb)| VectorPoint {
            id: point_id(dataset_id, version, i),
            vector: emb.vector.clone(),
            payload: PointPayload {
                dataset_id: dataset_id.to_string(),
                version: version.to_string(),
                image_url: Some(image_urls[i].clone()),
                caption: Some(captions[i].clone()),
                source_id: raw_data[i]
                    .get("source_id")
                    .and_then(JsonValue::as_str)
                    .map(String::from),
                image_fetch_status: Some(emb.fetch_status),
                fallback_used: Some(emb.used_fallback),
            },
        })
        .collect();

    state
        .vectors
        .upsert_points(points)
        .await
        .context("vector upsert failed")?;

    Ok(validator::validate(raw_data, state.config.expected_min_volume))
}

fn str_field(record: &JsonValue, field: &str) -> String {
    record
        .get(field)
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}
