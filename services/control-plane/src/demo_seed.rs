//! Startup demo seeding: a nature baseline (v1) and a drifted urban
//! version (v2), ingested through the normal pipeline so the L2 trigger has
//! real vectors to work with. Enabled with SEED_DEMO=1.

use chrono::{Duration, Utc};
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::gate;
use crate::ingest;
use crate::state::SharedState;
use crate::types::{DatasetVersion, NewDatasetVersion, Status, StatusSource};

const DEMO_DATASET_ID: &str = "demo_vlm_dataset";

const DEMO_V1: [(&str, &str, &str); 10] = [
    ("https://images.unsplash.com/photo-1464822759023-fed622ff2c3b", "A majestic mountain range under a clear blue sky", "cam_01"),
    ("https://images.unsplash.com/photo-1507525428034-b723cf961d3e", "A peaceful tropical beach with white sand and palm trees", "cam_02"),
    ("https://images.unsplash.com/photo-1441974231531-c6227db76b6e", "Sunlight streaming through the trees in a lush green forest", "cam_01"),
    ("https://images.unsplash.com/photo-1470071459604-3b5ec3a7fe05", "Foggy morning in the countryside with rolling hills", "cam_03"),
    ("https://images.unsplash.com/photo-1501785888041-af3ef285b470", "A calm lake reflecting the surrounding mountains at sunset", "cam_02"),
    ("https://images.unsplash.com/photo-1472214103451-9374bd1c798e", "A meadow of wildflowers beneath snowcapped peaks", "cam_01"),
    ("https://images.unsplash.com/photo-1433086966358-54859d0ed716", "A waterfall cascading over mossy rocks", "cam_03"),
    ("https://images.unsplash.com/photo-1447752875215-b2761acb3c5d", "Tall pines along a quiet forest trail", "cam_02"),
    ("https://images.unsplash.com/photo-1426604966848-d7adac402bff", "A river winding through an alpine valley", "cam_01"),
    ("https://images.unsplash.com/photo-1469474968028-56623f02e42e", "Golden light over rolling green hills at dawn", "cam_03"),
];

const DEMO_V2: [(&str, &str, &str); 10] = [
    ("https://images.unsplash.com/photo-1477959858617-67f85cf4f1df", "A busy city street with tall buildings and traffic", "cam_01"),
    ("https://images.unsplash.com/photo-1449824913935-59a10b8d2000", "Modern architecture with glass windows in a metropolitan area", "cam_02"),
    ("https://images.unsplash.com/photo-1493246507139-91e8bef99c17", "Bright neon lights and signs on a city building at night", "cam_01"),
    ("https://images.unsplash.com/photo-1480714378408-67cf0d13bc1b", "A crowded crosswalk in the downtown core", "cam_02"),
    ("https://images.unsplash.com/photo-1514565131-fce0801e5785", "Skyscrapers reflecting the evening sun", "cam_03"),
    ("https://images.unsplash.com/photo-1444723121867-7a241cacace9", "An elevated train passing between office towers", "cam_01"),
    ("https://images.unsplash.com/photo-1486325212027-8081e485255e", "Taxis queuing outside a glass-fronted station", "cam_02"),
    ("https://images.unsplash.com/photo-1460472178825-e5240623afd5", "A rooftop view over a dense illuminated skyline", "cam_03"),
    // two leftovers from the nature pipeline, deliberately mislabeled-ish
    ("https://images.unsplash.com/photo-1464822759023-fed622ff2c3b", "A tropical beach with palm trees", "cam_02"),
    ("https://images.unsplash.com/photo-1477959858617-67f85cf4f1df", "A peaceful mountain landscape with a lake", "cam_03"),
];

pub async fn seed_if_needed(state: SharedState) {
    if state.registry.get(DEMO_DATASET_ID, "v1").await.is_ok()
        && state.registry.get(DEMO_DATASET_ID, "v2").await.is_ok()
    {
        info!("demo dataset already exists, skipping seed");
        return;
    }

    info!("seeding demo dataset");
    if let Err(e) = seed_version(&state, "v1", None, &DEMO_V1, &["nature", "demo", "baseline"]).await
    {
        warn!(error = %e, "demo seed failed for v1, server continues");
        return;
    }
    if let Err(e) = seed_version(
        &state,
        "v2",
        Some("v1"),
        &DEMO_V2,
        &["urban", "demo", "drifted"],
    )
    .await
    {
        warn!(error = %e, "demo seed failed for v2, server continues");
        return;
    }

    info!("demo dataset seeded: v1 nature baseline, v2 urban drift; trigger-l2 on v2 to audit");
}

async fn seed_version(
    state: &SharedState,
    version: &str,
    parent: Option<&str>,
    items: &[(&str, &str, &str)],
    tags: &[&str],
) -> Result<(), crate::error::GateError> {
    if state.registry.get(DEMO_DATASET_ID, version).await.is_ok() {
        return Ok(());
    }

    let mut record = DatasetVersion::new(NewDatasetVersion {
        dataset_id: DEMO_DATASET_ID.to_string(),
        version: version.to_string(),
        source_id: if parent.is_none() {
            "nature_pipeline".to_string()
        } else {
            "urban_pipeline".to_string()
        },
        lineage_parent_version: parent.map(String::from),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    });
    gate::apply_status(
        &mut record,
        Status::Validating,
        StatusSource::System,
        Some(format!("demo dataset {version} created on startup")),
    );
    state.registry.insert(record).await?;

    let captured_at = (Utc::now() - Duration::seconds(30)).to_rfc3339();
    let raw_data: Vec<JsonValue> = items
        .iter()
        .map(|(image_url, caption, source_id)| {
            json!({
                "image_url": image_url,
                "caption": caption,
                "source_id": source_id,
                "captured_at": captured_at,
            })
        })
        .collect();

    // Run inline (not detached) so v1 vectors exist before v2 seeds.
    ingest::run(
        state.clone(),
        DEMO_DATASET_ID.to_string(),
        version.to_string(),
        raw_data,
        CancellationToken::new(),
    )
    .await;
    Ok(())
}
