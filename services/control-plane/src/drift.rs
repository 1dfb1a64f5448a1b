//! Drift statistic and outlier ranking over per-version point sets.

use std::collections::HashMap;

use tracing::debug;

use crate::error::GateError;
use crate::types::OutlierSample;
use crate::vector_store::VectorPoint;

/// Centroid of a version's point set, or None when nothing usable is stored.
pub fn mean_of_points(points: &[VectorPoint]) -> Option<Vec<f32>> {
    let vectors: Vec<Vec<f32>> = points.iter().map(|p| p.vector.clone()).collect();
    vecmath::mean_vector(&vectors).ok()
}

/// Version-pair drift: cosine distance between the two centroids.
pub fn drift_stats(
    mean_target: &[f32],
    mean_baseline: &[f32],
) -> Result<HashMap<String, f64>, GateError> {
    let shift = vecmath::cosine_distance(mean_target, mean_baseline)
        .map_err(|e| GateError::Validation(e.to_string()))?;
    Ok(HashMap::from([(
        "cosine_mean_shift".to_string(),
        f64::from(shift),
    )]))
}

/// Rank target-version points by combined distance to both centroids and
/// keep the top `limit`.
///
/// Equal weighting of the two distances: a point far from both centroids is
/// the most informative outlier, while one far only from its own mean but
/// close to the baseline's suggests mislabeling rather than drift. Points
/// missing payload fields or with mismatched dimensionality are skipped.
pub fn rank_outliers(
    points: &[VectorPoint],
    mean_target: &[f32],
    mean_baseline: &[f32],
    limit: usize,
) -> Vec<OutlierSample> {
    let mut ranked = Vec::new();
    let mut skipped = 0usize;

    for point in points {
        let (Some(image_url), Some(caption)) =
            (&point.payload.image_url, &point.payload.caption)
        else {
            skipped += 1;
            continue;
        };
        let (Ok(dist_to_target_mean), Ok(dist_to_baseline_mean)) = (
            vecmath::cosine_distance(&point.vector, mean_target),
            vecmath::cosine_distance(&point.vector, mean_baseline),
        ) else {
            skipped += 1;
            continue;
        };

        ranked.push(OutlierSample {
            point_id: point.id.clone(),
            image_url: image_url.clone(),
            caption: caption.clone(),
            dist_to_target_mean,
            dist_to_baseline_mean,
            outlier_score: 0.5 * dist_to_target_mean + 0.5 * dist_to_baseline_mean,
        });
    }

    if skipped > 0 {
        debug!(skipped, "outlier ranking skipped unusable points");
    }

    ranked.sort_by(|a, b| {
        b.outlier_score
            .partial_cmp(&a.outlier_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::PointPayload;

    fn payload(image_url: Option<&str>, caption: Option<&str>) -> PointPayload {
        PointPayload {
            dataset_id: "demo".into(),
            version: "v2".into(),
            image_url: image_url.map(String::from),
            caption: caption.map(String::from),
            source_id: Some("src".into()),
            image_fetch_status: None,
            fallback_used: None,
        }
    }

    fn point(id: &str, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: payload(Some("img"), Some("cap")),
        }
    }

    #[test]
    fn test_far_from_both_means_ranks_first() {
        let mean_t = [1.0, 0.0];
        let mean_b = [0.0, 1.0];
        let points = vec![
            // Roughly between both centroids.
            point("near", vec![0.7, 0.7]),
            // Opposite direction from both.
            point("far", vec![-1.0, -1.0]),
        ];

        let ranked = rank_outliers(&points, &mean_t, &mean_b, 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].point_id, "far");
        assert!(ranked[0].outlier_score > ranked[1].outlier_score);
    }

    #[test]
    fn test_unusable_points_are_skipped_silently() {
        let mean = [1.0, 0.0];
        let points = vec![
            point("ok", vec![0.0, 1.0]),
            VectorPoint {
                id: "no-caption".into(),
                vector: vec![0.0, 1.0],
                payload: payload(Some("img"), None),
            },
            // Wrong dimensionality.
            point("bad-dim", vec![0.0, 1.0, 2.0]),
        ];

        let ranked = rank_outliers(&points, &mean, &mean, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].point_id, "ok");
    }

    #[test]
    fn test_limit_caps_ranking() {
        let mean = [1.0, 0.0];
        let points: Vec<VectorPoint> = (0..8)
            .map(|i| point(&format!("p{i}"), vec![0.1 * i as f32, 1.0]))
            .collect();
        let ranked = rank_outliers(&points, &mean, &mean, 3);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn test_drift_stats_reports_cosine_mean_shift() {
        let stats = drift_stats(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((stats["cosine_mean_shift"] - 1.0).abs() < 1e-6);
    }
}
