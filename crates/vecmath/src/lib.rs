//! Pure vector math for the drift gate.
//!
//! No I/O and no async: every routine here is deterministic so the drift
//! ranker can be unit-tested without a vector store behind it.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MathError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("no usable vectors in input set")]
    NoData,
}

pub type Result<T> = std::result::Result<T, MathError>;

/// Cosine distance, range [0, 2]: 0 = identical direction, 1 = orthogonal,
/// 2 = opposite. A zero-norm operand or a non-finite similarity maps to 1.0
/// (fully dissimilar) instead of propagating NaN.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(MathError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(1.0);
    }

    let similarity = dot / (norm_a * norm_b);
    if !similarity.is_finite() {
        return Ok(1.0);
    }

    Ok((1.0 - similarity.clamp(-1.0, 1.0)) as f32)
}

/// Element-wise mean over all vectors matching the first-seen dimension.
///
/// Vectors with a different length are skipped rather than failing the whole
/// computation; an empty input set yields `NoData`.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = vectors.first().ok_or(MathError::NoData)?;
    let dim = first.len();

    let mut acc = vec![0.0f64; dim];
    let mut count = 0usize;
    for v in vectors {
        if v.len() != dim {
            continue;
        }
        for (slot, x) in acc.iter_mut().zip(v.iter()) {
            *slot += f64::from(*x);
        }
        count += 1;
    }

    if count == 0 {
        return Err(MathError::NoData);
    }

    Ok(acc.into_iter().map(|s| (s / count as f64) as f32).collect())
}
