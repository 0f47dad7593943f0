//! Embedding comparison.
//!
//! Distances follow the cosine geometry the ArcFace embeddings are trained
//! for; the decision threshold in [`crate::decision`] is calibrated against it.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
    #[error("degenerate embedding: zero-length vector cannot be normalized")]
    DegenerateEmbedding,
}

/// Strategy for measuring how far apart two face embeddings are.
pub trait Verifier: Send + Sync {
    /// Distance between probe and reference. Smaller = more alike.
    fn distance(&self, probe: &Embedding, reference: &Embedding) -> Result<f32, VerifyError>;
}

/// Cosine distance (`1 - cosine_similarity`), in [0, 2].
pub struct CosineVerifier;

impl Verifier for CosineVerifier {
    fn distance(&self, probe: &Embedding, reference: &Embedding) -> Result<f32, VerifyError> {
        cosine_distance(&probe.values, &reference.values)
    }
}

/// Normalize both vectors and return `1 - a·b`, clamped to [0, 2].
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32, VerifyError> {
    if a.is_empty() || b.is_empty() {
        return Err(VerifyError::InvalidEmbedding("empty vector".into()));
    }
    if a.len() != b.len() {
        return Err(VerifyError::InvalidEmbedding(format!(
            "dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(VerifyError::InvalidEmbedding("non-finite component".into()));
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(VerifyError::DegenerateEmbedding);
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok((1.0 - similarity).clamp(0.0, 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_identical_direction_is_zero() {
        let d = CosineVerifier.distance(&emb(&[1.0, 2.0, 3.0]), &emb(&[2.0, 4.0, 6.0])).unwrap();
        assert!(d.abs() < 1e-6, "got {d}");
    }

    #[test]
    fn test_orthogonal_is_one() {
        let d = CosineVerifier.distance(&emb(&[1.0, 0.0]), &emb(&[0.0, 1.0])).unwrap();
        assert!((d - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_is_two() {
        let d = CosineVerifier.distance(&emb(&[1.0, 0.0]), &emb(&[-3.0, 0.0])).unwrap();
        assert!((d - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_scale_invariant() {
        let a = emb(&[0.3, -0.1, 0.8]);
        let b = emb(&[0.5, 0.2, 0.1]);
        let scaled = emb(&[30.0, -10.0, 80.0]);
        let d1 = CosineVerifier.distance(&a, &b).unwrap();
        let d2 = CosineVerifier.distance(&scaled, &b).unwrap();
        assert!((d1 - d2).abs() < 1e-5);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = CosineVerifier.distance(&emb(&[1.0, 0.0]), &emb(&[1.0, 0.0, 0.0])).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidEmbedding(_)));
    }

    #[test]
    fn test_empty_vector() {
        let err = CosineVerifier.distance(&emb(&[]), &emb(&[])).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidEmbedding(_)));
    }

    #[test]
    fn test_nan_component() {
        let err = CosineVerifier.distance(&emb(&[f32::NAN, 1.0]), &emb(&[1.0, 1.0])).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidEmbedding(_)));
    }

    #[test]
    fn test_zero_vector_is_degenerate() {
        let err = CosineVerifier.distance(&emb(&[0.0, 0.0]), &emb(&[1.0, 0.0])).unwrap_err();
        assert_eq!(err, VerifyError::DegenerateEmbedding);
    }
}
