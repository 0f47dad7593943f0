//! memora-core: Family-member face recognition engine.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime for CPU inference. The [`matcher`] module ties
//! them together with a candidate repository and a photo source to decide
//! which known family member, if any, appears in a probe photo.

pub mod alignment;
pub mod cache;
pub mod decision;
pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod quality;
pub mod recognizer;
pub mod source;
pub mod types;
pub mod verifier;

use std::path::PathBuf;

pub use cache::{CacheKey, CacheKeying, CacheStats, EmbeddingCache};
pub use decision::{DecisionPolicy, ErrorType, MatchDecision, RecognitionResponse};
pub use detector::{FaceDetector, ScrfdDetector};
pub use extractor::FaceExtractor;
pub use matcher::{Matcher, MatcherConfig, MatcherParts};
pub use quality::{QualityGate, QualityThresholds};
pub use recognizer::{ArcFaceEngine, EmbeddingEngine};
pub use source::{CandidateRepository, FetchError, PhotoSource};
pub use types::{BoundingBox, Candidate, Embedding, VerificationResult};
pub use verifier::{CosineVerifier, Verifier};

/// Default location of the ONNX model files: `$XDG_DATA_HOME/memora/models`,
/// falling back to `~/.local/share/memora/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("memora")
        .join("models")
}
