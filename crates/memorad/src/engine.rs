use crate::config::Config;
use chrono::{DateTime, Utc};
use memora_core::detector::DetectorError;
use memora_core::recognizer::RecognizerError;
use memora_core::{
    ArcFaceEngine, EmbeddingEngine, EmbeddingCache, FaceDetector, MatchDecision, Matcher,
    MatcherParts, ScrfdDetector,
};
use memora_remote::{http_client, HttpPhotoFetcher, RestCandidateRepository};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Recognition engine shared by every D-Bus request.
///
/// Owns the loaded models, the HTTP collaborators and the process-wide
/// embedding cache. Each request runs its own matcher pass; the only state
/// shared between requests is the cache.
pub struct Engine {
    matcher: Matcher,
    started_at: DateTime<Utc>,
    scrfd_path: String,
    arcface_path: String,
    repository_configured: bool,
    quality_gate: bool,
}

impl Engine {
    /// Load both ONNX models and build the matcher. Fails fast if a model
    /// or the HTTP client is unavailable.
    pub fn load(config: &Config) -> Result<Self, EngineError> {
        let scrfd_path = config.scrfd_model_path();
        let arcface_path = config.arcface_model_path();

        let detector: Arc<dyn FaceDetector> = Arc::new(ScrfdDetector::load(&scrfd_path)?);
        tracing::info!(path = %scrfd_path, "SCRFD detector loaded");

        let engine: Arc<dyn EmbeddingEngine> = Arc::new(ArcFaceEngine::load(&arcface_path)?);
        tracing::info!(path = %arcface_path, "ArcFace engine loaded");

        let client = http_client(config.http_timeout())?;
        let rest = config.rest_config();
        let repository_configured = rest.is_configured();

        let cache = Arc::new(EmbeddingCache::new(config.cache_capacity));
        tracing::info!(
            capacity = config.cache_capacity,
            keying = ?config.cache_keying,
            "embedding cache ready"
        );

        let matcher = Matcher::new(
            MatcherParts {
                detector,
                engine,
                repository: Arc::new(RestCandidateRepository::new(client.clone(), rest)),
                photos: Arc::new(HttpPhotoFetcher::new(client)),
                cache,
            },
            config.matcher_config(),
        );

        Ok(Self {
            matcher,
            started_at: Utc::now(),
            scrfd_path,
            arcface_path,
            repository_configured,
            quality_gate: config.quality_gate,
        })
    }

    pub async fn recognize(&self, image: &[u8], subject_id: &str) -> MatchDecision {
        self.matcher.recognize_bytes(image, subject_id).await
    }

    /// Daemon status as a JSON object.
    pub fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": self.started_at.to_rfc3339(),
            "models": {
                "detector": self.scrfd_path,
                "recognizer": self.arcface_path,
            },
            "threshold": self.matcher.threshold(),
            "quality_gate": self.quality_gate,
            "repository_configured": self.repository_configured,
            "cache": self.matcher.cache().stats(),
        })
    }
}
