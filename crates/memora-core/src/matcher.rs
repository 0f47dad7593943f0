//! Parallel matcher: probe → family members → best match → decision.
//!
//! The probe is quality-checked, detected and embedded exactly once. Every
//! candidate, and every reference photo within a candidate, is then processed
//! concurrently with bounded fan-out; all candidates are always evaluated
//! before the global minimum distance is chosen. CPU-bound work (decoding,
//! detection, embedding) runs on the blocking pool.

use crate::cache::{CacheKey, CacheKeying, EmbeddingCache};
use crate::decision::{DecisionPolicy, MatchDecision, DEFAULT_MATCH_THRESHOLD};
use crate::detector::FaceDetector;
use crate::extractor::{ExtractError, FaceExtractor, MIN_FACE_CONFIDENCE};
use crate::quality::{QualityGate, QualityThresholds};
use crate::recognizer::EmbeddingEngine;
use crate::source::{CandidateRepository, PhotoSource};
use crate::types::{Candidate, Embedding, VerificationResult};
use crate::verifier::{CosineVerifier, Verifier};
use futures::future;
use futures::stream::{self, StreamExt};
use image::RgbImage;
use std::sync::Arc;
use tracing::Instrument;

pub const DEFAULT_WORKERS: usize = 4;

/// Tunables for [`Matcher`].
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Candidates processed concurrently.
    pub candidate_workers: usize,
    /// Reference photos processed concurrently within one candidate.
    pub photo_workers: usize,
    pub cache_keying: CacheKeying,
    /// When false the probe goes straight to face detection.
    pub quality_gate: bool,
    pub quality: QualityThresholds,
    pub min_face_confidence: f32,
    pub match_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            candidate_workers: DEFAULT_WORKERS,
            photo_workers: DEFAULT_WORKERS,
            cache_keying: CacheKeying::Url,
            quality_gate: true,
            quality: QualityThresholds::default(),
            min_face_confidence: MIN_FACE_CONFIDENCE,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// External capabilities the matcher is built from.
pub struct MatcherParts {
    pub detector: Arc<dyn FaceDetector>,
    pub engine: Arc<dyn EmbeddingEngine>,
    pub repository: Arc<dyn CandidateRepository>,
    pub photos: Arc<dyn PhotoSource>,
    /// Process-wide embedding cache, shared across calls.
    pub cache: Arc<EmbeddingCache>,
}

pub struct Matcher {
    extractor: FaceExtractor,
    engine: Arc<dyn EmbeddingEngine>,
    verifier: Arc<dyn Verifier>,
    repository: Arc<dyn CandidateRepository>,
    photos: Arc<dyn PhotoSource>,
    cache: Arc<EmbeddingCache>,
    quality: Option<QualityGate>,
    policy: DecisionPolicy,
    candidate_workers: usize,
    photo_workers: usize,
    cache_keying: CacheKeying,
}

impl Matcher {
    /// Build a matcher comparing embeddings by cosine distance.
    pub fn new(parts: MatcherParts, config: MatcherConfig) -> Self {
        Self {
            extractor: FaceExtractor::with_min_confidence(parts.detector, config.min_face_confidence),
            engine: parts.engine,
            verifier: Arc::new(CosineVerifier),
            repository: parts.repository,
            photos: parts.photos,
            cache: parts.cache,
            quality: config.quality_gate.then(|| QualityGate::new(config.quality)),
            policy: DecisionPolicy::new(config.match_threshold),
            candidate_workers: config.candidate_workers.max(1),
            photo_workers: config.photo_workers.max(1),
            cache_keying: config.cache_keying,
        }
    }

    /// Replace the distance strategy. The match threshold must suit it.
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn threshold(&self) -> f32 {
        self.policy.threshold
    }

    /// Decode an encoded photo, then [`recognize`](Self::recognize) it.
    pub async fn recognize_bytes(&self, bytes: &[u8], subject_id: &str) -> MatchDecision {
        if bytes.is_empty() {
            return MatchDecision::InvalidInput {
                message: "No image provided".into(),
            };
        }
        match decode_image(bytes) {
            Ok(image) => self.recognize(&image, subject_id).await,
            Err(e) => {
                tracing::info!(error = %e, "probe image could not be decoded");
                MatchDecision::InvalidInput {
                    message: format!("Could not decode image: {e}"),
                }
            }
        }
    }

    /// Identify which family member of `subject_id` appears in `probe`.
    ///
    /// Never fails: every error is reported as a [`MatchDecision`].
    pub async fn recognize(&self, probe: &RgbImage, subject_id: &str) -> MatchDecision {
        let span = tracing::info_span!(
            "recognize",
            request_id = %uuid::Uuid::new_v4(),
            subject = subject_id.trim(),
        );
        self.run(probe, subject_id.trim()).instrument(span).await
    }

    async fn run(&self, probe: &RgbImage, subject_id: &str) -> MatchDecision {
        if probe.width() == 0 || probe.height() == 0 {
            return MatchDecision::InvalidInput {
                message: "No image provided".into(),
            };
        }
        if subject_id.is_empty() {
            return MatchDecision::InvalidInput {
                message: "Subject ID is required".into(),
            };
        }

        let probe_embedding = match self.analyze_probe(probe).await {
            Ok(embedding) => embedding,
            Err(decision) => return decision,
        };

        let candidates = self.repository.candidates_for(subject_id).await;
        if candidates.is_empty() {
            tracing::info!("no family members found");
            return MatchDecision::NoFamilyData;
        }

        tracing::info!(candidates = candidates.len(), "verifying against family members");

        let results: Vec<VerificationResult> = stream::iter(candidates)
            .map(|candidate| self.verify_candidate(&probe_embedding, candidate))
            .buffer_unordered(self.candidate_workers)
            .filter_map(future::ready)
            .collect()
            .await;

        let Some(best) = select_best(results) else {
            tracing::warn!("no family member photo could be processed");
            return MatchDecision::ProcessingError {
                message: "Failed to process family member photos".into(),
            };
        };

        tracing::info!(
            best = %best.candidate.name,
            distance = best.distance,
            photos_checked = best.photos_checked,
            "best match selected"
        );

        self.policy
            .decide(&best.candidate, best.distance, best.photos_checked)
    }

    /// Quality gate, face extraction and embedding of the probe, on the blocking pool.
    async fn analyze_probe(&self, probe: &RgbImage) -> Result<Embedding, MatchDecision> {
        let quality = self.quality;
        let extractor = self.extractor.clone();
        let engine = Arc::clone(&self.engine);
        let image = probe.clone();
        let span = tracing::Span::current();

        let joined = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();

            if let Some(gate) = quality {
                let verdict = gate.check(&image);
                if let Some(issue) = verdict.issue {
                    tracing::info!(reason = issue.reason(), "probe rejected by quality gate");
                    return Err(MatchDecision::PoorImageQuality {
                        issue,
                        blur_score: verdict.blur_score,
                        brightness: verdict.brightness,
                    });
                }
            }

            let face = extractor.extract(&image).map_err(|e| match e {
                ExtractError::NoFaceDetected => {
                    tracing::info!("no face detected in probe");
                    MatchDecision::NoFace
                }
                ExtractError::LowQualityFace { confidence, .. } => {
                    tracing::info!(confidence, "probe face below confidence threshold");
                    MatchDecision::LowQualityFace {
                        face_confidence: confidence,
                    }
                }
                ExtractError::Detector(e) => {
                    tracing::warn!(error = %e, "face detection failed");
                    MatchDecision::DetectionError {
                        message: format!("Face detection failed: {e}"),
                    }
                }
            })?;

            tracing::debug!(confidence = face.confidence, "probe face detected");

            engine.embed(&face.aligned).map_err(|e| {
                tracing::warn!(error = %e, "probe embedding failed");
                MatchDecision::DetectionError {
                    message: "Failed to extract face features".into(),
                }
            })
        })
        .await;

        joined.unwrap_or_else(|e| {
            tracing::error!(error = %e, "probe analysis task failed");
            Err(MatchDecision::ProcessingError {
                message: "Probe analysis failed".into(),
            })
        })
    }

    /// Minimum distance over a candidate's usable photos; `None` when none were usable.
    async fn verify_candidate(
        &self,
        probe: &Embedding,
        candidate: Candidate,
    ) -> Option<VerificationResult> {
        if candidate.photo_urls.is_empty() {
            tracing::debug!(candidate = %candidate.name, "no reference photos");
            return None;
        }

        let distances: Vec<f32> = stream::iter(
            candidate
                .photo_urls
                .iter()
                .map(|url| self.photo_distance(probe, url))
                .collect::<Vec<_>>(),
        )
        .buffer_unordered(self.photo_workers)
            .filter_map(future::ready)
            .collect()
            .await;

        let distance = distances.iter().copied().min_by(|a, b| a.total_cmp(b))?;

        tracing::debug!(
            candidate = %candidate.name,
            distance,
            photos_checked = distances.len(),
            "candidate checked"
        );

        Some(VerificationResult {
            photos_checked: distances.len(),
            distance,
            candidate,
        })
    }

    async fn photo_distance(&self, probe: &Embedding, url: &str) -> Option<f32> {
        let reference = self.reference_embedding(url).await?;
        match self.verifier.distance(probe, &reference) {
            Ok(distance) => Some(distance),
            Err(e) => {
                tracing::warn!(url, error = %e, "reference embedding rejected");
                None
            }
        }
    }

    async fn reference_embedding(&self, url: &str) -> Option<Embedding> {
        match self.cache_keying {
            CacheKeying::Url => {
                let key = CacheKey::for_url(url);
                if let Some(hit) = self.cache.get(&key) {
                    tracing::trace!(url, "embedding cache hit");
                    return Some(hit);
                }
                // The miss is already counted; store without a second lookup.
                let bytes = self.download(url).await?;
                self.embed_reference(key, bytes, url, Lookup::Skip).await
            }
            CacheKeying::Content => {
                let bytes = self.download(url).await?;
                self.embed_reference(CacheKey::for_content(&bytes), bytes, url, Lookup::Check)
                    .await
            }
        }
    }

    async fn download(&self, url: &str) -> Option<Vec<u8>> {
        match self.photos.fetch(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(url, error = %e, "reference photo unusable");
                None
            }
        }
    }

    async fn embed_reference(
        &self,
        key: CacheKey,
        bytes: Vec<u8>,
        url: &str,
        lookup: Lookup,
    ) -> Option<Embedding> {
        let cache = Arc::clone(&self.cache);
        let extractor = self.extractor.clone();
        let engine = Arc::clone(&self.engine);
        let span = tracing::info_span!("reference", url);

        let joined = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            let compute = || {
                let image = match decode_image(&bytes) {
                    Ok(image) => image,
                    Err(e) => {
                        tracing::debug!(error = %e, "reference photo could not be decoded");
                        return None;
                    }
                };
                let face = extractor.extract_reference(&image);
                match engine.embed(&face) {
                    Ok(embedding) => Some(embedding),
                    Err(e) => {
                        tracing::warn!(error = %e, "reference embedding failed");
                        None
                    }
                }
            };
            match lookup {
                Lookup::Check => cache.get_or_compute(&key, compute),
                Lookup::Skip => {
                    let embedding = compute()?;
                    cache.insert(key, embedding.clone());
                    Some(embedding)
                }
            }
        })
        .await;

        joined.unwrap_or_else(|e| {
            tracing::error!(url, error = %e, "reference embedding task failed");
            None
        })
    }
}

/// Whether [`Matcher::embed_reference`] consults the cache before computing.
#[derive(Debug, Clone, Copy)]
enum Lookup {
    Check,
    /// The caller already looked the key up and missed.
    Skip,
}

/// Decode any supported image format into RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Global minimum distance. Ties go to the smallest candidate id, then name,
/// so the choice never depends on completion order.
fn select_best(results: Vec<VerificationResult>) -> Option<VerificationResult> {
    results.into_iter().min_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
            .then_with(|| a.candidate.name.cmp(&b.candidate.name))
    })
}
