//! Face extraction: pick the best detected face, gate on confidence, align.

use crate::alignment;
use crate::detector::{DetectorError, FaceDetector};
use crate::types::BoundingBox;
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

/// Faces detected below this confidence are rejected as low quality.
pub const MIN_FACE_CONFIDENCE: f32 = 0.85;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("face detected but confidence {confidence:.2} is below {threshold:.2}")]
    LowQualityFace { confidence: f32, threshold: f32 },
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// An aligned face crop ready for embedding.
#[derive(Debug, Clone)]
pub struct FaceRegion {
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// 112×112 RGB crop.
    pub aligned: RgbImage,
}

#[derive(Clone)]
pub struct FaceExtractor {
    detector: Arc<dyn FaceDetector>,
    min_confidence: f32,
}

impl FaceExtractor {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self::with_min_confidence(detector, MIN_FACE_CONFIDENCE)
    }

    pub fn with_min_confidence(detector: Arc<dyn FaceDetector>, min_confidence: f32) -> Self {
        Self {
            detector,
            min_confidence,
        }
    }

    /// Extract the most confident face from a probe image.
    pub fn extract(&self, image: &RgbImage) -> Result<FaceRegion, ExtractError> {
        let best = best_face(self.detector.detect(image)?).ok_or(ExtractError::NoFaceDetected)?;

        if best.confidence < self.min_confidence {
            return Err(ExtractError::LowQualityFace {
                confidence: best.confidence,
                threshold: self.min_confidence,
            });
        }

        Ok(FaceRegion {
            aligned: align(image, &best),
            confidence: best.confidence,
            bbox: best,
        })
    }

    /// Face crop for a reference photo.
    ///
    /// Reference photos are curated by family members, so there is no
    /// confidence gate: the best face is used when one is found, otherwise
    /// the whole photo is embedded.
    pub fn extract_reference(&self, image: &RgbImage) -> RgbImage {
        match self.detector.detect(image) {
            Ok(faces) => match best_face(faces) {
                Some(face) => align(image, &face),
                None => alignment::resize_to_aligned(image),
            },
            Err(e) => {
                tracing::debug!(error = %e, "reference detection failed; using whole photo");
                alignment::resize_to_aligned(image)
            }
        }
    }
}

fn best_face(faces: Vec<BoundingBox>) -> Option<BoundingBox> {
    faces.into_iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

fn align(image: &RgbImage, face: &BoundingBox) -> RgbImage {
    match &face.landmarks {
        Some(landmarks) => alignment::align_face(image, landmarks),
        None => alignment::crop_face(image, face),
    }
}
