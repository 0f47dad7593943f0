//! Outcome taxonomy and the threshold policy that turns a best distance into a decision.

use crate::quality::QualityIssue;
use crate::types::Candidate;
use serde::Serialize;

/// Cosine-distance cutoff for a positive match. Calibrated for ArcFace/Facenet512-style
/// embeddings; a different embedding engine needs its own calibration.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.40;

/// Final result of one recognition call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "RecognitionResponse")]
pub enum MatchDecision {
    Matched {
        id: String,
        name: String,
        relationship: String,
        confidence: f32,
        distance: f32,
        photos_checked: usize,
    },
    /// A face was found and compared, but nobody is close enough.
    UnknownPerson {
        confidence: f32,
        distance: f32,
        /// Closest candidate, reported for diagnostics only.
        closest_name: String,
    },
    NoFace,
    LowQualityFace {
        face_confidence: f32,
    },
    /// The probe failed the image quality gate.
    PoorImageQuality {
        issue: QualityIssue,
        blur_score: Option<f64>,
        brightness: Option<f64>,
    },
    DetectionError {
        message: String,
    },
    NoFamilyData,
    ProcessingError {
        message: String,
    },
    InvalidInput {
        message: String,
    },
}

/// Category reported as `error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    NoFace,
    LowQualityFace,
    DetectionError,
    NoFamilyData,
    ProcessingError,
    UnknownPerson,
}

impl MatchDecision {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchDecision::Matched { .. })
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            MatchDecision::Matched { .. } | MatchDecision::InvalidInput { .. } => None,
            MatchDecision::UnknownPerson { .. } => Some(ErrorType::UnknownPerson),
            MatchDecision::NoFace => Some(ErrorType::NoFace),
            MatchDecision::LowQualityFace { .. } | MatchDecision::PoorImageQuality { .. } => {
                Some(ErrorType::LowQualityFace)
            }
            MatchDecision::DetectionError { .. } => Some(ErrorType::DetectionError),
            MatchDecision::NoFamilyData => Some(ErrorType::NoFamilyData),
            MatchDecision::ProcessingError { .. } => Some(ErrorType::ProcessingError),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(RecognitionResponse::from(self.clone()))
    }
}

/// Applies the distance threshold to the globally best candidate.
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    pub threshold: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl DecisionPolicy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Strictly below the threshold is a match; exactly at it is not.
    pub fn decide(&self, best: &Candidate, distance: f32, photos_checked: usize) -> MatchDecision {
        let confidence = confidence_from_distance(distance);

        if distance < self.threshold {
            MatchDecision::Matched {
                id: best.id.clone(),
                name: best.name.clone(),
                relationship: best.relationship.clone(),
                confidence,
                distance,
                photos_checked,
            }
        } else {
            MatchDecision::UnknownPerson {
                confidence,
                distance,
                closest_name: best.name.clone(),
            }
        }
    }
}

/// `clamp(1 - distance, 0, 1)`; a NaN distance has zero confidence.
pub fn confidence_from_distance(distance: f32) -> f32 {
    let c = 1.0 - distance;
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 1.0)
    }
}

/// Flat JSON shape of a [`MatchDecision`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecognitionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(rename = "match")]
    pub is_match: bool,
    pub error_type: Option<ErrorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos_checked: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closest_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closest_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_issue: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

impl From<MatchDecision> for RecognitionResponse {
    fn from(decision: MatchDecision) -> Self {
        let error_type = decision.error_type();
        let unknown = || Some("Unknown".to_string());

        match decision {
            MatchDecision::Matched {
                id,
                name,
                relationship,
                confidence,
                distance,
                photos_checked,
            } => Self {
                id: Some(id),
                name: Some(name),
                relationship: Some(relationship),
                confidence: Some(round_to(confidence as f64, 2)),
                distance: Some(round_to(distance as f64, 4)),
                is_match: true,
                error_type,
                photos_checked: Some(photos_checked),
                ..Default::default()
            },
            MatchDecision::UnknownPerson {
                confidence,
                distance,
                closest_name,
            } => Self {
                name: unknown(),
                relationship: Some(String::new()),
                confidence: Some(round_to(confidence as f64, 2)),
                distance: Some(round_to(distance as f64, 4)),
                error_type,
                message: Some("Face detected but does not match any family member".into()),
                closest_match: Some(closest_name),
                closest_distance: Some(round_to(distance as f64, 4)),
                ..Default::default()
            },
            MatchDecision::NoFace => Self {
                error_type,
                error: Some("No face detected in the image".into()),
                suggestion: Some("Please upload an image with a clear, visible face".into()),
                ..Default::default()
            },
            MatchDecision::LowQualityFace { face_confidence } => Self {
                error_type,
                error: Some("Face detected but quality too low".into()),
                suggestion: Some("Please use a clearer image with better lighting".into()),
                face_confidence: Some(round_to(face_confidence as f64, 2)),
                ..Default::default()
            },
            MatchDecision::PoorImageQuality {
                issue,
                blur_score,
                brightness,
            } => Self {
                error_type,
                error: Some(issue.to_string()),
                suggestion: Some(issue.suggestion().into()),
                quality_issue: Some(issue.code()),
                blur_score: blur_score.map(|s| round_to(s, 1)),
                brightness: brightness.map(|b| round_to(b, 1)),
                ..Default::default()
            },
            MatchDecision::DetectionError { message } => Self {
                error_type,
                error: Some(message),
                ..Default::default()
            },
            MatchDecision::NoFamilyData => Self {
                name: unknown(),
                confidence: Some(0.0),
                error_type,
                error: Some("No family data".into()),
                message: Some("No family members found for this patient".into()),
                ..Default::default()
            },
            MatchDecision::ProcessingError { message } => Self {
                name: unknown(),
                relationship: Some(String::new()),
                confidence: Some(0.0),
                error_type,
                error: Some("Processing error".into()),
                message: Some(message),
                ..Default::default()
            },
            MatchDecision::InvalidInput { message } => Self {
                error_type,
                error: Some(message),
                ..Default::default()
            },
        }
    }
}

impl From<RecognitionResponse> for serde_json::Value {
    fn from(response: RecognitionResponse) -> Self {
        serde_json::to_value(response).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(name: &str) -> Candidate {
        Candidate {
            id: format!("id-{name}"),
            name: name.to_string(),
            relationship: "Son".to_string(),
            photo_urls: vec![],
        }
    }

    #[test]
    fn test_below_threshold_matches() {
        let d = DecisionPolicy::default().decide(&candidate("X"), 0.39, 1);
        assert!(d.is_match());
    }

    #[test]
    fn test_exact_threshold_is_not_a_match() {
        let d = DecisionPolicy::default().decide(&candidate("X"), 0.40, 1);
        assert!(!d.is_match());
        assert_eq!(d.error_type(), Some(ErrorType::UnknownPerson));
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(confidence_from_distance(1.7), 0.0);
        assert_eq!(confidence_from_distance(-0.5), 1.0);
        assert_eq!(confidence_from_distance(f32::NAN), 0.0);
        assert!((confidence_from_distance(0.25) - 0.75).abs() < 1e-6);

        for d in [-3.0f32, -0.01, 0.0, 0.4, 1.0, 1.5, 2.0, 9.0] {
            let decision = DecisionPolicy::default().decide(&candidate("X"), d, 1);
            let c = match decision {
                MatchDecision::Matched { confidence, .. } => confidence,
                MatchDecision::UnknownPerson { confidence, .. } => confidence,
                other => panic!("unexpected {other:?}"),
            };
            assert!((0.0..=1.0).contains(&c), "distance {d} gave confidence {c}");
        }
    }

    #[test]
    fn test_matched_json() {
        let d = DecisionPolicy::default().decide(&candidate("X"), 0.25, 2);
        assert_eq!(
            d.to_json(),
            json!({
                "id": "id-X",
                "name": "X",
                "relationship": "Son",
                "confidence": 0.75,
                "distance": 0.25,
                "match": true,
                "error_type": null,
                "photos_checked": 2,
            })
        );
    }

    #[test]
    fn test_unknown_person_json() {
        let d = DecisionPolicy::default().decide(&candidate("Y"), 0.61234, 1);
        let v = d.to_json();
        assert_eq!(v["match"], false);
        assert_eq!(v["error_type"], "unknown_person");
        assert_eq!(v["name"], "Unknown");
        assert_eq!(v["closest_match"], "Y");
        assert_eq!(v["closest_distance"], 0.6123);
        assert_eq!(v["confidence"], 0.39);
        assert!(v.get("error").is_none());
    }

    #[test]
    fn test_failure_outcomes_carry_error() {
        let cases = [
            (MatchDecision::NoFace, "no_face"),
            (MatchDecision::LowQualityFace { face_confidence: 0.7 }, "low_quality_face"),
            (
                MatchDecision::PoorImageQuality {
                    issue: QualityIssue::TooBlurry { score: 12.34 },
                    blur_score: Some(12.34),
                    brightness: Some(120.0),
                },
                "low_quality_face",
            ),
            (MatchDecision::DetectionError { message: "x".into() }, "detection_error"),
            (MatchDecision::NoFamilyData, "no_family_data"),
            (MatchDecision::ProcessingError { message: "x".into() }, "processing_error"),
        ];
        for (decision, error_type) in cases {
            let v = decision.to_json();
            assert_eq!(v["match"], false);
            assert_eq!(v["error_type"], error_type);
            assert!(v["error"].is_string(), "{v}");
        }
    }

    #[test]
    fn test_quality_json_fields() {
        let v = MatchDecision::PoorImageQuality {
            issue: QualityIssue::PoorLighting { brightness: 12.0 },
            blur_score: Some(300.04),
            brightness: Some(12.0),
        }
        .to_json();
        assert_eq!(v["quality_issue"], "poor_lighting");
        assert_eq!(v["blur_score"], 300.0);
        assert_eq!(v["error"], "Poor lighting (brightness: 12.0)");
    }

    #[test]
    fn test_invalid_input_json() {
        let v = MatchDecision::InvalidInput { message: "No image provided".into() }.to_json();
        assert_eq!(v, json!({"match": false, "error_type": null, "error": "No image provided"}));
    }
}
