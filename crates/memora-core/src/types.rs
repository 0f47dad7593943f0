use serde::{Deserialize, Deserializer, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }
}

/// A known family member of a subject, with their reference photos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub relationship: String,
    #[serde(rename = "photoUrls", default)]
    pub photo_urls: Vec<String>,
}

/// Row ids come back as text or integers depending on the table schema.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Outcome of comparing the probe against every reference photo of one candidate.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub candidate: Candidate,
    /// Minimum distance across the candidate's successfully processed photos.
    pub distance: f32,
    pub photos_checked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_from_rest_row() {
        let json = r#"{
            "id": "c1",
            "name": "Alice",
            "relationship": "Daughter",
            "photoUrls": ["https://x/a.jpg", "https://x/b.jpg"],
            "patientId": "p1",
            "createdAt": "2024-01-01"
        }"#;
        let c: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.id, "c1");
        assert_eq!(c.name, "Alice");
        assert_eq!(c.relationship, "Daughter");
        assert_eq!(c.photo_urls.len(), 2);
    }

    #[test]
    fn test_candidate_numeric_id_and_defaults() {
        let c: Candidate = serde_json::from_str(r#"{"id": 42, "name": "Bob"}"#).unwrap();
        assert_eq!(c.id, "42");
        assert!(c.relationship.is_empty());
        assert!(c.photo_urls.is_empty());
    }
}
