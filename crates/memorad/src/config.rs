use memora_core::cache::{CacheKeying, DEFAULT_CAPACITY};
use memora_core::decision::DEFAULT_MATCH_THRESHOLD;
use memora_core::extractor::MIN_FACE_CONFIDENCE;
use memora_core::matcher::{MatcherConfig, DEFAULT_WORKERS};
use memora_core::QualityThresholds;
use memora_remote::repository::{RestConfig, DEFAULT_SUBJECT_COLUMN, DEFAULT_TABLE};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root URL of the family-member REST store.
    pub db_url: Option<String>,
    /// API key for the store, sent as `apikey` and bearer token.
    pub db_key: Option<String>,
    pub db_table: String,
    pub db_subject_column: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Cosine distance below which a candidate is a match.
    pub match_threshold: f32,
    /// Minimum detector confidence for the probe face.
    pub min_face_confidence: f32,
    pub candidate_workers: usize,
    pub photo_workers: usize,
    pub cache_capacity: usize,
    pub cache_keying: CacheKeying,
    /// Timeout in seconds for each repository query and photo download.
    pub http_timeout_secs: u64,
    /// Whether probes go through the image quality gate.
    pub quality_gate: bool,
    /// Serve on the system bus instead of the session bus.
    pub system_bus: bool,
}

impl Config {
    /// Load configuration from `MEMORA_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let model_dir = non_empty("MEMORA_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(memora_core::default_model_dir);

        Self {
            db_url: non_empty("MEMORA_DB_URL").or_else(|| non_empty("SUPABASE_URL")),
            db_key: non_empty("MEMORA_DB_KEY").or_else(|| non_empty("SUPABASE_KEY")),
            db_table: non_empty("MEMORA_DB_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            db_subject_column: non_empty("MEMORA_DB_SUBJECT_COLUMN")
                .unwrap_or_else(|| DEFAULT_SUBJECT_COLUMN.to_string()),
            model_dir,
            match_threshold: env_parse(&var, "MEMORA_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            min_face_confidence: env_parse(&var, "MEMORA_MIN_FACE_CONFIDENCE", MIN_FACE_CONFIDENCE),
            candidate_workers: env_parse(&var, "MEMORA_CANDIDATE_WORKERS", DEFAULT_WORKERS).max(1),
            photo_workers: env_parse(&var, "MEMORA_PHOTO_WORKERS", DEFAULT_WORKERS).max(1),
            cache_capacity: env_parse(&var, "MEMORA_CACHE_CAPACITY", DEFAULT_CAPACITY),
            cache_keying: env_parse(&var, "MEMORA_CACHE_KEYING", CacheKeying::Url),
            http_timeout_secs: env_parse(&var, "MEMORA_HTTP_TIMEOUT_SECS", memora_remote::DEFAULT_TIMEOUT.as_secs()).max(1),
            quality_gate: var("MEMORA_QUALITY_GATE").map(|v| v != "0").unwrap_or(true),
            system_bus: var("MEMORA_SYSTEM_BUS").map(|v| v == "1").unwrap_or(false),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            candidate_workers: self.candidate_workers,
            photo_workers: self.photo_workers,
            cache_keying: self.cache_keying,
            quality_gate: self.quality_gate,
            quality: QualityThresholds::default(),
            min_face_confidence: self.min_face_confidence,
            match_threshold: self.match_threshold,
        }
    }

    pub fn rest_config(&self) -> RestConfig {
        RestConfig {
            base_url: self.db_url.clone(),
            api_key: self.db_key.clone(),
            table: self.db_table.clone(),
            subject_column: self.db_subject_column.clone(),
        }
    }
}

/// Parse `key`, falling back to `default` when unset or invalid.
fn env_parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match var(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid configuration value; using default");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.db_url, None);
        assert_eq!(c.db_key, None);
        assert_eq!(c.db_table, "FamilyMember");
        assert_eq!(c.db_subject_column, "patientId");
        assert_eq!(c.match_threshold, 0.40);
        assert_eq!(c.min_face_confidence, 0.85);
        assert_eq!(c.candidate_workers, 4);
        assert_eq!(c.photo_workers, 4);
        assert_eq!(c.cache_capacity, 128);
        assert_eq!(c.cache_keying, CacheKeying::Url);
        assert_eq!(c.http_timeout(), Duration::from_secs(5));
        assert!(c.quality_gate);
        assert!(!c.system_bus);
        assert!(c.model_dir.ends_with("memora/models"));
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("MEMORA_DB_URL", "https://store.example"),
            ("MEMORA_DB_KEY", "k"),
            ("MEMORA_MODEL_DIR", "/opt/models"),
            ("MEMORA_MATCH_THRESHOLD", "0.35"),
            ("MEMORA_CANDIDATE_WORKERS", "8"),
            ("MEMORA_CACHE_KEYING", "content"),
            ("MEMORA_QUALITY_GATE", "0"),
            ("MEMORA_SYSTEM_BUS", "1"),
        ]);
        assert_eq!(c.db_url.as_deref(), Some("https://store.example"));
        assert_eq!(c.scrfd_model_path(), "/opt/models/det_10g.onnx");
        assert_eq!(c.arcface_model_path(), "/opt/models/w600k_r50.onnx");
        assert_eq!(c.match_threshold, 0.35);
        assert_eq!(c.candidate_workers, 8);
        assert_eq!(c.cache_keying, CacheKeying::Content);
        assert!(!c.quality_gate);
        assert!(c.system_bus);

        let m = c.matcher_config();
        assert!(!m.quality_gate);
        assert_eq!(m.match_threshold, 0.35);
        assert!(c.rest_config().is_configured());
    }

    #[test]
    fn test_supabase_fallback() {
        let c = config(&[("SUPABASE_URL", "https://legacy.example"), ("SUPABASE_KEY", "old")]);
        assert_eq!(c.db_url.as_deref(), Some("https://legacy.example"));
        assert_eq!(c.db_key.as_deref(), Some("old"));

        let c = config(&[
            ("SUPABASE_URL", "https://legacy.example"),
            ("MEMORA_DB_URL", "https://new.example"),
        ]);
        assert_eq!(c.db_url.as_deref(), Some("https://new.example"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let c = config(&[
            ("MEMORA_MATCH_THRESHOLD", "tight"),
            ("MEMORA_PHOTO_WORKERS", "0"),
            ("MEMORA_CACHE_KEYING", "md5"),
            ("MEMORA_DB_URL", "  "),
        ]);
        assert_eq!(c.match_threshold, 0.40);
        assert_eq!(c.photo_workers, 1);
        assert_eq!(c.cache_keying, CacheKeying::Url);
        assert_eq!(c.db_url, None);
    }
}
