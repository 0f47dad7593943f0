//! Family-member lookup against a PostgREST-style REST endpoint.

use async_trait::async_trait;
use memora_core::source::CandidateRepository;
use memora_core::types::Candidate;
use thiserror::Error;

pub const DEFAULT_TABLE: &str = "FamilyMember";
pub const DEFAULT_SUBJECT_COLUMN: &str = "patientId";

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("store not configured")]
    NotConfigured,
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RepositoryError::Timeout
        } else {
            RepositoryError::Transport(err)
        }
    }
}

/// Where and how to query family members.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Service root, e.g. `https://project.example.co`. Unset disables lookups.
    pub base_url: Option<String>,
    /// Sent both as `apikey` and as a bearer token. Unset disables lookups.
    pub api_key: Option<String>,
    pub table: String,
    /// Column holding the subject id the rows are filtered on.
    pub subject_column: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            table: DEFAULT_TABLE.to_string(),
            subject_column: DEFAULT_SUBJECT_COLUMN.to_string(),
        }
    }
}

impl RestConfig {
    pub fn is_configured(&self) -> bool {
        self.base_url.as_deref().is_some_and(|u| !u.is_empty())
            && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

pub struct RestCandidateRepository {
    client: reqwest::Client,
    config: RestConfig,
}

impl RestCandidateRepository {
    pub fn new(client: reqwest::Client, config: RestConfig) -> Self {
        if !config.is_configured() {
            tracing::warn!("family-member store not configured; every lookup will be empty");
        }
        Self { client, config }
    }

    /// `GET {base}/rest/v1/{table}?select=*&{column}=eq.{subject}` with auth headers.
    fn request(&self, subject_id: &str) -> Option<reqwest::RequestBuilder> {
        let (Some(base), Some(key)) = (&self.config.base_url, &self.config.api_key) else {
            return None;
        };
        if base.is_empty() || key.is_empty() {
            return None;
        }

        let url = format!("{}/rest/v1/{}", base.trim_end_matches('/'), self.config.table);
        let filter = format!("eq.{subject_id}");

        Some(
            self.client
                .get(url)
                .query(&[("select", "*"), (self.config.subject_column.as_str(), filter.as_str())])
                .header("apikey", key)
                .bearer_auth(key),
        )
    }

    async fn query(&self, subject_id: &str) -> Result<Vec<Candidate>, RepositoryError> {
        let request = self.request(subject_id).ok_or(RepositoryError::NotConfigured)?;

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RepositoryError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_rows(&body)
    }
}

#[async_trait]
impl CandidateRepository for RestCandidateRepository {
    async fn candidates_for(&self, subject_id: &str) -> Vec<Candidate> {
        match self.query(subject_id).await {
            Ok(candidates) => {
                tracing::debug!(subject = subject_id, count = candidates.len(), "family members loaded");
                candidates
            }
            Err(e) => {
                tracing::warn!(subject = subject_id, error = %e, "family member lookup failed");
                Vec::new()
            }
        }
    }
}

/// Decode a JSON array of rows. Rows missing required fields are skipped.
fn parse_rows(body: &str) -> Result<Vec<Candidate>, RepositoryError> {
    let rows: Vec<serde_json::Value> = serde_json::from_str(body)?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<Candidate>(row) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed family member row");
                None
            }
        })
        .collect())
}
