//! Remote collaborators of the matcher: where candidates and their photos come from.

use crate::types::Candidate;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Lists the known family members of a subject.
///
/// Implementations swallow their own failures: an unreachable store, a bad
/// status or malformed JSON all come back as an empty list.
#[async_trait]
pub trait CandidateRepository: Send + Sync {
    async fn candidates_for(&self, subject_id: &str) -> Vec<Candidate>;
}

/// Downloads reference photo bytes by URL.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
