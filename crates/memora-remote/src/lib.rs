//! memora-remote: HTTP access to the family-member store and reference photos.
//!
//! Provides the REST-backed [`CandidateRepository`](memora_core::CandidateRepository)
//! and the HTTP [`PhotoSource`](memora_core::PhotoSource) used by the daemon.

pub mod client;
pub mod fetcher;
pub mod repository;

#[cfg(test)]
mod test_server;

pub use client::{http_client, DEFAULT_TIMEOUT};
pub use fetcher::HttpPhotoFetcher;
pub use repository::{RepositoryError, RestCandidateRepository, RestConfig};
