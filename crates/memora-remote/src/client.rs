//! Shared HTTP client construction.

use std::time::Duration;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout applied to repository queries and photo downloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates an HTTPS client whose requests give up after `timeout`.
///
/// One client is shared by the repository and the photo fetcher so both
/// reuse the same connection pool.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
}
