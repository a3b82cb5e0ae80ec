//! Document acquisition collaborator.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpFetcher;

/// Errors fetching a remote document.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection could not be established.
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// Request exceeded the configured timeout.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Server answered with a non-success status.
    #[error("HTTP status {status}")]
    Http { status: u16 },

    /// Response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Unreachable(_) | FetchError::Timeout { .. } | FetchError::Body(_) => true,
            FetchError::Http { status } => *status == 408 || *status == 429 || *status >= 500,
            FetchError::Client(_) => false,
        }
    }
}

/// Fetches a remote resource given a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Implementation name for logging.
    fn name(&self) -> &str;

    /// Fetch the resource and return its bytes.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip TLS certificate verification. Several AIP mirrors serve
    /// misconfigured certificates; downloads are integrity-checked by the
    /// extraction stage anyway.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_accept_invalid_certs() -> bool {
    true
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout { timeout_secs: 30 }.is_transient());
        assert!(FetchError::Unreachable("dns".into()).is_transient());
        assert!(FetchError::Http { status: 503 }.is_transient());
        assert!(FetchError::Http { status: 429 }.is_transient());
        assert!(!FetchError::Http { status: 404 }.is_transient());
        assert!(!FetchError::Http { status: 403 }.is_transient());
    }

    #[test]
    fn test_config_defaults() {
        let config = FetcherConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.accept_invalid_certs);

        let parsed: FetcherConfig = toml::from_str("timeout_secs = 10").unwrap();
        assert_eq!(parsed.timeout_secs, 10);
        assert!(parsed.accept_invalid_certs);
    }
}
