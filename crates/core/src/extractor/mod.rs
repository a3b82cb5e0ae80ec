//! Structured extraction collaborator (vision document parsing).

mod types;
mod vision;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use types::{Chunk, ExtractionEnvelope, ExtractionMetadata, Figure, Grounding, StructuredContent};
pub use vision::VisionExtractor;

/// Errors from the extraction service.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// Service asked us to slow down.
    #[error("extraction rate limited{}", retry_after_ms.map(|ms| format!(", retry in {ms}ms")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    /// Request exceeded the configured timeout.
    #[error("extraction timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Document cannot be parsed by the service.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// Service-level error response.
    #[error("extraction API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Transport failure before any response.
    #[error("extraction HTTP error: {0}")]
    Http(String),

    /// Response did not decode into structured content.
    #[error("extraction response JSON error: {0}")]
    Json(String),
}

impl ExtractError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ExtractError::RateLimited { .. }
            | ExtractError::Timeout { .. }
            | ExtractError::Http(_) => true,
            ExtractError::Api { status, .. } => *status >= 500,
            ExtractError::UnsupportedFormat(_) | ExtractError::Json(_) => false,
        }
    }
}

/// Accepts a document file and returns its structured content.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Implementation name for logging.
    fn name(&self) -> &str;

    /// Extract structured content from raw document bytes.
    async fn extract(
        &self,
        document: &[u8],
        filename: &str,
    ) -> Result<StructuredContent, ExtractError>;
}

/// Configuration for the vision extraction client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Base URL of the extraction API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key; can also be supplied via `AEROPIPE_EXTRACTOR_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds. Extraction of large documents is
    /// slow, so this is generous by default.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.landing.ai".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExtractError::RateLimited { retry_after_ms: None }.is_transient());
        assert!(ExtractError::Timeout { timeout_secs: 600 }.is_transient());
        assert!(ExtractError::Api { status: 502, message: "bad gateway".into() }.is_transient());
        assert!(!ExtractError::Api { status: 422, message: "bad doc".into() }.is_transient());
        assert!(!ExtractError::UnsupportedFormat("not a pdf".into()).is_transient());
        assert!(!ExtractError::Json("truncated".into()).is_transient());
    }

    #[test]
    fn test_rate_limited_display() {
        let err = ExtractError::RateLimited {
            retry_after_ms: Some(1500),
        };
        assert_eq!(err.to_string(), "extraction rate limited, retry in 1500ms");
        let err = ExtractError::RateLimited { retry_after_ms: None };
        assert_eq!(err.to_string(), "extraction rate limited");
    }

    #[test]
    fn test_config_defaults() {
        let parsed: ExtractorConfig = toml::from_str("").unwrap();
        assert_eq!(parsed.timeout_secs, 600);
        assert!(parsed.api_key.is_none());
    }
}
