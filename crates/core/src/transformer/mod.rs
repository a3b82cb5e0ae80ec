//! Semantic transformation collaborator (LLM structuring).

mod llm;
mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extractor::StructuredContent;
use crate::manifest::DocumentDescriptor;

pub use llm::LlmTransformer;
pub use types::{
    pages_of, PageContent, PageGroup, StructuredPage, TransformMetadata, TransformedDocument,
};

/// Errors from the transformation service.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// Service asked us to slow down.
    #[error("transformation rate limited")]
    RateLimited,

    /// Request exceeded the configured timeout.
    #[error("transformation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Model output did not match the expected JSON shape.
    #[error("transformation schema violation: {0}")]
    SchemaViolation(String),

    /// Service-level error response.
    #[error("transformation API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Transport failure before any response.
    #[error("transformation HTTP error: {0}")]
    Http(String),
}

impl TransformError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransformError::RateLimited
            | TransformError::Timeout { .. }
            | TransformError::Http(_) => true,
            TransformError::Api { status, .. } => *status >= 500,
            TransformError::SchemaViolation(_) => false,
        }
    }
}

/// Accepts structured content and returns the transformed JSON document.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Implementation name for logging.
    fn name(&self) -> &str;

    /// Transform extracted content into the final document shape.
    async fn transform(
        &self,
        content: &StructuredContent,
        descriptor: &DocumentDescriptor,
    ) -> Result<TransformedDocument, TransformError>;
}

/// Configuration for the LLM transformation client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Base URL of a chat-completions compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key; can also be supplied via `AEROPIPE_TRANSFORMER_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Token budget for structuring one page of text.
    #[serde(default = "default_page_max_tokens")]
    pub page_max_tokens: u32,
    /// Token budget for structuring one figure.
    #[serde(default = "default_figure_max_tokens")]
    pub figure_max_tokens: u32,
}

fn default_api_base() -> String {
    "https://api.mistral.ai".to_string()
}

fn default_model() -> String {
    "mistral-large-latest".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_page_max_tokens() -> u32 {
    4000
}

fn default_figure_max_tokens() -> u32 {
    3000
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            page_max_tokens: default_page_max_tokens(),
            figure_max_tokens: default_figure_max_tokens(),
        }
    }
}
