//! Mock extractor for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::extractor::{Chunk, ExtractError, Extractor, Grounding, StructuredContent};

/// A recorded extraction call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedExtraction {
    pub filename: String,
    pub document_bytes: usize,
    pub success: bool,
}

/// Mock implementation of the Extractor trait.
///
/// Provides controllable behavior for testing:
/// - Script one-shot failures (consumed in order)
/// - Set a persistent failure
/// - Override the returned structured content
/// - Record calls for skip/retry assertions
#[derive(Debug, Clone)]
pub struct MockExtractor {
    /// One-shot failures, consumed front to back.
    scripted_failures: Arc<RwLock<Vec<ExtractError>>>,
    /// Persistent failure, returned on every call until cleared.
    persistent_failure: Arc<RwLock<Option<ExtractError>>>,
    /// Persistent failures scoped to one file name, checked first.
    failures_by_file: Arc<RwLock<std::collections::HashMap<String, ExtractError>>>,
    /// Content returned on success; a one-chunk page by default.
    content: Arc<RwLock<Option<StructuredContent>>>,
    /// Simulated processing delay applied to every call.
    delay: Arc<RwLock<Duration>>,
    /// Recorded calls.
    extractions: Arc<RwLock<Vec<RecordedExtraction>>>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    /// Create a new mock extractor that succeeds on every call.
    pub fn new() -> Self {
        Self {
            scripted_failures: Arc::new(RwLock::new(Vec::new())),
            persistent_failure: Arc::new(RwLock::new(None)),
            failures_by_file: Arc::new(RwLock::new(std::collections::HashMap::new())),
            content: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            extractions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue a one-shot failure, consumed before any persistent failure.
    pub async fn push_failure(&self, error: ExtractError) {
        self.scripted_failures.write().await.push(error);
    }

    /// Fail every call until cleared.
    pub async fn set_failure(&self, error: ExtractError) {
        *self.persistent_failure.write().await = Some(error);
    }

    /// Remove the persistent failure.
    pub async fn clear_failure(&self) {
        *self.persistent_failure.write().await = None;
    }

    /// Fail every call for one file name, leaving other documents alone.
    pub async fn set_failure_for(&self, filename: &str, error: ExtractError) {
        self.failures_by_file
            .write()
            .await
            .insert(filename.to_string(), error);
    }

    /// Override the content returned by successful extractions.
    pub async fn set_content(&self, content: StructuredContent) {
        *self.content.write().await = Some(content);
    }

    /// Simulate a slow service: every call sleeps this long first.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Number of extraction calls made.
    pub async fn call_count(&self) -> usize {
        self.extractions.read().await.len()
    }

    /// Get all recorded extraction calls.
    pub async fn recorded_extractions(&self) -> Vec<RecordedExtraction> {
        self.extractions.read().await.clone()
    }

    /// Default single-page content for a document.
    fn default_content(filename: &str) -> StructuredContent {
        StructuredContent {
            filename: filename.to_string(),
            markdown: "# Mock document\n\nExtracted text.".to_string(),
            chunks: vec![Chunk {
                id: "chunk_0".to_string(),
                content: "Extracted text.".to_string(),
                chunk_type: "text".to_string(),
                grounding: vec![Grounding { page: 1, bbox: None }],
            }],
            figures: vec![],
        }
    }

    async fn record(&self, filename: &str, document_bytes: usize, success: bool) {
        self.extractions.write().await.push(RecordedExtraction {
            filename: filename.to_string(),
            document_bytes,
            success,
        });
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn extract(
        &self,
        document: &[u8],
        filename: &str,
    ) -> Result<StructuredContent, ExtractError> {
        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut scripted = self.scripted_failures.write().await;
            if !scripted.is_empty() {
                let error = scripted.remove(0);
                self.record(filename, document.len(), false).await;
                return Err(error);
            }
        }

        if let Some(error) = self.failures_by_file.read().await.get(filename).cloned() {
            self.record(filename, document.len(), false).await;
            return Err(error);
        }

        if let Some(error) = self.persistent_failure.read().await.clone() {
            self.record(filename, document.len(), false).await;
            return Err(error);
        }

        self.record(filename, document.len(), true).await;
        let content = self.content.read().await.clone();
        Ok(content.unwrap_or_else(|| Self::default_content(filename)))
    }
}
