//! Mock transformer for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::extractor::StructuredContent;
use crate::manifest::DocumentDescriptor;
use crate::transformer::{
    pages_of, PageContent, StructuredPage, TransformError, TransformMetadata, TransformedDocument,
    Transformer,
};

/// Mock implementation of the Transformer trait.
///
/// Builds a minimal but well-formed [`TransformedDocument`] from the input
/// content, so downstream assertions can check page counts and metadata.
/// Failures are injectable the same way as the other mocks.
#[derive(Debug, Clone)]
pub struct MockTransformer {
    /// One-shot failures, consumed front to back.
    scripted_failures: Arc<RwLock<Vec<TransformError>>>,
    /// Persistent failure, returned on every call until cleared.
    persistent_failure: Arc<RwLock<Option<TransformError>>>,
    /// Simulated processing delay applied to every call.
    delay: Arc<RwLock<Duration>>,
    /// Document ids of recorded calls.
    calls: Arc<RwLock<Vec<String>>>,
}

impl Default for MockTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransformer {
    /// Create a new mock transformer that succeeds on every call.
    pub fn new() -> Self {
        Self {
            scripted_failures: Arc::new(RwLock::new(Vec::new())),
            persistent_failure: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue a one-shot failure, consumed before any persistent failure.
    pub async fn push_failure(&self, error: TransformError) {
        self.scripted_failures.write().await.push(error);
    }

    /// Fail every call until cleared.
    pub async fn set_failure(&self, error: TransformError) {
        *self.persistent_failure.write().await = Some(error);
    }

    /// Remove the persistent failure.
    pub async fn clear_failure(&self) {
        *self.persistent_failure.write().await = None;
    }

    /// Simulate a slow service: every call sleeps this long first.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Number of transform calls made.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

#[async_trait]
impl Transformer for MockTransformer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transform(
        &self,
        content: &StructuredContent,
        descriptor: &DocumentDescriptor,
    ) -> Result<TransformedDocument, TransformError> {
        self.calls.write().await.push(descriptor.doc_id());

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut scripted = self.scripted_failures.write().await;
            if !scripted.is_empty() {
                return Err(scripted.remove(0));
            }
        }
        if let Some(error) = self.persistent_failure.read().await.clone() {
            return Err(error);
        }

        let pages = pages_of(content);
        let content_pages = pages
            .iter()
            .map(|(page_number, group)| {
                let text = group.text();
                PageContent {
                    page_number: *page_number,
                    structured_page_content: StructuredPage::fallback(
                        format!("{}_page_{}", descriptor.file_stem(), page_number),
                        descriptor.language.clone(),
                        format!("Mock structuring of page {page_number}"),
                        &text,
                    ),
                    structured_image_content: group
                        .figures
                        .iter()
                        .map(|figure| {
                            StructuredPage::fallback(
                                figure.id.clone(),
                                descriptor.language.clone(),
                                "Mock figure structuring",
                                &figure.text,
                            )
                        })
                        .collect(),
                    text,
                    text_embedding: Vec::new(),
                }
            })
            .collect();

        Ok(TransformedDocument {
            metadata: TransformMetadata::new(
                descriptor,
                content,
                vec!["mock".to_string()],
            ),
            content: content_pages,
        })
    }
}
