//! Mock fetcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::fetcher::{FetchError, Fetcher};

/// Mock implementation of the Fetcher trait.
///
/// Provides controllable behavior for testing:
/// - Script one-shot failures per URL (consumed in order)
/// - Set a persistent failure per URL
/// - Simulate slow responses
/// - Count invocations per URL for skip/retry assertions
///
/// # Example
///
/// ```rust,ignore
/// use aeropipe_core::testing::MockFetcher;
///
/// let fetcher = MockFetcher::new();
///
/// // First two calls fail transiently, the third succeeds.
/// fetcher.push_failure(url, FetchError::Timeout { timeout_secs: 30 }).await;
/// fetcher.push_failure(url, FetchError::Http { status: 503 }).await;
///
/// let bytes = fetcher.fetch(url).await?;
/// assert_eq!(fetcher.call_count(url).await, 3);
/// ```
#[derive(Debug, Clone)]
pub struct MockFetcher {
    /// One-shot failures per URL, consumed front to back.
    scripted_failures: Arc<RwLock<HashMap<String, Vec<FetchError>>>>,
    /// Persistent failure per URL, returned on every call until cleared.
    persistent_failures: Arc<RwLock<HashMap<String, FetchError>>>,
    /// Bytes returned on success; defaults to a small PDF stub.
    response_body: Arc<RwLock<Vec<u8>>>,
    /// Simulated network delay applied to every call.
    delay: Arc<RwLock<Duration>>,
    /// Invocation count per URL.
    calls: Arc<RwLock<HashMap<String, usize>>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    /// Create a new mock fetcher that succeeds on every call.
    pub fn new() -> Self {
        Self {
            scripted_failures: Arc::new(RwLock::new(HashMap::new())),
            persistent_failures: Arc::new(RwLock::new(HashMap::new())),
            response_body: Arc::new(RwLock::new(b"%PDF-1.4 mock document".to_vec())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            calls: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Queue a one-shot failure for the given URL. Queued failures are
    /// consumed in order before any persistent failure or success.
    pub async fn push_failure(&self, url: &str, error: FetchError) {
        self.scripted_failures
            .write()
            .await
            .entry(url.to_string())
            .or_default()
            .push(error);
    }

    /// Fail every call for the given URL until cleared.
    pub async fn set_failure(&self, url: &str, error: FetchError) {
        self.persistent_failures
            .write()
            .await
            .insert(url.to_string(), error);
    }

    /// Remove the persistent failure for the given URL.
    pub async fn clear_failure(&self, url: &str) {
        self.persistent_failures.write().await.remove(url);
    }

    /// Set the bytes returned by successful fetches.
    pub async fn set_response_body(&self, body: impl Into<Vec<u8>>) {
        *self.response_body.write().await = body.into();
    }

    /// Simulate a slow network: every call sleeps this long first.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Number of fetch calls made for the given URL.
    pub async fn call_count(&self, url: &str) -> usize {
        self.calls.read().await.get(url).copied().unwrap_or(0)
    }

    /// Total fetch calls across all URLs.
    pub async fn total_calls(&self) -> usize {
        self.calls.read().await.values().sum()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        {
            let mut calls = self.calls.write().await;
            *calls.entry(url.to_string()).or_insert(0) += 1;
        }

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut scripted = self.scripted_failures.write().await;
            if let Some(queue) = scripted.get_mut(url) {
                if !queue.is_empty() {
                    return Err(queue.remove(0));
                }
            }
        }

        if let Some(error) = self.persistent_failures.read().await.get(url) {
            return Err(error.clone());
        }

        Ok(self.response_body.read().await.clone())
    }
}
