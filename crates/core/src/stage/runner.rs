//! Stage runner implementation.
//!
//! One entry point, [`StageRunner::run_stage`], drives a single stage of a
//! single document: ledger `Running` guard, collaborator invocation under
//! a timeout, classified-failure retry loop, artifact persistence and the
//! terminal ledger transition.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactError, ArtifactStore};
use crate::extractor::{ExtractionEnvelope, Extractor};
use crate::fetcher::Fetcher;
use crate::ledger::{FailureClass, LedgerError, StageName, StateLedger};
use crate::manifest::DocumentDescriptor;
use crate::transformer::Transformer;

use super::{RetryPolicy, StageRunError, StageTimeouts};

/// A classified failure of one stage attempt.
#[derive(Debug)]
struct StageFailure {
    class: FailureClass,
    reason: String,
}

impl StageFailure {
    fn transient(reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            reason: reason.into(),
        }
    }

    fn permanent(reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Permanent,
            reason: reason.into(),
        }
    }

    fn classified(is_transient: bool, reason: impl ToString) -> Self {
        Self {
            class: if is_transient {
                FailureClass::Transient
            } else {
                FailureClass::Permanent
            },
            reason: reason.to_string(),
        }
    }
}

/// Wraps the external collaborators behind a uniform stage contract.
pub struct StageRunner {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    transformer: Arc<dyn Transformer>,
    artifacts: ArtifactStore,
    ledger: Arc<StateLedger>,
    retry: RetryPolicy,
    timeouts: StageTimeouts,
    stale_after: Duration,
}

impl StageRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        transformer: Arc<dyn Transformer>,
        artifacts: ArtifactStore,
        ledger: Arc<StateLedger>,
        retry: RetryPolicy,
        timeouts: StageTimeouts,
        stale_after: Duration,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            transformer,
            artifacts,
            ledger,
            retry,
            timeouts,
            stale_after,
        }
    }

    /// Execute one stage of one document to a terminal ledger state.
    ///
    /// Returns the artifact path on success. A `Failed` return means the
    /// failure was recorded in the ledger and later stages of this
    /// document are blocked; a `Ledger` return is fatal to the batch.
    pub async fn run_stage(
        &self,
        descriptor: &DocumentDescriptor,
        stage: StageName,
    ) -> Result<std::path::PathBuf, StageRunError> {
        let doc_id = descriptor.doc_id();

        match self.ledger.begin_stage(&doc_id, stage, self.stale_after) {
            Ok(()) => {}
            Err(LedgerError::StageBusy { doc_id, stage }) => {
                return Err(StageRunError::Busy { doc_id, stage });
            }
            Err(e) => return Err(StageRunError::Ledger(e)),
        }

        // Secondary consistency check: an artifact on disk without a
        // `Done` record means an earlier run died between the write and
        // the ledger transition. The ledger wins; the file is rewritten.
        if self.artifacts.exists(descriptor, stage).await {
            debug!(
                "Found {} artifact for {} without a done record; rewriting it",
                stage, doc_id
            );
        }

        info!("Running {} for {} ({})", stage, doc_id, descriptor.name);
        let stage_timeout = self.timeouts.for_stage(stage);

        loop {
            let attempt = self
                .ledger
                .record_attempt(&doc_id, stage)
                .map_err(StageRunError::Ledger)?;

            let outcome = match timeout(stage_timeout, self.invoke(descriptor, stage)).await {
                Err(_elapsed) => Err(StageFailure::transient(format!(
                    "{} timed out after {}s",
                    stage,
                    stage_timeout.as_secs()
                ))),
                Ok(Err(failure)) => Err(failure),
                Ok(Ok(bytes)) => self
                    .artifacts
                    .put(descriptor, stage, &bytes)
                    .await
                    .map_err(|e| StageFailure::permanent(format!("failed to store artifact: {e}"))),
            };

            match outcome {
                Ok(path) => {
                    self.ledger
                        .complete_stage(&doc_id, stage, path.clone())
                        .map_err(StageRunError::Ledger)?;
                    info!(
                        "Completed {} for {} at {} (attempt {})",
                        stage,
                        doc_id,
                        path.display(),
                        attempt
                    );
                    return Ok(path);
                }
                Err(failure) => {
                    let retryable = failure.class == FailureClass::Transient
                        && attempt < self.retry.max_attempts;
                    if retryable {
                        let backoff = self.retry.backoff(attempt);
                        warn!(
                            "{} attempt {}/{} for {} failed: {}; retrying in {:?}",
                            stage, attempt, self.retry.max_attempts, doc_id, failure.reason, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    self.ledger
                        .fail_stage(&doc_id, stage, failure.class, &failure.reason)
                        .map_err(StageRunError::Ledger)?;
                    warn!(
                        "{} failed ({}) for {} after {} attempts: {}",
                        stage, failure.class, doc_id, attempt, failure.reason
                    );
                    return Err(StageRunError::Failed {
                        stage,
                        class: failure.class,
                        reason: failure.reason,
                    });
                }
            }
        }
    }

    /// Invoke the collaborator for a stage and serialize its output.
    async fn invoke(
        &self,
        descriptor: &DocumentDescriptor,
        stage: StageName,
    ) -> Result<Vec<u8>, StageFailure> {
        match stage {
            StageName::Download => self
                .fetcher
                .fetch(&descriptor.source)
                .await
                .map_err(|e| StageFailure::classified(e.is_transient(), e)),
            StageName::Extract => {
                let document = self.stage_input(descriptor, stage).await?;
                let filename = format!("{}.pdf", descriptor.file_stem());
                let content = self
                    .extractor
                    .extract(&document, &filename)
                    .await
                    .map_err(|e| StageFailure::classified(e.is_transient(), e))?;
                let envelope =
                    ExtractionEnvelope::new(descriptor.doc_id(), &descriptor.source, content);
                serde_json::to_vec_pretty(&envelope)
                    .map_err(|e| StageFailure::permanent(format!("failed to encode content: {e}")))
            }
            StageName::Transform => {
                let raw = self.stage_input(descriptor, stage).await?;
                let envelope: ExtractionEnvelope = serde_json::from_slice(&raw).map_err(|e| {
                    StageFailure::permanent(format!("corrupt extraction artifact: {e}"))
                })?;
                let transformed = self
                    .transformer
                    .transform(&envelope.document, descriptor)
                    .await
                    .map_err(|e| StageFailure::classified(e.is_transient(), e))?;
                serde_json::to_vec_pretty(&transformed)
                    .map_err(|e| StageFailure::permanent(format!("failed to encode document: {e}")))
            }
        }
    }

    /// Read the previous stage's artifact. The ledger said that stage is
    /// `Done`, so a missing or unreadable file is a ledger/disk divergence
    /// surfaced as a permanent failure rather than silently re-run.
    async fn stage_input(
        &self,
        descriptor: &DocumentDescriptor,
        stage: StageName,
    ) -> Result<Vec<u8>, StageFailure> {
        // Only the first stage has no input, and it never calls this.
        let Some(input_stage) = stage.input() else {
            return Ok(Vec::new());
        };
        debug!(
            "Reading {} artifact as input for {} of {}",
            input_stage,
            stage,
            descriptor.doc_id()
        );
        self.artifacts
            .get(descriptor, input_stage)
            .await
            .map_err(|e| match e {
                ArtifactError::NotFound { path } => StageFailure::permanent(format!(
                    "{input_stage} artifact missing at {}; ledger and disk disagree",
                    path.display()
                )),
                ArtifactError::Io { path, source } => StageFailure::permanent(format!(
                    "failed to read {input_stage} artifact at {}: {source}",
                    path.display()
                )),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use crate::extractor::ExtractError;
    use crate::ledger::StageStatus;
    use crate::testing::{MockExtractor, MockFetcher, MockTransformer};
    use tempfile::TempDir;

    struct Harness {
        _temp: TempDir,
        runner: StageRunner,
        ledger: Arc<StateLedger>,
        fetcher: MockFetcher,
        extractor: MockExtractor,
        descriptor: DocumentDescriptor,
    }

    fn harness() -> Harness {
        harness_with(RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        })
    }

    fn harness_with(retry: RetryPolicy) -> Harness {
        let temp = TempDir::new().expect("temp dir");
        let ledger =
            Arc::new(StateLedger::open(&temp.path().join("state"), "spain").expect("ledger"));
        let descriptor =
            DocumentDescriptor::new("GEN 2.1", "https://aip.example/gen21.pdf", "spain");
        ledger.merge_manifest(&[descriptor.clone()]).expect("merge");

        let fetcher = MockFetcher::new();
        let extractor = MockExtractor::new();
        let transformer = MockTransformer::new();

        let runner = StageRunner::new(
            Arc::new(fetcher.clone()),
            Arc::new(extractor.clone()),
            Arc::new(transformer.clone()),
            ArtifactStore::new(temp.path()),
            Arc::clone(&ledger),
            retry,
            StageTimeouts::default(),
            Duration::from_secs(3600),
        );

        Harness {
            _temp: temp,
            runner,
            ledger,
            fetcher,
            extractor,
            descriptor,
        }
    }

    #[tokio::test]
    async fn test_download_success_records_done() {
        let h = harness();
        let path = h
            .runner
            .run_stage(&h.descriptor, StageName::Download)
            .await
            .unwrap();
        assert!(path.exists());

        let record = h.ledger.document(&h.descriptor.doc_id()).unwrap();
        let stage = record.stage(StageName::Download);
        assert!(stage.status.is_done());
        assert_eq!(stage.attempts, 1);
        assert_eq!(stage.artifact.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_transient_failures_retry_then_succeed() {
        let h = harness();
        h.fetcher
            .push_failure(&h.descriptor.source, FetchError::Timeout { timeout_secs: 30 })
            .await;
        h.fetcher
            .push_failure(&h.descriptor.source, FetchError::Http { status: 503 })
            .await;

        h.runner
            .run_stage(&h.descriptor, StageName::Download)
            .await
            .unwrap();

        assert_eq!(h.fetcher.call_count(&h.descriptor.source).await, 3);
        let record = h.ledger.document(&h.descriptor.doc_id()).unwrap();
        assert_eq!(record.stage(StageName::Download).attempts, 3);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_retries() {
        let h = harness();
        h.fetcher
            .set_failure(&h.descriptor.source, FetchError::Http { status: 503 })
            .await;

        let err = h
            .runner
            .run_stage(&h.descriptor, StageName::Download)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageRunError::Failed {
                class: FailureClass::Transient,
                ..
            }
        ));
        // Attempted exactly max_attempts times, never more.
        assert_eq!(h.fetcher.call_count(&h.descriptor.source).await, 3);

        let record = h.ledger.document(&h.descriptor.doc_id()).unwrap();
        assert!(record.stage(StageName::Download).status.is_failed());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let h = harness();
        h.fetcher
            .set_failure(&h.descriptor.source, FetchError::Http { status: 404 })
            .await;

        let err = h
            .runner
            .run_stage(&h.descriptor, StageName::Download)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageRunError::Failed {
                class: FailureClass::Permanent,
                ..
            }
        ));
        assert_eq!(h.fetcher.call_count(&h.descriptor.source).await, 1);
    }

    #[tokio::test]
    async fn test_extract_reads_download_artifact() {
        let h = harness();
        h.runner
            .run_stage(&h.descriptor, StageName::Download)
            .await
            .unwrap();
        let path = h
            .runner
            .run_stage(&h.descriptor, StageName::Extract)
            .await
            .unwrap();

        let raw = std::fs::read(path).unwrap();
        let envelope: ExtractionEnvelope = serde_json::from_slice(&raw).unwrap();
        assert_eq!(envelope.metadata.document_id, h.descriptor.doc_id());
        assert_eq!(h.extractor.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_extract_without_download_artifact_is_permanent() {
        let h = harness();
        // Ledger claims download is done but no artifact was written.
        h.ledger
            .complete_stage(&h.descriptor.doc_id(), StageName::Download, "gone.pdf".into())
            .unwrap();

        let err = h
            .runner
            .run_stage(&h.descriptor, StageName::Extract)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageRunError::Failed {
                class: FailureClass::Permanent,
                ..
            }
        ));
        assert_eq!(h.extractor.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsupported_format_is_permanent() {
        let h = harness();
        h.runner
            .run_stage(&h.descriptor, StageName::Download)
            .await
            .unwrap();
        h.extractor
            .set_failure(ExtractError::UnsupportedFormat("encrypted pdf".into()))
            .await;

        let err = h
            .runner
            .run_stage(&h.descriptor, StageName::Extract)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageRunError::Failed {
                stage: StageName::Extract,
                class: FailureClass::Permanent,
                ..
            }
        ));
        assert_eq!(h.extractor.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_busy_stage_fails_fast() {
        let h = harness();
        h.ledger
            .begin_stage(
                &h.descriptor.doc_id(),
                StageName::Download,
                Duration::from_secs(3600),
            )
            .unwrap();

        let err = h
            .runner
            .run_stage(&h.descriptor, StageName::Download)
            .await
            .unwrap_err();
        assert!(matches!(err, StageRunError::Busy { .. }));
        assert_eq!(h.fetcher.call_count(&h.descriptor.source).await, 0);
    }

    #[tokio::test]
    async fn test_failed_stage_can_rerun_after_reset() {
        let h = harness();
        h.fetcher
            .set_failure(&h.descriptor.source, FetchError::Http { status: 404 })
            .await;
        let _ = h.runner.run_stage(&h.descriptor, StageName::Download).await;

        h.fetcher.clear_failure(&h.descriptor.source).await;
        h.ledger.reset_failed(Some(&h.descriptor.doc_id())).unwrap();

        h.runner
            .run_stage(&h.descriptor, StageName::Download)
            .await
            .unwrap();
        let record = h.ledger.document(&h.descriptor.doc_id()).unwrap();
        assert!(record.stage(StageName::Download).status.is_done());
        // Attempts were zeroed by the reset, so only the fresh attempt counts.
        assert_eq!(record.stage(StageName::Download).attempts, 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let mut h = harness_with(RetryPolicy {
            max_attempts: 1,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        });
        h.runner.timeouts = StageTimeouts {
            download: Duration::from_millis(20),
            ..StageTimeouts::default()
        };
        h.fetcher.set_delay(Duration::from_millis(200)).await;

        let err = h
            .runner
            .run_stage(&h.descriptor, StageName::Download)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageRunError::Failed {
                class: FailureClass::Transient,
                ..
            }
        ));
        let record = h.ledger.document(&h.descriptor.doc_id()).unwrap();
        match &record.stage(StageName::Download).status {
            StageStatus::Failed { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected failed status, got {other:?}"),
        }
    }
}
