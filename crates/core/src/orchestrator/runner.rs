//! Batch orchestrator implementation.
//!
//! Iterates the manifest, determines each document's resume point from the
//! ledger, dispatches the remaining stages through the stage runner with a
//! bounded worker pool, and aggregates the final results summary. One
//! document's failure never blocks the batch; only ledger and manifest
//! errors abort it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::ledger::StateLedger;
use crate::manifest::DocumentDescriptor;
use crate::stage::{StageRunError, StageRunner};

use super::config::OrchestratorConfig;
use super::types::{BatchSummary, DocumentOutcome, OrchestratorError};

/// Drives a whole batch of documents through the pipeline.
pub struct BatchOrchestrator {
    runner: Arc<StageRunner>,
    ledger: Arc<StateLedger>,
    config: OrchestratorConfig,
    cancelled: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl BatchOrchestrator {
    pub fn new(
        runner: Arc<StageRunner>,
        ledger: Arc<StateLedger>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            runner,
            ledger,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Request a graceful stop: workers finish (or time out) their current
    /// stage invocation, every completed transition is already persisted,
    /// and remaining stages are left for the next run.
    pub fn request_shutdown(&self) {
        info!("Shutdown requested; finishing in-flight stages");
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Run every document in the manifest through its remaining stages and
    /// persist the aggregated results summary.
    pub async fn run_batch(
        &self,
        manifest: &[DocumentDescriptor],
    ) -> Result<BatchSummary, OrchestratorError> {
        let started_at = Utc::now();
        self.ledger.merge_manifest(manifest)?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_documents.max(1)));
        let mut workers: JoinSet<Result<(), OrchestratorError>> = JoinSet::new();
        let mut skipped = 0usize;

        for descriptor in manifest {
            let doc_id = descriptor.doc_id();

            // Already-complete documents are skipped without taking a
            // worker slot or touching any collaborator.
            if self.ledger.next_pending_stage(&doc_id)?.is_none() {
                debug!("Skipping {} ({}): all stages done", doc_id, descriptor.name);
                skipped += 1;
                continue;
            }

            let runner = Arc::clone(&self.runner);
            let ledger = Arc::clone(&self.ledger);
            let cancelled = Arc::clone(&self.cancelled);
            let semaphore = Arc::clone(&semaphore);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let descriptor = descriptor.clone();

            workers.spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => {
                        // The semaphore is never closed while workers run.
                        match permit {
                            Ok(permit) => permit,
                            Err(_) => return Ok(()),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Skipping {}: shutdown before start", descriptor.name);
                        return Ok(());
                    }
                };
                Self::process_document(&runner, &ledger, &cancelled, &descriptor).await
            });
        }

        if skipped > 0 {
            info!("Skipped {} already-completed documents", skipped);
        }

        // A fatal error stops the batch, but the other workers are drained
        // first so their in-flight ledger transitions settle.
        let mut fatal: Option<OrchestratorError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Fatal batch error: {}", e);
                    self.cancelled.store(true, Ordering::SeqCst);
                    let _ = self.shutdown_tx.send(());
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    error!("Document worker panicked: {}", e);
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        let summary = BatchSummary::from_state(&self.ledger.snapshot(), started_at);
        self.persist_summary(&summary)?;
        self.log_summary(&summary);
        Ok(summary)
    }

    /// Walk one document from its resume point through the last stage,
    /// stopping at its first terminal failure or on shutdown.
    async fn process_document(
        runner: &StageRunner,
        ledger: &StateLedger,
        cancelled: &AtomicBool,
        descriptor: &DocumentDescriptor,
    ) -> Result<(), OrchestratorError> {
        let doc_id = descriptor.doc_id();

        loop {
            if cancelled.load(Ordering::SeqCst) {
                debug!("Stopping {} between stages: shutdown requested", doc_id);
                return Ok(());
            }

            let record = ledger.document(&doc_id)?;
            let Some(stage) = record.next_pending_stage() else {
                info!("Document {} ({}) complete", doc_id, descriptor.name);
                return Ok(());
            };

            // A stage left `Failed` by an earlier run stays failed until
            // it is explicitly reset; re-running it here would turn every
            // resume into a retry storm.
            if record.stage(stage).status.is_failed() {
                debug!(
                    "Document {} stops at {}: failed in a previous run",
                    doc_id, stage
                );
                return Ok(());
            }

            match runner.run_stage(descriptor, stage).await {
                Ok(_) => {}
                Err(StageRunError::Failed { stage, class, .. }) => {
                    warn!(
                        "Document {} ({}) stopped at {} ({} failure)",
                        doc_id, descriptor.name, stage, class
                    );
                    return Ok(());
                }
                Err(StageRunError::Busy { stage, .. }) => {
                    warn!(
                        "Document {} stage {} is busy in another run; leaving it",
                        doc_id, stage
                    );
                    return Ok(());
                }
                Err(StageRunError::Ledger(e)) => return Err(e.into()),
            }
        }
    }

    /// Write `final_results.json` next to the ledger, temp-then-rename
    /// like every other persisted file.
    fn persist_summary(&self, summary: &BatchSummary) -> Result<(), OrchestratorError> {
        let path = self.summary_path();
        let body = serde_json::to_vec_pretty(summary).map_err(|e| OrchestratorError::Summary {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &body).map_err(|source| OrchestratorError::Summary {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| OrchestratorError::Summary {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Path of the batch results summary file.
    pub fn summary_path(&self) -> PathBuf {
        self.ledger.state_dir().join("final_results.json")
    }

    fn log_summary(&self, summary: &BatchSummary) {
        info!(
            "Batch '{}': {} completed, {} failed, {} incomplete of {} documents",
            summary.batch_id,
            summary.completed,
            summary.failed,
            summary.incomplete,
            summary.results.len()
        );
        for result in &summary.results {
            match &result.outcome {
                DocumentOutcome::Completed => {
                    info!(
                        "  {} ({}): completed {}/{} stages",
                        result.doc_id, result.name, result.stages_done, result.total_stages
                    );
                }
                DocumentOutcome::Failed { stage, class, reason } => {
                    warn!(
                        "  {} ({}): {}/{} stages, failed at {} ({}): {}",
                        result.doc_id,
                        result.name,
                        result.stages_done,
                        result.total_stages,
                        stage,
                        class,
                        reason
                    );
                }
                DocumentOutcome::Incomplete => {
                    warn!(
                        "  {} ({}): incomplete, {}/{} stages done",
                        result.doc_id, result.name, result.stages_done, result.total_stages
                    );
                }
            }
        }
    }
}
