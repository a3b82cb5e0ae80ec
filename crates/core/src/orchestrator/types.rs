//! Types for the batch orchestrator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{
    DocumentRecord, FailureClass, LedgerError, PipelineState, StageName,
};
use crate::manifest::ManifestError;

/// Errors that abort the whole batch. Per-document failures are not
/// errors at this level; they land in the [`BatchSummary`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The ledger could not be read or persisted. The last successfully
    /// persisted state is left intact on disk.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The manifest could not be loaded.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// The batch results summary could not be written.
    #[error("failed to write results summary {path}: {source}")]
    Summary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-document outcome, derived from the ledger at batch end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DocumentOutcome {
    /// All stages `Done`.
    Completed,
    /// Stopped at a terminal `Failed` stage.
    Failed {
        stage: StageName,
        class: FailureClass,
        reason: String,
    },
    /// Neither complete nor failed; typically an interrupted run.
    Incomplete,
}

/// Read-only snapshot of one document's final state for this run.
///
/// Recomputed from the ledger; never itself a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub doc_id: String,
    pub name: String,
    pub stages_done: usize,
    pub total_stages: usize,
    /// Collaborator invocations across all stages and runs.
    pub total_attempts: u32,
    #[serde(flatten)]
    pub outcome: DocumentOutcome,
    /// Last artifact produced, present once any stage is `Done`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_artifact: Option<PathBuf>,
}

impl FinalResult {
    /// Derive the outcome snapshot for one ledger entry.
    pub fn from_record(doc_id: &str, record: &DocumentRecord) -> Self {
        let stages_done = record.stages_done();
        let total_stages = record.stages.len();

        let outcome = if let Some((stage, class, reason)) = record.first_failure() {
            DocumentOutcome::Failed {
                stage,
                class,
                reason: reason.to_string(),
            }
        } else if stages_done == total_stages {
            DocumentOutcome::Completed
        } else {
            DocumentOutcome::Incomplete
        };

        Self {
            doc_id: doc_id.to_string(),
            name: record.descriptor.name.clone(),
            stages_done,
            total_stages,
            total_attempts: record.stages.iter().map(|s| s.attempts).sum(),
            outcome,
            final_artifact: record
                .stages
                .iter()
                .rev()
                .find_map(|s| s.artifact.clone()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, DocumentOutcome::Completed)
    }
}

/// Aggregated results of one batch run, persisted as
/// `final_results.json` next to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Documents with all stages done.
    pub completed: usize,
    /// Documents stopped at a failed stage.
    pub failed: usize,
    /// Documents neither complete nor failed (interrupted).
    pub incomplete: usize,
    pub results: Vec<FinalResult>,
}

impl BatchSummary {
    /// Aggregate a summary from a ledger snapshot.
    pub fn from_state(state: &PipelineState, started_at: DateTime<Utc>) -> Self {
        let results: Vec<FinalResult> = state
            .documents
            .iter()
            .map(|(doc_id, record)| FinalResult::from_record(doc_id, record))
            .collect();

        let completed = results.iter().filter(|r| r.is_completed()).count();
        let failed = results
            .iter()
            .filter(|r| matches!(r.outcome, DocumentOutcome::Failed { .. }))
            .count();
        let incomplete = results.len() - completed - failed;

        Self {
            batch_id: state.batch_id.clone(),
            started_at,
            finished_at: Utc::now(),
            completed,
            failed,
            incomplete,
            results,
        }
    }

    /// Whether every document in the batch completed all stages.
    pub fn is_full_success(&self) -> bool {
        self.failed == 0 && self.incomplete == 0
    }
}
