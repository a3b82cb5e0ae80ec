//! Stage execution: uniform contract over the three collaborators.

mod retry;
mod runner;

use std::time::Duration;

use thiserror::Error;

use crate::ledger::{FailureClass, LedgerError, StageName};

pub use retry::{RetryConfig, RetryPolicy};
pub use runner::StageRunner;

/// Outcome of a stage execution that did not produce an artifact.
#[derive(Debug, Error)]
pub enum StageRunError {
    /// The stage was recorded `Failed` in the ledger. The document stops
    /// here; the batch continues.
    #[error("stage {stage} failed ({class}): {reason}")]
    Failed {
        stage: StageName,
        class: FailureClass,
        reason: String,
    },

    /// Another execution of this document-stage pair is in flight (or a
    /// crashed run left a `Running` record younger than the staleness
    /// threshold).
    #[error("stage {stage} of document {doc_id} is busy")]
    Busy { doc_id: String, stage: StageName },

    /// The ledger could not be read or persisted. Fatal to the batch.
    #[error(transparent)]
    Ledger(LedgerError),
}

/// Per-stage invocation timeouts enforced by the runner.
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    pub download: Duration,
    pub extract: Duration,
    pub transform: Duration,
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: StageName) -> Duration {
        match stage {
            StageName::Download => self.download,
            StageName::Extract => self.extract,
            StageName::Transform => self.transform,
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            download: Duration::from_secs(30),
            extract: Duration::from_secs(600),
            transform: Duration::from_secs(600),
        }
    }
}
