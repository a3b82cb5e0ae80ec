//! Types for the pipeline state ledger.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::DocumentDescriptor;

/// A processing stage in the document pipeline.
///
/// Stages execute in the fixed order given by [`StageName::ALL`]; each
/// stage consumes the previous stage's artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Download,
    Extract,
    Transform,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [StageName; 3] = [StageName::Download, StageName::Extract, StageName::Transform];

    /// Stable string used in paths, logs and serialized state.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Download => "download",
            StageName::Extract => "extract",
            StageName::Transform => "transform",
        }
    }

    /// The stage whose artifact this stage consumes, if any.
    pub fn input(&self) -> Option<StageName> {
        match self {
            StageName::Download => None,
            StageName::Extract => Some(StageName::Download),
            StageName::Transform => Some(StageName::Extract),
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a stage failure, deciding retry eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Network, rate limit or timeout; eligible for bounded retry.
    Transient,
    /// Malformed input or unsupported content; never retried.
    Permanent,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Transient => f.write_str("transient"),
            FailureClass::Permanent => f.write_str("permanent"),
        }
    }
}

/// Status of one stage of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet attempted, or explicitly reset for a forced re-run.
    Pending,
    /// An execution is in flight. A record left `Running` by a crash is
    /// reclaimed once it is older than the configured staleness threshold.
    Running { started_at: DateTime<Utc> },
    /// Terminal success; never reverts without an explicit reset.
    Done { completed_at: DateTime<Utc> },
    /// Terminal failure for this run; blocks later stages of the same
    /// document until manually reset.
    Failed {
        failed_at: DateTime<Utc>,
        class: FailureClass,
        reason: String,
    },
}

impl StageStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, StageStatus::Done { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageStatus::Failed { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, StageStatus::Running { .. })
    }

    /// Short status name for logs and reports.
    pub fn state_type(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running { .. } => "running",
            StageStatus::Done { .. } => "done",
            StageStatus::Failed { .. } => "failed",
        }
    }
}

/// Durable record for one (document, stage) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageName,
    pub status: StageStatus,
    /// Collaborator invocations so far, across runs.
    pub attempts: u32,
    /// Artifact produced by the stage, present once `Done`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl StageRecord {
    pub fn new(stage: StageName) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            attempts: 0,
            artifact: None,
        }
    }
}

/// Ledger entry for one document: its descriptor plus one record per stage,
/// in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub descriptor: DocumentDescriptor,
    pub created_at: DateTime<Utc>,
    pub stages: Vec<StageRecord>,
}

impl DocumentRecord {
    pub fn new(descriptor: DocumentDescriptor) -> Self {
        Self {
            descriptor,
            created_at: Utc::now(),
            stages: StageName::ALL.iter().map(|s| StageRecord::new(*s)).collect(),
        }
    }

    pub fn stage(&self, stage: StageName) -> &StageRecord {
        // Records are created in StageName::ALL order and never reordered.
        &self.stages[StageName::ALL.iter().position(|s| *s == stage).unwrap_or(0)]
    }

    pub(crate) fn stage_mut(&mut self, stage: StageName) -> &mut StageRecord {
        &mut self.stages[StageName::ALL.iter().position(|s| *s == stage).unwrap_or(0)]
    }

    /// First stage, in order, whose status is not `Done`.
    pub fn next_pending_stage(&self) -> Option<StageName> {
        self.stages
            .iter()
            .find(|r| !r.status.is_done())
            .map(|r| r.stage)
    }

    /// Number of stages completed so far.
    pub fn stages_done(&self) -> usize {
        self.stages.iter().filter(|r| r.status.is_done()).count()
    }

    /// First failed stage with its classification and reason, if any.
    pub fn first_failure(&self) -> Option<(StageName, FailureClass, &str)> {
        self.stages.iter().find_map(|r| match &r.status {
            StageStatus::Failed { class, reason, .. } => Some((r.stage, *class, reason.as_str())),
            _ => None,
        })
    }
}

/// The full persisted ledger for one batch.
///
/// Owned exclusively by [`super::StateLedger`]; other components read
/// snapshots or request mutations through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub documents: std::collections::BTreeMap<String, DocumentRecord>,
}

impl PipelineState {
    pub fn new(batch_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            batch_id: batch_id.into(),
            created_at: now,
            updated_at: now,
            documents: Default::default(),
        }
    }
}
