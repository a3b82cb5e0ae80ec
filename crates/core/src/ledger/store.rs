//! Durable state ledger backed by an atomically-rewritten JSON file.
//!
//! The ledger is the single source of truth for what must run next. Every
//! mutation rewrites the whole state file through a temp-file-then-rename
//! sequence, so the persisted file is always a fully-deserializable
//! snapshot of some consistent past state; a crash mid-write leaves the
//! previous snapshot untouched.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::manifest::DocumentDescriptor;

use super::types::{DocumentRecord, FailureClass, PipelineState, StageName, StageStatus};

/// Errors from ledger operations. I/O and corruption errors are fatal to
/// the batch; the guard errors are per-document conditions.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("document not found in ledger: {0}")]
    DocumentNotFound(String),

    /// The stage has a fresh `Running` record, i.e. another execution of
    /// this document-stage pair is (or recently was) in flight.
    #[error("stage {stage} of document {doc_id} is already running")]
    StageBusy { doc_id: String, stage: StageName },

    /// Attempt to start a stage whose record is already terminal `Done`.
    #[error("stage {stage} of document {doc_id} is already done")]
    StageAlreadyDone { doc_id: String, stage: StageName },
}

/// The durable, atomically-updated record of per-document stage status.
///
/// All mutation flows through this type and is serialized behind an
/// internal mutex, so concurrent document workers never interleave writes.
#[derive(Debug)]
pub struct StateLedger {
    path: PathBuf,
    inner: Mutex<PipelineState>,
}

impl StateLedger {
    /// Load prior state from `{state_dir}/pipeline_state.json` or
    /// initialize an empty ledger for the batch. The state directory is
    /// created if needed and the initial state is persisted immediately so
    /// the file exists from the first transition on.
    pub fn open(state_dir: &Path, batch_id: &str) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(state_dir).map_err(|source| LedgerError::Io {
            path: state_dir.to_path_buf(),
            source,
        })?;
        let path = state_dir.join("pipeline_state.json");

        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| LedgerError::Io {
                path: path.clone(),
                source,
            })?;
            let state: PipelineState =
                serde_json::from_str(&raw).map_err(|e| LedgerError::Corrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            info!(
                "Loaded ledger for batch '{}' with {} documents from {}",
                state.batch_id,
                state.documents.len(),
                path.display()
            );
            state
        } else {
            debug!("Initializing empty ledger at {}", path.display());
            PipelineState::new(batch_id)
        };

        let ledger = Self {
            path,
            inner: Mutex::new(state),
        };
        {
            let state = ledger.lock();
            ledger.persist(&state)?;
        }
        Ok(ledger)
    }

    /// Directory holding the ledger file and the batch results summary.
    pub fn state_dir(&self) -> &Path {
        // open() always joins a file name onto the state directory.
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Append manifest entries not yet present in the ledger. Existing
    /// records are preserved untouched. Returns the number of new
    /// documents added.
    pub fn merge_manifest(
        &self,
        documents: &[DocumentDescriptor],
    ) -> Result<usize, LedgerError> {
        let mut state = self.lock();
        let mut added = 0;
        for descriptor in documents {
            let doc_id = descriptor.doc_id();
            if !state.documents.contains_key(&doc_id) {
                debug!("Adding document {} ({})", doc_id, descriptor.name);
                state
                    .documents
                    .insert(doc_id, DocumentRecord::new(descriptor.clone()));
                added += 1;
            }
        }
        if added > 0 {
            state.updated_at = Utc::now();
            self.persist(&state)?;
            info!("Added {} new documents to ledger", added);
        }
        Ok(added)
    }

    /// Guarded `Pending`/`Failed` -> `Running` transition.
    ///
    /// Fails fast with [`LedgerError::StageBusy`] if a fresh `Running`
    /// record exists for this document-stage pair; a `Running` record
    /// older than `stale_after` is treated as a leftover from a crashed
    /// run and reclaimed.
    pub fn begin_stage(
        &self,
        doc_id: &str,
        stage: StageName,
        stale_after: Duration,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock();
        let record = Self::document_mut(&mut state, doc_id)?.stage_mut(stage);

        match &record.status {
            StageStatus::Done { .. } => {
                return Err(LedgerError::StageAlreadyDone {
                    doc_id: doc_id.to_string(),
                    stage,
                });
            }
            StageStatus::Running { started_at } => {
                let age = Utc::now().signed_duration_since(*started_at);
                if age < chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX) {
                    return Err(LedgerError::StageBusy {
                        doc_id: doc_id.to_string(),
                        stage,
                    });
                }
                warn!(
                    "Reclaiming stale running record for {} {} (started {})",
                    doc_id, stage, started_at
                );
            }
            StageStatus::Pending | StageStatus::Failed { .. } => {}
        }

        record.status = StageStatus::Running {
            started_at: Utc::now(),
        };
        state.updated_at = Utc::now();
        self.persist(&state)
    }

    /// Record one collaborator invocation for a running stage and return
    /// the new attempt count. Persisted so retry accounting survives a
    /// crash mid-stage.
    pub fn record_attempt(&self, doc_id: &str, stage: StageName) -> Result<u32, LedgerError> {
        let mut state = self.lock();
        let record = Self::document_mut(&mut state, doc_id)?.stage_mut(stage);
        record.attempts += 1;
        let attempts = record.attempts;
        state.updated_at = Utc::now();
        self.persist(&state)?;
        Ok(attempts)
    }

    /// Transition a stage to terminal `Done` with its artifact path.
    pub fn complete_stage(
        &self,
        doc_id: &str,
        stage: StageName,
        artifact: PathBuf,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock();
        let record = Self::document_mut(&mut state, doc_id)?.stage_mut(stage);
        record.status = StageStatus::Done {
            completed_at: Utc::now(),
        };
        record.artifact = Some(artifact);
        state.updated_at = Utc::now();
        self.persist(&state)
    }

    /// Transition a stage to `Failed` with its classification and reason.
    pub fn fail_stage(
        &self,
        doc_id: &str,
        stage: StageName,
        class: FailureClass,
        reason: impl Into<String>,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock();
        let record = Self::document_mut(&mut state, doc_id)?.stage_mut(stage);
        record.status = StageStatus::Failed {
            failed_at: Utc::now(),
            class,
            reason: reason.into(),
        };
        state.updated_at = Utc::now();
        self.persist(&state)
    }

    /// Reset `Failed` records back to `Pending` to force a re-run: all
    /// documents when `doc_id` is `None`, otherwise just the given one.
    /// Attempt counts are zeroed alongside. Returns the number of stage
    /// records reset.
    pub fn reset_failed(&self, doc_id: Option<&str>) -> Result<usize, LedgerError> {
        let mut state = self.lock();
        if let Some(doc_id) = doc_id {
            if !state.documents.contains_key(doc_id) {
                return Err(LedgerError::DocumentNotFound(doc_id.to_string()));
            }
        }

        let mut reset = 0;
        for (id, document) in state.documents.iter_mut() {
            if doc_id.is_some_and(|wanted| wanted != id) {
                continue;
            }
            for record in document.stages.iter_mut() {
                if record.status.is_failed() {
                    record.status = StageStatus::Pending;
                    record.attempts = 0;
                    record.artifact = None;
                    reset += 1;
                }
            }
        }

        if reset > 0 {
            state.updated_at = Utc::now();
            self.persist(&state)?;
            info!("Reset {} failed stage records to pending", reset);
        }
        Ok(reset)
    }

    /// First stage, in fixed order, whose status is not `Done`.
    pub fn next_pending_stage(&self, doc_id: &str) -> Result<Option<StageName>, LedgerError> {
        let state = self.lock();
        let document = state
            .documents
            .get(doc_id)
            .ok_or_else(|| LedgerError::DocumentNotFound(doc_id.to_string()))?;
        Ok(document.next_pending_stage())
    }

    /// Cloned read-only view for reporting.
    pub fn snapshot(&self) -> PipelineState {
        self.lock().clone()
    }

    /// Ledger entry for one document.
    pub fn document(&self, doc_id: &str) -> Result<DocumentRecord, LedgerError> {
        let state = self.lock();
        state
            .documents
            .get(doc_id)
            .cloned()
            .ok_or_else(|| LedgerError::DocumentNotFound(doc_id.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PipelineState> {
        // A poisoned mutex means a panic while holding the lock; the
        // in-memory state is still the last consistent snapshot.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn document_mut<'a>(
        state: &'a mut PipelineState,
        doc_id: &str,
    ) -> Result<&'a mut DocumentRecord, LedgerError> {
        state
            .documents
            .get_mut(doc_id)
            .ok_or_else(|| LedgerError::DocumentNotFound(doc_id.to_string()))
    }

    /// Write the full state to a temp file next to the ledger, then rename
    /// it into place. The rename is atomic on the same filesystem, so a
    /// reader never observes a half-written ledger.
    fn persist(&self, state: &PipelineState) -> Result<(), LedgerError> {
        let body = serde_json::to_vec_pretty(state).map_err(|e| LedgerError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &body).map_err(|source| LedgerError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(name: &str) -> DocumentDescriptor {
        DocumentDescriptor::new(name, format!("https://aip.example/{name}.pdf"), "spain")
    }

    fn open_with_one_doc(temp: &TempDir) -> (StateLedger, String) {
        let ledger = StateLedger::open(temp.path(), "spain").unwrap();
        let doc = descriptor("GEN_2.1");
        let doc_id = doc.doc_id();
        ledger.merge_manifest(&[doc]).unwrap();
        (ledger, doc_id)
    }

    #[test]
    fn test_open_initializes_and_persists() {
        let temp = TempDir::new().unwrap();
        let ledger = StateLedger::open(temp.path(), "spain").unwrap();
        assert!(temp.path().join("pipeline_state.json").exists());
        assert_eq!(ledger.snapshot().batch_id, "spain");
    }

    #[test]
    fn test_merge_manifest_is_append_only() {
        let temp = TempDir::new().unwrap();
        let (ledger, doc_id) = open_with_one_doc(&temp);

        ledger
            .complete_stage(&doc_id, StageName::Download, "a.pdf".into())
            .unwrap();

        // Re-merging the same manifest must not disturb existing records.
        let added = ledger.merge_manifest(&[descriptor("GEN_2.1")]).unwrap();
        assert_eq!(added, 0);
        let record = ledger.document(&doc_id).unwrap();
        assert!(record.stage(StageName::Download).status.is_done());

        let added = ledger.merge_manifest(&[descriptor("ENR_1.1")]).unwrap();
        assert_eq!(added, 1);
        assert_eq!(ledger.snapshot().documents.len(), 2);
    }

    #[test]
    fn test_transitions_survive_reload() {
        let temp = TempDir::new().unwrap();
        let (ledger, doc_id) = open_with_one_doc(&temp);

        ledger
            .begin_stage(&doc_id, StageName::Download, Duration::from_secs(3600))
            .unwrap();
        ledger.record_attempt(&doc_id, StageName::Download).unwrap();
        ledger
            .complete_stage(&doc_id, StageName::Download, "pdfs/GEN_2.1.pdf".into())
            .unwrap();
        ledger
            .fail_stage(
                &doc_id,
                StageName::Extract,
                FailureClass::Permanent,
                "unsupported format",
            )
            .unwrap();
        let before = ledger.snapshot();
        drop(ledger);

        let reloaded = StateLedger::open(temp.path(), "spain").unwrap();
        assert_eq!(reloaded.snapshot(), before);
        assert_eq!(
            reloaded.next_pending_stage(&doc_id).unwrap(),
            Some(StageName::Extract)
        );
    }

    #[test]
    fn test_begin_stage_guards_running() {
        let temp = TempDir::new().unwrap();
        let (ledger, doc_id) = open_with_one_doc(&temp);

        ledger
            .begin_stage(&doc_id, StageName::Download, Duration::from_secs(3600))
            .unwrap();
        let err = ledger
            .begin_stage(&doc_id, StageName::Download, Duration::from_secs(3600))
            .unwrap_err();
        assert!(matches!(err, LedgerError::StageBusy { .. }));
    }

    #[test]
    fn test_begin_stage_reclaims_stale_running() {
        let temp = TempDir::new().unwrap();
        let (ledger, doc_id) = open_with_one_doc(&temp);

        ledger
            .begin_stage(&doc_id, StageName::Download, Duration::from_secs(3600))
            .unwrap();
        // Zero threshold: any running record counts as stale.
        ledger
            .begin_stage(&doc_id, StageName::Download, Duration::ZERO)
            .unwrap();
    }

    #[test]
    fn test_begin_stage_rejects_done() {
        let temp = TempDir::new().unwrap();
        let (ledger, doc_id) = open_with_one_doc(&temp);

        ledger
            .complete_stage(&doc_id, StageName::Download, "a.pdf".into())
            .unwrap();
        let err = ledger
            .begin_stage(&doc_id, StageName::Download, Duration::from_secs(3600))
            .unwrap_err();
        assert!(matches!(err, LedgerError::StageAlreadyDone { .. }));
    }

    #[test]
    fn test_reset_failed_only_touches_failed() {
        let temp = TempDir::new().unwrap();
        let (ledger, doc_id) = open_with_one_doc(&temp);

        ledger
            .complete_stage(&doc_id, StageName::Download, "a.pdf".into())
            .unwrap();
        ledger.record_attempt(&doc_id, StageName::Extract).unwrap();
        ledger
            .fail_stage(&doc_id, StageName::Extract, FailureClass::Permanent, "bad")
            .unwrap();

        let reset = ledger.reset_failed(Some(&doc_id)).unwrap();
        assert_eq!(reset, 1);

        let record = ledger.document(&doc_id).unwrap();
        assert!(record.stage(StageName::Download).status.is_done());
        assert_eq!(record.stage(StageName::Extract).status, StageStatus::Pending);
        assert_eq!(record.stage(StageName::Extract).attempts, 0);

        // Nothing left to reset.
        assert_eq!(ledger.reset_failed(None).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_ledger_is_an_error_not_a_reset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pipeline_state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = StateLedger::open(temp.path(), "spain").unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
        // The corrupt file must be left in place for inspection.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_stray_temp_file_is_ignored_on_load() {
        let temp = TempDir::new().unwrap();
        let (ledger, doc_id) = open_with_one_doc(&temp);
        ledger
            .complete_stage(&doc_id, StageName::Download, "a.pdf".into())
            .unwrap();
        let before = ledger.snapshot();
        drop(ledger);

        // Simulate a crash between temp write and rename.
        std::fs::write(temp.path().join("pipeline_state.json.tmp"), "garbage").unwrap();

        let reloaded = StateLedger::open(temp.path(), "spain").unwrap();
        assert_eq!(reloaded.snapshot(), before);
    }

    #[test]
    fn test_unknown_document_errors() {
        let temp = TempDir::new().unwrap();
        let ledger = StateLedger::open(temp.path(), "spain").unwrap();
        let err = ledger.next_pending_stage("nope").unwrap_err();
        assert!(matches!(err, LedgerError::DocumentNotFound(_)));
    }
}
