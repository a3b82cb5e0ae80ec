//! Durable per-document, per-stage state tracking.
//!
//! The ledger is the resume authority: after any crash or interruption,
//! the next run consults it (never the artifact files) to decide what
//! work remains.

mod store;
mod types;

pub use store::{LedgerError, StateLedger};
pub use types::{
    DocumentRecord, FailureClass, PipelineState, StageName, StageRecord, StageStatus,
};
