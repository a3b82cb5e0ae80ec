//! Batch orchestration: resume points, bounded-concurrency document
//! workers, cancellation and the final results summary.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::BatchOrchestrator;
pub use types::{BatchSummary, DocumentOutcome, FinalResult, OrchestratorError};
