//! Batch orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the batch orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Documents processed concurrently. Sized to respect the external
    /// services' rate limits; stages within one document always run
    /// sequentially.
    #[serde(default = "default_max_concurrent_documents")]
    pub max_concurrent_documents: usize,

    /// Age after which a `Running` ledger record is treated as a leftover
    /// from a crashed run and reclaimed.
    #[serde(default = "default_running_stale_after_secs")]
    pub running_stale_after_secs: u64,
}

fn default_max_concurrent_documents() -> usize {
    4
}

fn default_running_stale_after_secs() -> u64 {
    3600
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_documents: default_max_concurrent_documents(),
            running_stale_after_secs: default_running_stale_after_secs(),
        }
    }
}
