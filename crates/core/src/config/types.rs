use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::extractor::ExtractorConfig;
use crate::fetcher::FetcherConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::stage::{RetryConfig, StageTimeouts};
use crate::transformer::TransformerConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Working directory holding the `_AIPs/{country}` trees.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub transformer: TransformerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            fetcher: FetcherConfig::default(),
            extractor: ExtractorConfig::default(),
            transformer: TransformerConfig::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutsConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// Per-stage invocation timeouts as they appear in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_download_secs")]
    pub download_secs: u64,
    #[serde(default = "default_extract_secs")]
    pub extract_secs: u64,
    #[serde(default = "default_transform_secs")]
    pub transform_secs: u64,
}

fn default_download_secs() -> u64 {
    30
}

fn default_extract_secs() -> u64 {
    600
}

fn default_transform_secs() -> u64 {
    600
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            download_secs: default_download_secs(),
            extract_secs: default_extract_secs(),
            transform_secs: default_transform_secs(),
        }
    }
}

impl From<&TimeoutsConfig> for StageTimeouts {
    fn from(config: &TimeoutsConfig) -> Self {
        Self {
            download: Duration::from_secs(config.download_secs),
            extract: Duration::from_secs(config.extract_secs),
            transform: Duration::from_secs(config.transform_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.work_dir, PathBuf::from("."));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.orchestrator.max_concurrent_documents, 4);
        assert_eq!(config.timeouts.extract_secs, 600);
    }

    #[test]
    fn test_stage_timeouts_conversion() {
        let timeouts = TimeoutsConfig {
            download_secs: 5,
            extract_secs: 10,
            transform_secs: 15,
        };
        let stage_timeouts = StageTimeouts::from(&timeouts);
        assert_eq!(stage_timeouts.download, Duration::from_secs(5));
        assert_eq!(stage_timeouts.transform, Duration::from_secs(15));
    }
}
