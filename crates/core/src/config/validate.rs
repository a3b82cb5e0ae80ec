use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Retry attempts and worker pool size are at least 1
/// - Stage timeouts are nonzero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.max_concurrent_documents == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_concurrent_documents cannot be 0".to_string(),
        ));
    }

    for (name, secs) in [
        ("timeouts.download_secs", config.timeouts.download_secs),
        ("timeouts.extract_secs", config.timeouts.extract_secs),
        ("timeouts.transform_secs", config.timeouts.transform_secs),
    ] {
        if secs == 0 {
            return Err(ConfigError::ValidationError(format!("{name} cannot be 0")));
        }
    }

    Ok(())
}
