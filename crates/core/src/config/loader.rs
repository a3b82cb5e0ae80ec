use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable prefix; nested keys use a double underscore,
/// e.g. `AEROPIPE_RETRY__MAX_ATTEMPTS=5`.
const ENV_PREFIX: &str = "AEROPIPE_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load from the given file when one is configured, otherwise fall back
/// to built-in defaults plus environment overrides.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Figment::new()
            .merge(Toml::string(""))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string())),
    }
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
work_dir = "/data/aip"

[retry]
max_attempts = 5

[orchestrator]
max_concurrent_documents = 2
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.work_dir.to_str(), Some("/data/aip"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.orchestrator.max_concurrent_documents, 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.timeouts.download_secs, 30);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
work_dir = "/srv/aip"

[fetcher]
timeout_secs = 15

[transformer]
model = "mistral-small-latest"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.work_dir.to_str(), Some("/srv/aip"));
        assert_eq!(config.fetcher.timeout_secs, 15);
        assert_eq!(config.transformer.model, "mistral-small-latest");
    }

    #[test]
    fn test_load_config_or_default_without_file() {
        let config = load_config_or_default(None).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = load_config_from_str("work_dir = [not toml");
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }
}
