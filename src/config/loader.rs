//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and client construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Validation(vec![err])
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Environment overrides are applied between parsing and validation.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ClientConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay `TELEMETRY_*` variables onto a parsed config.
pub fn apply_env_overrides<F>(config: &mut ClientConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dsn) = lookup("TELEMETRY_DSN") {
        config.dsn = dsn;
    }
    if let Some(key) = lookup("TELEMETRY_API_KEY") {
        config.api_key = key;
    }
    if let Some(env) = lookup("TELEMETRY_ENVIRONMENT") {
        config.environment = env;
    }
    if let Some(release) = lookup("TELEMETRY_RELEASE") {
        config.release = Some(release);
    }
    if let Some(debug) = lookup("TELEMETRY_DEBUG") {
        config.debug = matches!(debug.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join("telemetry_guard_load_config.toml");
        fs::write(
            &path,
            r#"
            dsn = "https://localhost:8111/proj-1"
            api_key = "secret"
            timeout_secs = 1.5
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.timeout_secs, 1.5);

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let path = std::env::temp_dir().join("telemetry_guard_invalid_config.toml");
        fs::write(&path, "dsn = \"not a dsn\"\napi_key = \"k\"\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("invalid dsn"));

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/telemetry.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TELEMETRY_DSN", "http://collector:9000/p"),
            ("TELEMETRY_RELEASE", "1.2.3"),
            ("TELEMETRY_DEBUG", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.dsn, "http://collector:9000/p");
        assert_eq!(config.release.as_deref(), Some("1.2.3"));
        assert!(config.debug);
        assert_eq!(config.environment, "production");
    }
}
