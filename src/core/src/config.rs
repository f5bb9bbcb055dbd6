use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StrataError};

/// Strata configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Log level used when `RUST_LOG` is not set
    pub log_level: LogLevel,

    /// Flattening engine settings
    pub extract: ExtractConfig,
}

impl StrataConfig {
    /// Load configuration from a YAML (or JSON) file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: StrataConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        self.extract.validate()
    }
}

/// Flattening engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Number of chunks the extraction pipe holds before the producer blocks
    pub pipe_depth: usize,

    /// Size in bytes of each chunk handed across the pipe
    pub chunk_size: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            pipe_depth: 4,
            chunk_size: 32 * 1024,
        }
    }
}

impl ExtractConfig {
    /// Check that the pipe can make progress.
    pub fn validate(&self) -> Result<()> {
        if self.pipe_depth == 0 {
            return Err(StrataError::ConfigError(
                "extract.pipe_depth must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(StrataError::ConfigError(
                "extract.chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for an `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = StrataConfig::default();
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.extract.pipe_depth, 4);
        assert_eq!(config.extract.chunk_size, 32 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_yaml_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("strata.yaml");
        std::fs::write(&path, "log_level: debug\nextract:\n  pipe_depth: 1\n").unwrap();

        let config = StrataConfig::load(&path).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.extract.pipe_depth, 1);
        assert_eq!(config.extract.chunk_size, 32 * 1024);
    }

    #[test]
    fn test_load_json_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("strata.json");
        std::fs::write(&path, r#"{"extract": {"chunk_size": 512}}"#).unwrap();

        let config = StrataConfig::load(&path).unwrap();
        assert_eq!(config.extract.chunk_size, 512);
    }

    #[test]
    fn test_load_rejects_zero_pipe_depth() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("strata.yaml");
        std::fs::write(&path, "extract:\n  pipe_depth: 0\n").unwrap();

        let err = StrataConfig::load(&path).unwrap_err();
        assert!(matches!(err, StrataError::ConfigError(_)));
        assert!(err.to_string().contains("pipe_depth"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = StrataConfig::load(Path::new("/nonexistent/strata.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Debug), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Info.as_str(), "info");
    }
}
