//! Runtime configuration for canonicalization policy.
//!
//! # Responsibility
//! - Hold policy toggles that callers must choose explicitly.
//! - Load and validate configuration from JSON.
//!
//! # Invariants
//! - `max_page_size` is at least 1.
//! - Unknown JSON fields are rejected instead of silently ignored.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Configuration errors raised while loading or validating `CanonConfig`.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Canonicalization policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanonConfig {
    /// Register unknown tags as singleton clusters during `match_tags`.
    pub auto_register_unknown: bool,
    /// Largest accepted suggestion page size. Larger requests are rejected.
    pub max_page_size: u32,
    /// Log level passed to `init_logging` by binaries.
    pub log_level: Option<String>,
    /// Absolute log directory passed to `init_logging` by binaries.
    pub log_dir: Option<PathBuf>,
}

impl Default for CanonConfig {
    fn default() -> Self {
        Self {
            auto_register_unknown: false,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            log_level: None,
            log_dir: None,
        }
    }
}

impl CanonConfig {
    /// Parses and validates configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_page_size == 0 {
            return Err(ConfigError::Invalid(
                "max_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CanonConfig, ConfigError};

    #[test]
    fn empty_object_uses_defaults() {
        let config = CanonConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CanonConfig::default());
        assert!(!config.auto_register_unknown);
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = CanonConfig::from_json_str(
            r#"{"auto_register_unknown": true, "max_page_size": 25, "log_level": "debug"}"#,
        )
        .unwrap();
        assert!(config.auto_register_unknown);
        assert_eq!(config.max_page_size, 25);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = CanonConfig::from_json_str(r#"{"max_page_size": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = CanonConfig::from_json_str(r#"{"auto_register": true}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CanonConfig::from_path("/nonexistent/termcanon.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/termcanon.json"));
    }
}
