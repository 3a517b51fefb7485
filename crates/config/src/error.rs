//! Error types for the configuration system

use crate::PolicyKind;
use rampart_resilience::BuildError;
use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors from loading, saving or building a config
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file at `path` is not valid TOML for a [`Config`](crate::Config)
    #[error("Malformed config in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// In-memory text is not valid TOML for a [`Config`](crate::Config)
    #[error("Malformed config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Cannot serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// One or more fields failed validation; messages are joined with `; `
    #[error("Invalid config: {0}")]
    ValidationError(String),

    #[error("Pipeline lists '{0}' but the config has no [{0}] section")]
    MissingSection(PolicyKind),

    /// A policy constructor refused the configured values
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Cannot create directory {path}: {source}")]
    DirectoryCreationError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot resolve config location: {reason}")]
    PathResolutionError { reason: String },

    /// Copying the previous file to `.toml.backup` failed
    #[error("Cannot back up previous config: {source}")]
    BackupError { source: std::io::Error },

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn from_validation(errors: &[ValidationError]) -> Self {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        ConfigError::ValidationError(message)
    }
}

/// A config field that failed its check
///
/// Displays as `<field> <message>`, e.g.
/// `retry.max_attempts must be between 1 and 100 (got 0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the field, or `pipeline`
    pub field: String,
    pub message: String,
    /// Offending value as written
    pub value: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    /// Same as [`ValidationError::new`], recording the rejected value
    pub fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Self::new(field, message)
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} (got {})", self.field, self.message, value),
            None => write!(f, "{} {}", self.field, self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("bulkhead.max_concurrency", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "bulkhead.max_concurrency must be at least 1"
        );
    }

    #[test]
    fn test_validation_error_with_value() {
        let err = ValidationError::with_value(
            "circuit_breaker.failure_ratio",
            "must be between 0.01 and 1",
            "1.5",
        );
        assert_eq!(
            err.to_string(),
            "circuit_breaker.failure_ratio must be between 0.01 and 1 (got 1.5)"
        );
    }

    #[test]
    fn test_missing_section_display() {
        let err = ConfigError::MissingSection(PolicyKind::RateLimiter);
        assert_eq!(
            err.to_string(),
            "Pipeline lists 'rate_limiter' but the config has no [rate_limiter] section"
        );
    }

    #[test]
    fn test_from_validation_joins_messages() {
        let err = ConfigError::from_validation(&[
            ValidationError::new("a", "bad"),
            ValidationError::new("b", "worse"),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid config: a bad; b worse"
        );
    }
}
