//! Error types for assetenrich.
//!
//! Library crates use [`EnrichError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all assetenrich operations.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The lookup provider could not produce data for a key
    /// (network failure, HTTP status, element not found).
    #[error("lookup failed for {key}: {message}")]
    Lookup { key: String, message: String },

    /// The lookup provider did not answer within the configured timeout.
    #[error("lookup for {key} timed out after {}s", timeout.as_secs_f64())]
    Timeout { key: String, timeout: Duration },

    /// A date string did not match any accepted format.
    #[error("parse error: {message} (input: {input:?})")]
    Parse { input: String, message: String },

    /// The source record list could not be read or filtered.
    #[error("load error: {message}")]
    Load { message: String },

    /// Data validation error (invalid state transition, bad input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON or CSV (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnrichError>;

impl EnrichError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a lookup error for `key`.
    pub fn lookup(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Lookup {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error carrying the offending input.
    pub fn parse(input: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            message: msg.into(),
        }
    }

    /// Create a load error from any displayable message.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error only affects a single record.
    ///
    /// Record failures are caught by the worker that hit them and logged;
    /// everything else is fatal to the batch.
    pub fn is_record_failure(&self) -> bool {
        matches!(
            self,
            Self::Lookup { .. } | Self::Timeout { .. } | Self::Parse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = EnrichError::config("pool_size must be at least 1");
        assert_eq!(err.to_string(), "config error: pool_size must be at least 1");

        let err = EnrichError::lookup("SN1", "HTTP 503");
        assert_eq!(err.to_string(), "lookup failed for SN1: HTTP 503");

        let err = EnrichError::Timeout {
            key: "SN2".into(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "lookup for SN2 timed out after 1.5s");
    }

    #[test]
    fn record_failures_are_classified() {
        assert!(EnrichError::lookup("k", "down").is_record_failure());
        assert!(EnrichError::parse("junk", "bad date").is_record_failure());
        assert!(!EnrichError::load("missing column").is_record_failure());
        assert!(!EnrichError::config("bad").is_record_failure());
    }
}
