//! Error types for Docket.
//!
//! Library crates use [`DocketError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-document problems inside a run are not errors at this level: they are
//! reported as [`FailureKind`](crate::types::FailureKind) values in the run
//! summary. A `DocketError` escaping a run means the run itself could not
//! proceed.

use std::path::PathBuf;

/// Top-level error type for all Docket operations.
#[derive(Debug, thiserror::Error)]
pub enum DocketError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Metadata database or blob store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Bad input to an operation (date range, arguments, manifest lines).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A discovered document's metadata cannot be accepted.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocketError>;

impl DocketError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a storage error from any displayable source.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocketError::config("data_dir must not be empty");
        assert_eq!(err.to_string(), "config error: data_dir must not be empty");

        let err = DocketError::InvalidMetadata("published date '31/31/2025' not recognised".into());
        assert!(err.to_string().starts_with("invalid metadata:"));
        assert!(err.to_string().contains("31/31/2025"));
    }

    #[test]
    fn io_errors_carry_their_path() {
        let err = DocketError::io("/tmp/x", std::io::Error::other("disk gone"));
        assert!(matches!(&err, DocketError::Io { path, .. } if path.as_path() == std::path::Path::new("/tmp/x")));
        assert!(err.to_string().contains("disk gone"));
    }
}
