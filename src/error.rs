//! Centralized error types for cubbystore
//!
//! Mirrors the error policy in spec §7: local recoverable conditions get
//! their own variant, anything that threatens index/store consistency is
//! surfaced distinctly so the caller can decide whether to rebuild or abort.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cubbystore operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No entry exists for the given id.
    #[error("object not found: {id}")]
    NotFound { id: String },

    /// A caller-supplied argument was invalid (bad property name, unsupported
    /// unique-values field, malformed query, ...).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// I/O operation errors that are not otherwise classified.
    #[error("I/O error: {path} - {message}")]
    Io {
        path: PathBuf,
        message: String,
        source: Option<anyhow::Error>,
    },

    /// Index open/query failure. Recoverable: the caller should remove and
    /// rebuild the index.
    #[error("index error: {message}")]
    Index { message: String },

    /// The on-disk index is known to be stale or corrupt and a rebuild is
    /// required before the requested operation can proceed normally.
    #[error("index corrupt, rebuild required: {message}")]
    IndexCorrupt { message: String },

    /// A fatal condition (index flush failure) that must abort the process
    /// so the next startup runs a full rebuild.
    #[error("fatal store error: {message}")]
    Fatal { message: String },

    /// Configuration errors (bad env var, unresolvable profile root, ...).
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    pub fn index_corrupt(message: impl Into<String>) -> Self {
        Self::IndexCorrupt {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for cubbystore operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: err.to_string(),
            source: None,
        }
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Index {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = StoreError::not_found("abc-123");
        assert!(err.to_string().contains("not found"));

        let err = StoreError::invalid_argument("bad property name");
        assert!(err.to_string().contains("invalid argument"));
    }

    #[test]
    fn test_io_error() {
        let path = PathBuf::from("/test/path");
        let err = StoreError::io(&path, "file not found");
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("/test/path"));
    }
}
