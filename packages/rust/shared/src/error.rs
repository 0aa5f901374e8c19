//! Error types for docpipe.
//!
//! Library crates use [`DocPipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docpipe operations.
#[derive(Debug, thiserror::Error)]
pub enum DocPipeError {
    /// Configuration loading or validation error. Always fatal at startup.
    #[error("config error: {message}")]
    Config { message: String },

    /// Input data that does not satisfy a documented contract.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// State file or archive record persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON/TOML (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A backend failed its startup probe.
    #[error("backend error ({backend}): {message}")]
    Backend { backend: String, message: String },

    /// Another run holds the lock for this source.
    #[error("source '{source_name}' is locked by another run ({holder})")]
    Locked { source_name: String, holder: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocPipeError>;

impl DocPipeError {
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

    /// Create a backend probe error.
    pub fn backend(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
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

    /// Whether this error belongs to the startup-fatal configuration class.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Backend { .. })
    }
}

impl From<serde_json::Error> for DocPipeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
