//! Error type returned by every backend operation.

use std::path::PathBuf;
use std::time::Duration;

use docpipe_shared::DocPipeError;

/// Failure reported by a parser, archive, or RAG backend.
///
/// The pipeline records these against the stage that produced them; none of
/// them abort a run.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or is not set up.
    #[error("{backend} is unavailable: {message}")]
    Unavailable { backend: String, message: String },

    /// The input is outside what the backend accepts.
    #[error("unsupported input: {0}")]
    Unsupported(String),

    /// The backend ran and reported an error.
    #[error("{0}")]
    Failed(String),

    /// The call exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Local filesystem error while staging or storing a document.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result alias for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

impl BackendError {
    pub fn unavailable(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<DocPipeError> for BackendError {
    fn from(err: DocPipeError) -> Self {
        match err {
            DocPipeError::Io { path, source } => Self::Io { path, source },
            other => Self::Failed(other.to_string()),
        }
    }
}
