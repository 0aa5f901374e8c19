//! Filesystem-heavy backend work, moved off the async workers.

use tracing::Span;

use crate::error::{BackendError, BackendResult};

/// Run `work` on the blocking pool inside the caller's span.
///
/// Dropping the returned future (for example on timeout) detaches the work;
/// it still runs to completion in the background.
pub(crate) async fn run_blocking<T, F>(work: F) -> BackendResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> BackendResult<T> + Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|e| BackendError::failed(format!("backend task failed: {e}")))?
}
