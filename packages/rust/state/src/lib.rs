//! Per-source processing state for docpipe.
//!
//! [`StateTracker`] remembers which URLs reached a terminal outcome so later
//! runs can skip them. [`SourceLock`] keeps two processes from running the
//! same source at once.

mod lock;
mod record;
mod tracker;

use std::path::{Path, PathBuf};

use docpipe_shared::{DocPipeError, Result};

pub use lock::SourceLock;
pub use record::{RecordStatus, RunRecord, StateFile, Statistics};
pub use tracker::{Claim, StateTracker};

/// `<state_dir>/<source>.<extension>`, rejecting source names that are not
/// plain file stems.
pub(crate) fn source_file(state_dir: &Path, source: &str, extension: &str) -> Result<PathBuf> {
    let valid = !source.is_empty()
        && !source.starts_with('.')
        && source
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(DocPipeError::validation(format!(
            "invalid source name '{source}': use letters, digits, '-', '_' or '.'"
        )));
    }
    Ok(state_dir.join(format!("{source}.{extension}")))
}
