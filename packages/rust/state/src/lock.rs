//! Advisory cross-process lock for a source.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docpipe_shared::{DocPipeError, Result};

use crate::source_file;

#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Exclusive run lock on `<state_dir>/<source>.lock`, released on drop.
///
/// The lock file is created with `create_new`, so a second process fails
/// fast instead of interleaving writes to the same state file. A process
/// that dies without dropping the guard leaves the file behind; remove it
/// with [`SourceLock::break_lock`].
#[derive(Debug)]
pub struct SourceLock {
    path: PathBuf,
}

impl SourceLock {
    pub fn acquire(state_dir: &Path, source: &str) -> Result<Self> {
        let path = source_file(state_dir, source, "lock")?;
        std::fs::create_dir_all(state_dir).map_err(|e| DocPipeError::io(state_dir, e))?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DocPipeError::Locked {
                    source_name: source.to_string(),
                    holder: describe_holder(&path),
                });
            }
            Err(e) => return Err(DocPipeError::io(&path, e)),
        };

        let holder = LockHolder {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let lock = Self { path };
        // Dropping `lock` on a failed write removes the half-written file.
        file.write_all(&serde_json::to_vec(&holder)?)
            .and_then(|()| file.sync_all())
            .map_err(|e| DocPipeError::io(&lock.path, e))?;

        debug!(path = %lock.path.display(), pid = holder.pid, "source lock acquired");
        Ok(lock)
    }

    /// Remove a lock left behind by a dead process. Returns whether one existed.
    pub fn break_lock(state_dir: &Path, source: &str) -> Result<bool> {
        let path = source_file(state_dir, source, "lock")?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                warn!(path = %path.display(), "removed existing source lock");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DocPipeError::io(&path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SourceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release source lock");
        }
    }
}

fn describe_holder(path: &Path) -> String {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<LockHolder>(&content).ok())
        .map(|h| format!("pid {} since {}", h.pid, h.acquired_at.to_rfc3339()))
        .unwrap_or_else(|| format!("unknown holder, see {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_first_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let first = SourceLock::acquire(dir.path(), "aemo").unwrap();

        let err = SourceLock::acquire(dir.path(), "aemo").unwrap_err();
        match err {
            DocPipeError::Locked { source_name, holder } => {
                assert_eq!(source_name, "aemo");
                assert!(holder.contains(&format!("pid {}", std::process::id())));
            }
            other => panic!("expected Locked, got {other:?}"),
        }

        drop(first);
        assert!(!dir.path().join("aemo.lock").exists());
        SourceLock::acquire(dir.path(), "aemo").unwrap();
    }

    #[test]
    fn different_sources_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let _a = SourceLock::acquire(dir.path(), "aemo").unwrap();
        let _b = SourceLock::acquire(dir.path(), "aer").unwrap();
    }

    #[test]
    fn break_lock_clears_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("aemo.lock"), b"garbage").unwrap();

        let err = SourceLock::acquire(dir.path(), "aemo").unwrap_err();
        assert!(err.to_string().contains("unknown holder"));

        assert!(SourceLock::break_lock(dir.path(), "aemo").unwrap());
        assert!(!SourceLock::break_lock(dir.path(), "aemo").unwrap());
        SourceLock::acquire(dir.path(), "aemo").unwrap();
    }
}
