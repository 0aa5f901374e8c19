//! Crash-safe file writes.
//!
//! Content is written to a hidden sibling (`.<name>.tmp`), synced, and then
//! renamed over the target. A crash at any point leaves either the old file
//! or the new one at the canonical path, never a partial write.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{DocPipeError, Result};

/// Path of the temporary sibling used while writing `target`.
pub fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.tmp"))
}

/// Atomically replace `target` with `contents`.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent(target)?;
    let temp = temp_path_for(target);

    let written = File::create(&temp)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .map_err(|e| DocPipeError::io(&temp, e));
    finish(written, &temp, target)
}

/// Atomically copy `source` to `target`.
pub fn copy_atomic(source: &Path, target: &Path) -> Result<()> {
    ensure_parent(target)?;
    let temp = temp_path_for(target);

    let copied = std::fs::copy(source, &temp)
        .map_err(|e| DocPipeError::io(source, e))
        .and_then(|_| {
            File::open(&temp)
                .and_then(|f| f.sync_all())
                .map_err(|e| DocPipeError::io(&temp, e))
        });
    finish(copied, &temp, target)
}

/// Rename a fully written temp file into place. The temp file never
/// outlives a failure.
fn finish(written: Result<()>, temp: &Path, target: &Path) -> Result<()> {
    let renamed =
        written.and_then(|()| std::fs::rename(temp, target).map_err(|e| DocPipeError::io(target, e)));
    if renamed.is_err() {
        let _ = std::fs::remove_file(temp);
    }
    renamed
}

fn ensure_parent(target: &Path) -> Result<()> {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| DocPipeError::io(parent, e))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_replaces_existing_content_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("state.json");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert!(!temp_path_for(&target).exists());
    }

    #[test]
    fn copy_preserves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("raw.pdf");
        std::fs::write(&source, b"%PDF-1.7").unwrap();

        let target = dir.path().join("archive").join("2024-07_AEMO_Report.pdf");
        copy_atomic(&source, &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn copy_from_missing_source_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.pdf");

        let err = copy_atomic(&dir.path().join("missing.pdf"), &target).unwrap_err();

        assert!(matches!(err, DocPipeError::Io { .. }));
        assert!(!temp_path_for(&target).exists());
        assert!(!target.exists());
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target makes the rename fail.
        let target = dir.path().join("state.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        assert!(write_atomic(&target, b"data").is_err());
        assert!(!temp_path_for(&target).exists());
    }

    #[test]
    fn temp_path_is_hidden_sibling() {
        let temp = temp_path_for(Path::new("/state/aemo.json"));
        assert_eq!(temp, PathBuf::from("/state/.aemo.json.tmp"));
    }
}
