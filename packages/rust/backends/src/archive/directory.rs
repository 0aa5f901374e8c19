//! Archive backend that stores documents in a local directory tree.
//!
//! Layout under the configured root:
//!
//! ```text
//! <root>/<canonical filename>          stored document
//! <root>/.records/<document_id>.json   archive record (metadata + checksum)
//! ```
//!
//! Verification re-hashes the stored document against the record, so a copy
//! that was removed or altered after upload is reported accordingly.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use docpipe_shared::{MergedMetadata, copy_atomic, sha256_file, write_atomic};

use super::{ArchiveBackend, ArchiveReceipt, ArchiveRequest, VerificationStatus};
use crate::blocking::run_blocking;
use crate::error::{BackendError, BackendResult};

const RECORDS_DIR: &str = ".records";
const DOCUMENT_ID_LEN: usize = 16;

/// On-disk record written alongside each stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    document_id: String,
    /// Filename relative to the archive root.
    stored_name: String,
    sha256: String,
    title: String,
    created: String,
    correspondent: String,
    #[serde(default)]
    tags: Vec<String>,
    metadata: MergedMetadata,
    archived_at: DateTime<Utc>,
}

/// Local-directory archive.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hash, store, and record one document. Blocking.
    fn store(&self, request: &ArchiveRequest) -> BackendResult<ArchiveReceipt> {
        if request.filename.contains(['/', '\\']) || request.filename.starts_with('.') {
            return Err(BackendError::Unsupported(format!(
                "'{}' is not a plain filename",
                request.filename
            )));
        }

        let sha = sha256_file(&request.file_path)?;
        let document_id = document_id_for(&request.filename, &sha);
        let stored_name = self.stored_name_for(&request.filename, &document_id, &sha)?;
        let stored_path = self.root.join(&stored_name);

        if stored_path.exists() && sha256_file(&stored_path)? == sha {
            debug!(document_id = %document_id, "identical document already stored");
        } else {
            copy_atomic(&request.file_path, &stored_path)?;
        }

        let record = StoredRecord {
            document_id: document_id.clone(),
            stored_name,
            sha256: sha,
            title: request.title.clone(),
            created: request.created.clone(),
            correspondent: request.correspondent.clone(),
            tags: request.tags.clone(),
            metadata: request.metadata.clone(),
            archived_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| BackendError::failed(format!("cannot encode archive record: {e}")))?;
        write_atomic(&self.record_path(&document_id), &json)?;

        debug!(document_id = %document_id, path = %stored_path.display(), "document archived");

        Ok(ArchiveReceipt {
            verification_handle: document_id.clone(),
            document_id,
            url: format!("file://{}", stored_path.display()),
        })
    }

    /// Re-hash the stored document against its record. Blocking.
    fn check(&self, handle: &str) -> BackendResult<VerificationStatus> {
        if !is_valid_handle(handle) {
            return Ok(VerificationStatus::Failed(format!(
                "unknown verification handle '{handle}'"
            )));
        }

        let Some(record) = self.load_record(handle)? else {
            return Ok(VerificationStatus::Pending);
        };

        let stored_path = self.root.join(&record.stored_name);
        if !stored_path.exists() {
            return Ok(VerificationStatus::Pending);
        }

        let actual = sha256_file(&stored_path)?;
        if actual == record.sha256 {
            Ok(VerificationStatus::Succeeded)
        } else {
            warn!(document_id = %handle, "stored document does not match its checksum");
            Ok(VerificationStatus::Failed(format!(
                "checksum mismatch for {}",
                record.stored_name
            )))
        }
    }

    fn record_path(&self, document_id: &str) -> PathBuf {
        self.root
            .join(RECORDS_DIR)
            .join(format!("{document_id}.json"))
    }

    /// Pick the stored name for `filename`. An existing file with different
    /// content keeps its name; the new document gets an id suffix.
    fn stored_name_for(&self, filename: &str, document_id: &str, sha: &str) -> BackendResult<String> {
        let candidate = self.root.join(filename);
        if !candidate.exists() || sha256_file(&candidate)? == sha {
            return Ok(filename.to_string());
        }
        let suffix = &document_id[..8];
        Ok(match filename.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}-{suffix}.{ext}"),
            None => format!("{filename}-{suffix}"),
        })
    }

    fn load_record(&self, document_id: &str) -> BackendResult<Option<StoredRecord>> {
        let path = self.record_path(document_id);
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| BackendError::failed(format!("corrupt archive record {document_id}: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io(path, e)),
        }
    }
}

/// Document id: truncated SHA-256 over the canonical name and content digest.
fn document_id_for(filename: &str, content_sha: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update(b"\0");
    hasher.update(content_sha.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..DOCUMENT_ID_LEN].to_string()
}

fn is_valid_handle(handle: &str) -> bool {
    handle.len() == DOCUMENT_ID_LEN && handle.chars().all(|c| c.is_ascii_hexdigit())
}

#[async_trait]
impl ArchiveBackend for DirectoryArchive {
    fn name(&self) -> &str {
        "directory"
    }

    fn is_configured(&self) -> bool {
        !self.root.as_os_str().is_empty()
    }

    #[instrument(skip_all, fields(filename = %request.filename))]
    async fn archive(&self, request: &ArchiveRequest) -> BackendResult<ArchiveReceipt> {
        let this = self.clone();
        let request = request.clone();
        run_blocking(move || this.store(&request)).await
    }

    async fn verification_status(&self, handle: &str) -> BackendResult<VerificationStatus> {
        let this = self.clone();
        let handle = handle.to_string();
        run_blocking(move || this.check(&handle)).await
    }
}
