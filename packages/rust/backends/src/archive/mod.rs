//! Archive capability: durable storage of the renamed document.

mod directory;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use docpipe_shared::MergedMetadata;

use crate::error::BackendResult;

pub use directory::DirectoryArchive;

/// Everything the archive needs to store one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRequest {
    /// Raw file to upload.
    pub file_path: PathBuf,
    /// Canonical filename to store it under.
    pub filename: String,
    pub title: String,
    /// Publication date as merged (free-form).
    pub created: String,
    /// Publishing organization.
    pub correspondent: String,
    pub tags: Vec<String>,
    pub metadata: MergedMetadata,
}

/// Acknowledgement of an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    /// Stable identifier for the stored document.
    pub document_id: String,
    /// Opaque handle passed back to [`ArchiveBackend::verification_status`].
    pub verification_handle: String,
    /// Canonical location of the stored document.
    pub url: String,
}

/// Archive-side state of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Not yet confirmed; poll again.
    Pending,
    /// The archive holds a retrievable, intact copy.
    Succeeded,
    /// The archive reports the upload will not succeed.
    Failed(String),
}

/// Stores documents and reports whether they became durable.
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Human-readable backend name for tracing.
    fn name(&self) -> &str;

    /// Whether the backend has the settings it needs.
    fn is_configured(&self) -> bool;

    /// Submit a document. Acceptance is not durability; see
    /// [`verification_status`](Self::verification_status).
    async fn archive(&self, request: &ArchiveRequest) -> BackendResult<ArchiveReceipt>;

    /// Query the state of a previously accepted upload.
    async fn verification_status(&self, handle: &str) -> BackendResult<VerificationStatus>;
}
