//! RAG capability: ingestion of normalized text into a retrieval collection.

mod directory;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use docpipe_shared::MergedMetadata;

use crate::error::BackendResult;

pub use directory::DirectoryRag;

#[derive(Debug, Clone, PartialEq)]
pub struct RagRequest {
    pub normalized_text_path: PathBuf,
    pub metadata: MergedMetadata,
    pub collection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagReceipt {
    pub document_id: String,
    pub collection_id: String,
}

/// Ingests normalized documents for retrieval.
#[async_trait]
pub trait RagBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool;

    /// Cheap reachability probe run once before a pipeline run.
    async fn test_connection(&self) -> BackendResult<()>;

    /// Ingest one document. Re-ingesting the same URL replaces the entry.
    async fn ingest(&self, request: &RagRequest) -> BackendResult<RagReceipt>;
}
