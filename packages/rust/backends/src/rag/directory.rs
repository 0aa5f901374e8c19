//! RAG backend that materializes collections as directories.
//!
//! Each document becomes `<root>/<collection>/<id>.md` plus an `<id>.json`
//! metadata sidecar, where `<id>` is derived from the source URL.

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use docpipe_shared::{copy_atomic, write_atomic};

use super::{RagBackend, RagReceipt, RagRequest};
use crate::blocking::run_blocking;
use crate::error::{BackendError, BackendResult};

const PROBE_FILE: &str = ".docpipe-probe";

#[derive(Debug, Clone)]
pub struct DirectoryRag {
    root: PathBuf,
}

impl DirectoryRag {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn is_valid_collection(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn entry_id_for(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    digest[..16].to_string()
}

#[async_trait]
impl RagBackend for DirectoryRag {
    fn name(&self) -> &str {
        "directory"
    }

    fn is_configured(&self) -> bool {
        !self.root.as_os_str().is_empty()
    }

    async fn test_connection(&self) -> BackendResult<()> {
        let probe = self.root.join(PROBE_FILE);
        let probed: std::io::Result<()> = async {
            tokio::fs::create_dir_all(&self.root).await?;
            tokio::fs::write(&probe, b"ok").await?;
            tokio::fs::remove_file(&probe).await
        }
        .await;
        probed.map_err(|e| {
            BackendError::unavailable(
                "directory rag",
                format!("{} is not writable: {e}", self.root.display()),
            )
        })
    }

    #[instrument(skip_all, fields(collection = %request.collection_id, url = %request.metadata.url))]
    async fn ingest(&self, request: &RagRequest) -> BackendResult<RagReceipt> {
        if !is_valid_collection(&request.collection_id) {
            return Err(BackendError::Unsupported(format!(
                "invalid collection id '{}'",
                request.collection_id
            )));
        }

        let document_id = entry_id_for(&request.metadata.url);
        let collection_dir = self.root.join(&request.collection_id);

        let json = serde_json::to_vec_pretty(&request.metadata)
            .map_err(|e| BackendError::failed(format!("cannot encode rag metadata: {e}")))?;
        let source = request.normalized_text_path.clone();
        let text_path = collection_dir.join(format!("{document_id}.md"));
        let meta_path = collection_dir.join(format!("{document_id}.json"));
        run_blocking(move || {
            copy_atomic(&source, &text_path)?;
            write_atomic(&meta_path, &json)?;
            Ok(())
        })
        .await?;

        debug!(document_id = %document_id, "document ingested");

        Ok(RagReceipt {
            document_id,
            collection_id: request.collection_id.clone(),
        })
    }
}
