//! Backend construction from configuration and startup probing.

use std::sync::Arc;

use tracing::{debug, instrument};

use docpipe_shared::{ArchiveKind, DocPipeError, ParserKind, PipelineConfig, RagKind, Result};

use crate::archive::{ArchiveBackend, DirectoryArchive};
use crate::parser::{LocalParser, ParserBackend};
use crate::rag::{DirectoryRag, RagBackend};

/// The set of capability backends one pipeline runs against.
///
/// `rag` is `None` when RAG ingestion is disabled.
#[derive(Clone)]
pub struct Services {
    pub parser: Arc<dyn ParserBackend>,
    pub archive: Arc<dyn ArchiveBackend>,
    pub rag: Option<Arc<dyn RagBackend>>,
}

impl Services {
    pub fn new(
        parser: Arc<dyn ParserBackend>,
        archive: Arc<dyn ArchiveBackend>,
        rag: Option<Arc<dyn RagBackend>>,
    ) -> Self {
        Self {
            parser,
            archive,
            rag,
        }
    }

    /// Build the backends selected in `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let parser: Arc<dyn ParserBackend> = match config.parser {
            ParserKind::Local => Arc::new(LocalParser::new()),
        };
        let archive: Arc<dyn ArchiveBackend> = match config.archive.kind {
            ArchiveKind::Directory => Arc::new(DirectoryArchive::new(&config.archive.root)),
        };
        let rag: Option<Arc<dyn RagBackend>> = match config.rag.kind {
            RagKind::Disabled => None,
            RagKind::Directory => Some(Arc::new(DirectoryRag::new(&config.rag.root))),
        };
        Self::new(parser, archive, rag)
    }

    /// Probe every backend once. Any failure is a startup configuration error.
    #[instrument(skip_all)]
    pub async fn check(&self) -> Result<()> {
        if !self.parser.is_available().await {
            return Err(DocPipeError::backend(
                self.parser.name(),
                "parser is not available",
            ));
        }

        if !self.archive.is_configured() {
            return Err(DocPipeError::backend(
                self.archive.name(),
                "archive is not configured",
            ));
        }

        if let Some(rag) = &self.rag {
            if !rag.is_configured() {
                return Err(DocPipeError::backend(rag.name(), "rag is not configured"));
            }
            rag.test_connection()
                .await
                .map_err(|e| DocPipeError::backend(rag.name(), e.to_string()))?;
        }

        debug!(
            parser = self.parser.name(),
            archive = self.archive.name(),
            rag = self.rag.as_ref().map(|r| r.name()).unwrap_or("disabled"),
            "backends ready"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("parser", &self.parser.name())
            .field("archive", &self.archive.name())
            .field("rag", &self.rag.as_ref().map(|r| r.name()))
            .finish()
    }
}
