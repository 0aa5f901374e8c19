//! Parser capability: raw file in, normalized Markdown plus metadata out.

mod local;
mod normalize;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use docpipe_shared::Metadata;

use crate::error::BackendResult;

pub use local::LocalParser;

/// Output of a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResult {
    /// Normalized Markdown written next to the raw file.
    pub normalized_text_path: PathBuf,
    /// Metadata extracted from the document content.
    pub metadata: Metadata,
}

/// Converts a raw document into normalized text.
#[async_trait]
pub trait ParserBackend: Send + Sync {
    /// Human-readable backend name for tracing.
    fn name(&self) -> &str;

    /// Whether the backend can currently accept work.
    async fn is_available(&self) -> bool;

    /// Lowercase file extensions this backend accepts.
    fn supported_formats(&self) -> &[&'static str];

    /// Parse `file_path`. `context` carries the scraper's metadata as a hint.
    async fn parse(&self, file_path: &Path, context: &Metadata) -> BackendResult<ParsedResult>;

    /// Whether `extension` (without the dot) is accepted.
    fn supports(&self, extension: &str) -> bool {
        self.supported_formats()
            .iter()
            .any(|f| f.eq_ignore_ascii_case(extension))
    }
}
