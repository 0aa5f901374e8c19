//! In-process parser for text-based formats.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use docpipe_shared::{Metadata, write_atomic};

use super::normalize;
use super::{ParsedResult, ParserBackend};
use crate::blocking::run_blocking;
use crate::error::{BackendError, BackendResult};

const SUPPORTED_FORMATS: &[&str] = &["md", "markdown", "txt", "html", "htm"];

/// Parses Markdown, plain text, and HTML without any external service.
///
/// The normalized Markdown is written next to the raw file as
/// `<name>.parsed.md`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalParser;

impl LocalParser {
    pub fn new() -> Self {
        Self
    }

    /// Where the normalized output for `raw` is written.
    pub fn output_path_for(raw: &Path) -> PathBuf {
        let name = raw
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        raw.with_file_name(format!("{name}.parsed.md"))
    }
}

#[async_trait]
impl ParserBackend for LocalParser {
    fn name(&self) -> &str {
        "local"
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &[&'static str] {
        SUPPORTED_FORMATS
    }

    #[instrument(skip_all, fields(path = %file_path.display()))]
    async fn parse(&self, file_path: &Path, _context: &Metadata) -> BackendResult<ParsedResult> {
        let extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.supports(&extension) {
            return Err(BackendError::Unsupported(format!(
                "local parser cannot read '.{extension}' files"
            )));
        }

        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| BackendError::io(file_path, e))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let is_html = matches!(extension.as_str(), "html" | "htm");

        // scraper's DOM is !Send, so the whole conversion stays on one thread.
        let output = Self::output_path_for(file_path);
        let target = output.clone();
        let document = run_blocking(move || {
            let document = if is_html {
                normalize::from_html(&text)?
            } else {
                normalize::from_text(&text)
            };
            write_atomic(&target, document.markdown.as_bytes())?;
            Ok(document)
        })
        .await?;

        debug!(
            output = %output.display(),
            word_count = document.word_count,
            "document normalized"
        );

        Ok(ParsedResult {
            normalized_text_path: output,
            metadata: document.metadata(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn parses_markdown_and_writes_sibling_output() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("report.md");
        std::fs::write(&raw, "# Annual Report 2024\n\nRevenue grew.\n").unwrap();

        let result = LocalParser::new().parse(&raw, &Metadata::new()).await.unwrap();

        assert_eq!(result.normalized_text_path, dir.path().join("report.md.parsed.md"));
        let written = std::fs::read_to_string(&result.normalized_text_path).unwrap();
        assert!(written.starts_with("# Annual Report 2024"));
        assert_eq!(
            result.metadata.get("title"),
            Some(&Value::from("Annual Report 2024"))
        );
    }

    #[tokio::test]
    async fn extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("NOTICE.HTML");
        std::fs::write(&raw, "<html><body><p>Hello</p></body></html>").unwrap();

        let result = LocalParser::new().parse(&raw, &Metadata::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn rejects_unsupported_formats() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("scan.pdf");
        std::fs::write(&raw, b"%PDF-1.7").unwrap();

        let err = LocalParser::new()
            .parse(&raw, &Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unsupported(_)));
        assert!(!LocalParser::output_path_for(&raw).exists());
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalParser::new()
            .parse(&dir.path().join("gone.txt"), &Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Io { .. }));
    }
}
