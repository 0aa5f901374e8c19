//! Scripted backends for pipeline tests. Each counts its invocations.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use docpipe_backends::{
    ArchiveBackend, ArchiveReceipt, ArchiveRequest, BackendError, BackendResult, ParsedResult,
    ParserBackend, RagBackend, RagReceipt, RagRequest, VerificationStatus,
};
use docpipe_shared::{AppConfig, Metadata, PipelineConfig};

/// Runtime config rooted at `root`, with default settings otherwise.
pub(crate) fn test_config(root: &Path) -> PipelineConfig {
    let mut app = AppConfig::default();
    app.pipeline.state_dir = root.join("state").display().to_string();
    app.archive.root = root.join("archive").display().to_string();
    app.rag.root = root.join("rag").display().to_string();
    app.timeouts.verify_secs = 10;
    app.timeouts.verify_poll_interval_ms = 2000;
    PipelineConfig::try_from(&app).expect("test config is valid")
}

pub(crate) struct MockParser {
    calls: AtomicUsize,
    metadata: Metadata,
    failure: Option<String>,
    cancel_on_parse: Option<CancellationToken>,
}

impl MockParser {
    pub fn returning(metadata: Metadata) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            metadata,
            failure: None,
            cancel_on_parse: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            metadata: Metadata::new(),
            failure: Some(message.to_string()),
            cancel_on_parse: None,
        }
    }

    /// Parses normally and cancels `token` on every call.
    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_parse: Some(token),
            ..Self::returning(Metadata::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParserBackend for MockParser {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn supported_formats(&self) -> &[&'static str] {
        &["pdf", "md", "txt", "html"]
    }

    async fn parse(&self, file_path: &Path, _context: &Metadata) -> BackendResult<ParsedResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_parse {
            token.cancel();
        }
        // Let sibling tasks run while this one holds its claim.
        tokio::task::yield_now().await;

        if let Some(message) = &self.failure {
            return Err(BackendError::failed(message.clone()));
        }

        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = file_path.with_file_name(format!("{name}.parsed.md"));
        std::fs::write(&output, "# parsed\n").map_err(|e| BackendError::io(&output, e))?;

        Ok(ParsedResult {
            normalized_text_path: output,
            metadata: self.metadata.clone(),
        })
    }
}

pub(crate) struct MockArchive {
    archive_calls: AtomicUsize,
    status_calls: AtomicUsize,
    scripted: Mutex<VecDeque<BackendResult<VerificationStatus>>>,
    fallback: VerificationStatus,
    archive_failure: Option<String>,
    status_latency: Option<Duration>,
    requests: Mutex<Vec<ArchiveRequest>>,
}

impl MockArchive {
    fn build(
        scripted: Vec<BackendResult<VerificationStatus>>,
        fallback: VerificationStatus,
        archive_failure: Option<String>,
    ) -> Self {
        Self {
            archive_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            scripted: Mutex::new(scripted.into()),
            fallback,
            archive_failure,
            status_latency: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Accepts uploads and confirms them on the first poll.
    pub fn verifying() -> Self {
        Self::build(Vec::new(), VerificationStatus::Succeeded, None)
    }

    /// Accepts uploads and never confirms them.
    pub fn pending_forever() -> Self {
        Self::build(Vec::new(), VerificationStatus::Pending, None)
    }

    /// Replays `statuses`, then stays pending.
    pub fn with_statuses(statuses: Vec<BackendResult<VerificationStatus>>) -> Self {
        Self::build(statuses, VerificationStatus::Pending, None)
    }

    /// Rejects every upload.
    pub fn failing(message: &str) -> Self {
        Self::build(
            Vec::new(),
            VerificationStatus::Succeeded,
            Some(message.to_string()),
        )
    }

    pub fn with_status_latency(mut self, latency: Duration) -> Self {
        self.status_latency = Some(latency);
        self
    }

    pub fn archive_calls(&self) -> usize {
        self.archive_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ArchiveRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveBackend for MockArchive {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn archive(&self, request: &ArchiveRequest) -> BackendResult<ArchiveReceipt> {
        let n = self.archive_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        if let Some(message) = &self.archive_failure {
            return Err(BackendError::failed(message.clone()));
        }
        Ok(ArchiveReceipt {
            document_id: format!("doc-{n}"),
            verification_handle: format!("handle-{n}"),
            url: format!("mem://doc-{n}"),
        })
    }

    async fn verification_status(&self, _handle: &str) -> BackendResult<VerificationStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.status_latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.scripted.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub(crate) struct MockRag {
    calls: AtomicUsize,
    fail: bool,
}

impl MockRag {
    pub fn accepting() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RagBackend for MockRag {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn test_connection(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn ingest(&self, request: &RagRequest) -> BackendResult<RagReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BackendError::unavailable("mock rag", "connection refused"));
        }
        Ok(RagReceipt {
            document_id: format!("rag-{}", request.metadata.url),
            collection_id: request.collection_id.clone(),
        })
    }
}
