//! Per-item pipeline: claim → dedup → acquire → parse → merge → name →
//! archive → verify → RAG → cleanup → record.
//!
//! Stage failures become an [`Outcome`]; nothing an individual document does
//! aborts the run.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use docpipe_backends::{ArchiveRequest, BackendError, BackendResult, RagRequest, Services};
use docpipe_metadata::{FilenameTemplate, merge};
use docpipe_shared::{DocPipeError, PipelineConfig, Result, SourceItem, sha256_file};
use docpipe_state::{RunRecord, StateTracker};

use crate::outcome::{Outcome, SkipReason, Stage};
use crate::stats::{Counter, PipelineRunStats, StatsCollector};
use crate::verify::{VerifyPolicy, verify};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called once before any item is admitted.
    fn started(&self, total: usize);
    /// Called when an item enters a stage.
    fn stage(&self, url: &str, stage: Stage);
    /// Called when an item reaches its terminal outcome.
    fn item_finished(&self, url: &str, outcome: &Outcome, finished: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn started(&self, _total: usize) {}
    fn stage(&self, _url: &str, _stage: Stage) {}
    fn item_finished(&self, _url: &str, _outcome: &Outcome, _finished: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub url: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Result of [`Pipeline::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub items: Vec<ItemReport>,
    pub stats: PipelineRunStats,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.outcome.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

/// Orchestrates the stages for each item against one set of backends.
pub struct Pipeline {
    services: Services,
    state: Arc<StateTracker>,
    config: PipelineConfig,
    template: FilenameTemplate,
    force: bool,
}

impl Pipeline {
    /// Build a pipeline. The filename template is validated here so a bad
    /// template fails before any item is touched.
    pub fn new(services: Services, state: Arc<StateTracker>, config: PipelineConfig) -> Result<Self> {
        let template = FilenameTemplate::parse(&config.filename_template)?;
        Ok(Self {
            services,
            state,
            config,
            template,
            force: false,
        })
    }

    /// Bypass the dedup check.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    /// Process one item to its terminal outcome. Run counters are only
    /// reported by [`Pipeline::run`].
    pub async fn process(&self, item: &SourceItem) -> Outcome {
        self.process_with(item, &SilentProgress, &StatsCollector::default())
            .await
    }

    /// Run `items` through a bounded worker pool.
    ///
    /// `cancel` is checked as each item is admitted; items already in flight
    /// finish and the rest are reported as cancelled.
    #[instrument(skip_all, fields(items = items.len(), concurrency = self.config.max_concurrency))]
    pub async fn run(
        &self,
        items: Vec<SourceItem>,
        cancel: CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> RunReport {
        let run_id = Uuid::now_v7();
        let started = Instant::now();
        let total = items.len();
        let finished = AtomicUsize::new(0);
        let stats = StatsCollector::default();

        info!(%run_id, total, "starting pipeline run");
        progress.started(total);

        let finished = &finished;
        let cancel = &cancel;
        let stats = &stats;
        let reports: Vec<ItemReport> = stream::iter(items)
            .map(|item| async move {
                let outcome = if cancel.is_cancelled() {
                    stats.incr(Counter::Skipped);
                    Outcome::skipped(SkipReason::Cancelled)
                } else {
                    self.process_with(&item, progress, stats).await
                };
                let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                progress.item_finished(&item.url, &outcome, done, total);
                ItemReport {
                    url: item.url,
                    outcome,
                }
            })
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        let report = RunReport {
            run_id,
            items: reports,
            stats: stats.snapshot(started.elapsed()),
        };
        progress.done(&report);

        let s = &report.stats;
        info!(
            %run_id,
            scraped = s.scraped,
            archived = s.archived,
            verified = s.verified,
            rag_indexed = s.rag_indexed,
            skipped = s.skipped,
            failed = s.failed,
            state_errors = s.state_errors,
            elapsed_ms = s.elapsed.as_millis(),
            "pipeline run complete"
        );

        report
    }

    #[instrument(skip_all, fields(url = %item.url))]
    async fn process_with(
        &self,
        item: &SourceItem,
        progress: &dyn ProgressReporter,
        stats: &StatsCollector,
    ) -> Outcome {
        stats.incr(Counter::Scraped);

        // --- Dedup ---
        progress.stage(&item.url, Stage::Dedup);
        let Some(_claim) = self.state.try_claim(&item.url) else {
            debug!("url already claimed by another task");
            stats.incr(Counter::Skipped);
            return Outcome::skipped(SkipReason::InProgress);
        };
        let completed = self.completed_record(&item.url).await;
        if let Some(record) = &completed {
            let settled = match &item.content_hash {
                Some(hash) => self.is_current(record, hash),
                // Cleanup removes the raw file once its document is archived.
                None => !self.config.reprocess_on_hash_change || raw_file_gone(item).await,
            };
            if settled {
                return self.duplicate(&item.url, stats).await;
            }
        }

        // --- Acquire ---
        progress.stage(&item.url, Stage::Download);
        let content_hash = match acquire(item).await {
            Ok(hash) => hash,
            Err(e) => {
                let hash = item.content_hash.clone().unwrap_or_default();
                return self
                    .fail(item, Stage::Download, e.to_string(), &hash, stats)
                    .await;
            }
        };
        stats.incr(Counter::Downloaded);
        self.state.record_download().await;

        if completed
            .as_ref()
            .is_some_and(|record| self.is_current(record, &content_hash))
        {
            return self.duplicate(&item.url, stats).await;
        }

        let extension = item.extension().unwrap_or_default();
        if !self.services.parser.supports(&extension) {
            let reason = SkipReason::UnsupportedFormat(extension);
            info!(%reason, "skipping item");
            stats.incr(Counter::Skipped);
            self.write_record(
                &item.url,
                RunRecord::skipped(record_title(item), &content_hash, reason.to_string()),
                stats,
            )
            .await;
            return Outcome::skipped(reason);
        }

        // --- Parse ---
        progress.stage(&item.url, Stage::Parse);
        let context = item.context_mapping();
        let parsed = match with_timeout(
            self.config.timeouts.parse,
            self.services.parser.parse(&item.raw_path, &context),
        )
        .await
        {
            Ok(parsed) => parsed,
            Err(e) => {
                return self
                    .fail(item, Stage::Parse, e.to_string(), &content_hash, stats)
                    .await;
            }
        };
        stats.incr(Counter::Parsed);

        // --- Merge & name ---
        progress.stage(&item.url, Stage::Merge);
        let merged = merge(&context, &parsed.metadata, self.config.merge_strategy);
        progress.stage(&item.url, Stage::Name);
        let canonical_name = self.template.render(&merged, &item.raw_path);
        debug!(%canonical_name, title = %merged.title, "metadata merged");

        // --- Archive ---
        progress.stage(&item.url, Stage::Archive);
        let request = ArchiveRequest {
            file_path: item.raw_path.clone(),
            filename: canonical_name.clone(),
            title: merged.title.clone(),
            created: merged.publication_date.clone(),
            correspondent: merged.organization.clone(),
            tags: self.config.archive.tags.clone(),
            metadata: merged.clone(),
        };
        let receipt = match with_timeout(
            self.config.timeouts.archive,
            self.services.archive.archive(&request),
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                return self
                    .fail(item, Stage::Archive, e.to_string(), &content_hash, stats)
                    .await;
            }
        };
        stats.incr(Counter::Archived);
        info!(document_id = %receipt.document_id, %canonical_name, "document archived");

        // --- Verify ---
        progress.stage(&item.url, Stage::Verify);
        let verification = verify(
            self.services.archive.as_ref(),
            &receipt,
            VerifyPolicy::from(&self.config.timeouts),
        )
        .await;
        if !verification.is_verified() {
            return self
                .fail(item, Stage::Verify, verification.to_string(), &content_hash, stats)
                .await;
        }
        stats.incr(Counter::Verified);
        info!(
            document_id = %receipt.document_id,
            polls = verification.polls(),
            "archive verified"
        );

        // --- RAG ---
        let rag_indexed = match &self.services.rag {
            None => false,
            Some(rag) => {
                progress.stage(&item.url, Stage::Rag);
                let request = RagRequest {
                    normalized_text_path: parsed.normalized_text_path.clone(),
                    metadata: merged.clone(),
                    collection_id: self.config.rag.collection_id.clone(),
                };
                match with_timeout(self.config.timeouts.rag, rag.ingest(&request)).await {
                    Ok(rag_receipt) => {
                        stats.incr(Counter::RagIndexed);
                        debug!(rag_document_id = %rag_receipt.document_id, "rag ingest complete");
                        true
                    }
                    Err(e) => {
                        warn!(stage = %Stage::Rag, error = %e, "rag ingest failed, continuing");
                        stats.incr(Counter::RagFailed);
                        false
                    }
                }
            }
        };

        // --- Cleanup ---
        if !self.config.keep_local_files {
            progress.stage(&item.url, Stage::Cleanup);
            cleanup(item, &parsed.normalized_text_path).await;
        }

        // --- Record ---
        progress.stage(&item.url, Stage::Record);
        self.write_record(
            &item.url,
            RunRecord::completed(&merged.title, &content_hash, &receipt.document_id),
            stats,
        )
        .await;

        Outcome::Completed {
            document_id: receipt.document_id,
            canonical_name,
            rag_indexed,
        }
    }

    /// The completed record that could make `url` a duplicate. Failed and
    /// skipped records are always retried; `force` ignores every record.
    async fn completed_record(&self, url: &str) -> Option<RunRecord> {
        if self.force {
            return None;
        }
        self.state.lookup(url).await.filter(RunRecord::is_completed)
    }

    /// Whether `record` still covers content with `content_hash`.
    fn is_current(&self, record: &RunRecord, content_hash: &str) -> bool {
        record.content_hash == content_hash || !self.config.reprocess_on_hash_change
    }

    async fn duplicate(&self, url: &str, stats: &StatsCollector) -> Outcome {
        info!("already archived, skipping");
        stats.incr(Counter::Skipped);
        if let Err(e) = self.state.record_duplicate().await {
            self.state_error(url, &e, stats);
        }
        Outcome::skipped(SkipReason::Duplicate)
    }

    /// Record a failure. A completed record for the URL is kept by the
    /// tracker, so a failed re-attempt never loses an archived document.
    async fn fail(
        &self,
        item: &SourceItem,
        stage: Stage,
        error: String,
        content_hash: &str,
        stats: &StatsCollector,
    ) -> Outcome {
        warn!(stage = %stage, error = %error, "item failed");
        stats.incr(Counter::Failed);
        match stage {
            Stage::Parse => stats.incr(Counter::ParseFailed),
            Stage::Archive => stats.incr(Counter::ArchiveFailed),
            Stage::Verify => stats.incr(Counter::VerifyFailed),
            _ => {}
        }
        self.write_record(
            &item.url,
            RunRecord::failed(record_title(item), content_hash, format!("{stage}: {error}")),
            stats,
        )
        .await;
        Outcome::Failed { stage, error }
    }

    async fn write_record(&self, url: &str, record: RunRecord, stats: &StatsCollector) {
        if let Err(e) = self.state.record(url, record).await {
            self.state_error(url, &e, stats);
        }
    }

    fn state_error(&self, url: &str, e: &DocPipeError, stats: &StatsCollector) {
        error!(url, stage = %Stage::Record, error = %e, "failed to persist state");
        stats.incr(Counter::StateErrors);
    }
}

async fn raw_file_gone(item: &SourceItem) -> bool {
    matches!(tokio::fs::try_exists(&item.raw_path).await, Ok(false))
}

/// Confirm the raw file exists and settle its content hash.
async fn acquire(item: &SourceItem) -> Result<String> {
    let metadata = tokio::fs::metadata(&item.raw_path)
        .await
        .map_err(|e| DocPipeError::io(&item.raw_path, e))?;
    if !metadata.is_file() {
        return Err(DocPipeError::validation(format!(
            "{} is not a regular file",
            item.raw_path.display()
        )));
    }
    if let Some(hash) = &item.content_hash {
        return Ok(hash.clone());
    }
    let path = item.raw_path.clone();
    tokio::task::spawn_blocking(move || sha256_file(&path))
        .await
        .map_err(|e| DocPipeError::Storage(format!("hashing task failed: {e}")))?
}

async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = BackendResult<T>>,
) -> BackendResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(BackendError::Timeout(limit)))
}

/// Remove local artifacts. Errors are logged and otherwise ignored.
async fn cleanup(item: &SourceItem, normalized: &Path) {
    let targets = [
        Some(item.raw_path.as_path()),
        Some(normalized),
        item.sidecar_path.as_deref(),
    ];
    for path in targets.into_iter().flatten() {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed local file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "cleanup failed"),
        }
    }
}

fn record_title(item: &SourceItem) -> String {
    item.context
        .title
        .clone()
        .unwrap_or_else(|| item.url.clone())
}
