//! Run counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Counters for one pipeline run.
///
/// Stage counters track how far items got; category counters break down
/// skips and failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineRunStats {
    pub scraped: u64,
    pub downloaded: u64,
    pub parsed: u64,
    pub archived: u64,
    pub verified: u64,
    pub rag_indexed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub parse_failed: u64,
    pub archive_failed: u64,
    pub verify_failed: u64,
    pub rag_failed: u64,
    pub state_errors: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Counter {
    Scraped,
    Downloaded,
    Parsed,
    Archived,
    Verified,
    RagIndexed,
    Failed,
    Skipped,
    ParseFailed,
    ArchiveFailed,
    VerifyFailed,
    RagFailed,
    StateErrors,
}

/// Lock-free collector shared by concurrent workers.
#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    scraped: AtomicU64,
    downloaded: AtomicU64,
    parsed: AtomicU64,
    archived: AtomicU64,
    verified: AtomicU64,
    rag_indexed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    parse_failed: AtomicU64,
    archive_failed: AtomicU64,
    verify_failed: AtomicU64,
    rag_failed: AtomicU64,
    state_errors: AtomicU64,
}

impl StatsCollector {
    fn slot(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Scraped => &self.scraped,
            Counter::Downloaded => &self.downloaded,
            Counter::Parsed => &self.parsed,
            Counter::Archived => &self.archived,
            Counter::Verified => &self.verified,
            Counter::RagIndexed => &self.rag_indexed,
            Counter::Failed => &self.failed,
            Counter::Skipped => &self.skipped,
            Counter::ParseFailed => &self.parse_failed,
            Counter::ArchiveFailed => &self.archive_failed,
            Counter::VerifyFailed => &self.verify_failed,
            Counter::RagFailed => &self.rag_failed,
            Counter::StateErrors => &self.state_errors,
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.slot(counter).fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, elapsed: Duration) -> PipelineRunStats {
        let get = |c| self.slot(c).load(Ordering::Relaxed);
        PipelineRunStats {
            scraped: get(Counter::Scraped),
            downloaded: get(Counter::Downloaded),
            parsed: get(Counter::Parsed),
            archived: get(Counter::Archived),
            verified: get(Counter::Verified),
            rag_indexed: get(Counter::RagIndexed),
            failed: get(Counter::Failed),
            skipped: get(Counter::Skipped),
            parse_failed: get(Counter::ParseFailed),
            archive_failed: get(Counter::ArchiveFailed),
            verify_failed: get(Counter::VerifyFailed),
            rag_failed: get(Counter::RagFailed),
            state_errors: get(Counter::StateErrors),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = StatsCollector::default();
        stats.incr(Counter::Scraped);
        stats.incr(Counter::Scraped);
        stats.incr(Counter::RagFailed);

        let snap = stats.snapshot(Duration::from_millis(5));
        assert_eq!(snap.scraped, 2);
        assert_eq!(snap.rag_failed, 1);
        assert_eq!(snap.verified, 0);
        assert_eq!(snap.elapsed, Duration::from_millis(5));
    }
}
