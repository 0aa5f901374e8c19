//! Persisted state layout.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome recorded for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Completed,
    Failed,
    Skipped,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One URL's last terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub title: String,
    pub processed_at: DateTime<Utc>,
    /// SHA-256 of the raw file that was processed.
    #[serde(rename = "file_hash")]
    pub content_hash: String,
    pub status: RecordStatus,
    /// Archive document id, for completed records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Failure or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RunRecord {
    pub fn completed(
        title: impl Into<String>,
        content_hash: impl Into<String>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            processed_at: Utc::now(),
            content_hash: content_hash.into(),
            status: RecordStatus::Completed,
            document_id: Some(document_id.into()),
            detail: None,
        }
    }

    pub fn failed(
        title: impl Into<String>,
        content_hash: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            processed_at: Utc::now(),
            content_hash: content_hash.into(),
            status: RecordStatus::Failed,
            document_id: None,
            detail: Some(error.into()),
        }
    }

    pub fn skipped(
        title: impl Into<String>,
        content_hash: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            processed_at: Utc::now(),
            content_hash: content_hash.into(),
            status: RecordStatus::Skipped,
            document_id: None,
            detail: Some(reason.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }
}

/// Cumulative counters across all runs of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_processed: u64,
    /// Raw files acquired, whatever their outcome.
    pub total_downloaded: u64,
    pub total_skipped: u64,
    pub total_failed: u64,
}

/// The whole per-source state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub scraper_name: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub processed_urls: BTreeMap<String, RunRecord>,
    #[serde(default)]
    pub statistics: Statistics,
}

impl StateFile {
    pub fn new(scraper_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            scraper_name: scraper_name.into(),
            created_at: now,
            last_updated: now,
            processed_urls: BTreeMap::new(),
            statistics: Statistics::default(),
        }
    }

    /// Store the record for `url` and bump the matching counter.
    ///
    /// A completed record is only ever replaced by another completed one; a
    /// later failure or skip for the same URL is counted but the archived
    /// record stays. Returns whether `record` was stored.
    pub(crate) fn apply(&mut self, url: &str, record: RunRecord) -> bool {
        let stats = &mut self.statistics;
        match record.status {
            RecordStatus::Completed => stats.total_processed += 1,
            RecordStatus::Failed => stats.total_failed += 1,
            RecordStatus::Skipped => stats.total_skipped += 1,
        }
        self.last_updated = Utc::now();

        let keeps_completed = !record.is_completed()
            && self
                .processed_urls
                .get(url)
                .is_some_and(RunRecord::is_completed);
        if keeps_completed {
            return false;
        }
        self.processed_urls.insert(url.to_string(), record);
        true
    }
}
