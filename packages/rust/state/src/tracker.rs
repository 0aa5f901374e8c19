//! Crash-safe, concurrency-safe state tracker.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use docpipe_shared::{DocPipeError, Result, temp_path_for, write_atomic};

use crate::record::{RunRecord, StateFile};
use crate::source_file;

/// Tracks terminal outcomes for one source.
///
/// Reads run concurrently; every mutation takes the write lock and persists
/// the full file before releasing it, so writes never interleave.
#[derive(Debug)]
pub struct StateTracker {
    source: String,
    path: PathBuf,
    state: RwLock<StateFile>,
    claims: Arc<Mutex<HashSet<String>>>,
}

/// In-process exclusive claim on a URL. Released on drop.
#[derive(Debug)]
pub struct Claim {
    url: String,
    claims: Arc<Mutex<HashSet<String>>>,
}

impl Claim {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.remove(&self.url);
    }
}

impl StateTracker {
    /// Load `<state_dir>/<source>.json`, or start empty if it does not exist.
    ///
    /// A leftover temporary file from an interrupted flush is discarded. A
    /// canonical file that fails to parse is a storage error.
    #[instrument(skip_all, fields(source = %source))]
    pub async fn load(state_dir: &Path, source: &str) -> Result<Self> {
        let path = source_file(state_dir, source, "json")?;

        let stale = temp_path_for(&path);
        if stale.exists() {
            warn!(path = %stale.display(), "discarding interrupted state write");
            let _ = tokio::fs::remove_file(&stale).await;
        }

        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<StateFile>(&content).map_err(|e| {
                DocPipeError::Storage(format!("corrupt state file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateFile::new(source),
            Err(e) => return Err(DocPipeError::io(&path, e)),
        };

        debug!(records = state.processed_urls.len(), "state loaded");

        Ok(Self {
            source: source.to_string(),
            path,
            state: RwLock::new(state),
            claims: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `url` has a completed record.
    pub async fn has_processed(&self, url: &str) -> bool {
        self.state
            .read()
            .await
            .processed_urls
            .get(url)
            .is_some_and(RunRecord::is_completed)
    }

    pub async fn lookup(&self, url: &str) -> Option<RunRecord> {
        self.state.read().await.processed_urls.get(url).cloned()
    }

    /// Store the terminal outcome for `url` and persist.
    ///
    /// A failed or skipped outcome for a URL that already has a completed
    /// record is counted without replacing it. If persisting fails the
    /// in-memory record is kept and the file on disk still holds the
    /// previous state.
    pub async fn record(&self, url: &str, record: RunRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.apply(url, record) {
            debug!(url, "keeping completed record");
        }
        self.persist(&state).await
    }

    /// Count a duplicate skip. Duplicates leave the existing record untouched.
    pub async fn record_duplicate(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.statistics.total_skipped += 1;
        state.last_updated = chrono::Utc::now();
        self.persist(&state).await
    }

    /// Count an acquired raw file. Persisted with the next mutation, which
    /// is always the item's terminal record.
    pub async fn record_download(&self) {
        self.state.write().await.statistics.total_downloaded += 1;
    }

    /// Drop the record for `url` so the next run processes it again.
    pub async fn forget(&self, url: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let removed = state.processed_urls.remove(url).is_some();
        if removed {
            state.last_updated = chrono::Utc::now();
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    /// Persist the current state.
    pub async fn flush(&self) -> Result<()> {
        let state = self.state.write().await;
        self.persist(&state).await
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> StateFile {
        self.state.read().await.clone()
    }

    /// Claim `url` for this process. `None` if another task holds it.
    pub fn try_claim(&self, url: &str) -> Option<Claim> {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.insert(url.to_string()).then(|| Claim {
            url: url.to_string(),
            claims: Arc::clone(&self.claims),
        })
    }

    /// Write `state` off the async workers. Callers hold the write lock
    /// across the await so flushes land in mutation order.
    async fn persist(&self, state: &StateFile) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| DocPipeError::Storage(format!("state write task failed: {e}")))?
            .map_err(|e| DocPipeError::Storage(format!("cannot write state file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordStatus, Statistics};

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
        assert!(!tracker.has_processed("https://x/a").await);
        assert_eq!(tracker.path(), dir.path().join("aemo.json"));
        assert!(!tracker.path().exists());
    }

    #[tokio::test]
    async fn records_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
            tracker
                .record("https://x/a", RunRecord::completed("A", "h1", "id-a"))
                .await
                .unwrap();
            tracker
                .record("https://x/b", RunRecord::failed("B", "h2", "timeout"))
                .await
                .unwrap();
        }

        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
        assert!(tracker.has_processed("https://x/a").await);
        assert!(!tracker.has_processed("https://x/b").await);
        assert_eq!(
            tracker.lookup("https://x/b").await.map(|r| r.status),
            Some(RecordStatus::Failed)
        );
        assert_eq!(tracker.snapshot().await.scraper_name, "aemo");
    }

    #[tokio::test]
    async fn partial_temp_write_leaves_prior_state_valid() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
        tracker
            .record("https://x/a", RunRecord::completed("A", "h1", "id-a"))
            .await
            .unwrap();
        drop(tracker);

        // Simulate a crash halfway through the next flush.
        let temp = temp_path_for(&dir.path().join("aemo.json"));
        std::fs::write(&temp, br#"{"scraper_name": "aemo", "processed_"#).unwrap();

        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
        assert!(tracker.has_processed("https://x/a").await);
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn failed_flush_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
        tracker
            .record("https://x/a", RunRecord::completed("A", "h1", "id-a"))
            .await
            .unwrap();
        let before = std::fs::read_to_string(tracker.path()).unwrap();

        // A directory in the temp file's place makes the write fail.
        std::fs::create_dir(temp_path_for(tracker.path())).unwrap();
        let err = tracker
            .record("https://x/b", RunRecord::completed("B", "h2", "id-b"))
            .await
            .unwrap_err();

        assert!(matches!(err, DocPipeError::Storage(_)));
        assert_eq!(std::fs::read_to_string(tracker.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn corrupt_state_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("aemo.json"), b"{ not json").unwrap();
        let err = StateTracker::load(dir.path(), "aemo").await.unwrap_err();
        assert!(matches!(err, DocPipeError::Storage(_)));
        assert_eq!(
            std::fs::read(dir.path().join("aemo.json")).unwrap(),
            b"{ not json"
        );
    }

    #[tokio::test]
    async fn duplicates_only_bump_skip_counter() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
        tracker
            .record("https://x/a", RunRecord::completed("A", "h1", "id-a"))
            .await
            .unwrap();
        tracker.record_duplicate().await.unwrap();

        let state = tracker.snapshot().await;
        assert_eq!(state.processed_urls.len(), 1);
        assert_eq!(
            state.statistics,
            Statistics {
                total_processed: 1,
                total_downloaded: 0,
                total_skipped: 1,
                total_failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn downloads_persist_with_the_terminal_record() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
        tracker.record_download().await;
        tracker
            .record("https://x/a", RunRecord::failed("A", "h1", "parse: corrupt"))
            .await
            .unwrap();

        let reloaded = StateTracker::load(dir.path(), "aemo").await.unwrap();
        let stats = reloaded.snapshot().await.statistics;
        assert_eq!((stats.total_downloaded, stats.total_failed), (1, 1));
    }

    #[tokio::test]
    async fn failure_after_completion_keeps_archived_record_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
        tracker
            .record("https://x/a", RunRecord::completed("A", "h1", "id-a"))
            .await
            .unwrap();
        tracker
            .record("https://x/a", RunRecord::failed("A", "h1", "download: gone"))
            .await
            .unwrap();

        let reloaded = StateTracker::load(dir.path(), "aemo").await.unwrap();
        let record = reloaded.lookup("https://x/a").await.unwrap();
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.document_id.as_deref(), Some("id-a"));
        assert_eq!(reloaded.snapshot().await.statistics.total_failed, 1);
    }

    #[tokio::test]
    async fn forget_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();
        tracker
            .record("https://x/a", RunRecord::completed("A", "h1", "id-a"))
            .await
            .unwrap();

        assert!(tracker.forget("https://x/a").await.unwrap());
        assert!(!tracker.forget("https://x/a").await.unwrap());

        let reloaded = StateTracker::load(dir.path(), "aemo").await.unwrap();
        assert!(reloaded.lookup("https://x/a").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_records_are_all_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(StateTracker::load(dir.path(), "aemo").await.unwrap());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    tracker
                        .record(&format!("https://x/{i}"), RunRecord::completed("T", "h", "id"))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reloaded = StateTracker::load(dir.path(), "aemo").await.unwrap();
        assert_eq!(reloaded.snapshot().await.processed_urls.len(), 16);
    }

    #[tokio::test]
    async fn claims_are_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StateTracker::load(dir.path(), "aemo").await.unwrap();

        let claim = tracker.try_claim("https://x/a").expect("first claim");
        assert_eq!(claim.url(), "https://x/a");
        assert!(tracker.try_claim("https://x/a").is_none());
        assert!(tracker.try_claim("https://x/b").is_some());

        drop(claim);
        assert!(tracker.try_claim("https://x/a").is_some());
    }
}
