//! Archive verification polling.
//!
//! An accepted upload is not final until the archive confirms it. The loop
//! owns one deadline for the whole verification; each status query is
//! bounded by whatever time remains.

use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, instrument, warn};

use docpipe_backends::{ArchiveBackend, ArchiveReceipt, VerificationStatus};
use docpipe_shared::Timeouts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    /// Total time allowed for verification.
    pub timeout: Duration,
    /// Delay between status queries.
    pub poll_interval: Duration,
}

impl From<&Timeouts> for VerifyPolicy {
    fn from(t: &Timeouts) -> Self {
        Self {
            timeout: t.verify,
            poll_interval: t.verify_poll_interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified { polls: u32 },
    Rejected { polls: u32, reason: String },
    TimedOut { polls: u32 },
}

impl VerifyOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    pub fn polls(&self) -> u32 {
        match self {
            Self::Verified { polls } | Self::Rejected { polls, .. } | Self::TimedOut { polls } => {
                *polls
            }
        }
    }
}

impl std::fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verified { polls } => write!(f, "verified after {polls} polls"),
            Self::Rejected { polls, reason } => {
                write!(f, "archive rejected document after {polls} polls: {reason}")
            }
            Self::TimedOut { polls } => {
                write!(f, "verification timed out after {polls} polls")
            }
        }
    }
}

/// Poll `archive` until the upload behind `receipt` is confirmed, rejected,
/// or the policy deadline passes.
///
/// Query errors are treated as transient and polling continues.
#[instrument(skip_all, fields(document_id = %receipt.document_id))]
pub async fn verify(
    archive: &dyn ArchiveBackend,
    receipt: &ArchiveReceipt,
    policy: VerifyPolicy,
) -> VerifyOutcome {
    let deadline = Instant::now() + policy.timeout;
    let mut polls = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return VerifyOutcome::TimedOut { polls };
        }

        polls += 1;
        match timeout(remaining, archive.verification_status(&receipt.verification_handle)).await {
            Ok(Ok(VerificationStatus::Succeeded)) => {
                debug!(polls, "archive confirmed document");
                return VerifyOutcome::Verified { polls };
            }
            Ok(Ok(VerificationStatus::Failed(reason))) => {
                return VerifyOutcome::Rejected { polls, reason };
            }
            Ok(Ok(VerificationStatus::Pending)) => debug!(polls, "verification pending"),
            Ok(Err(e)) => warn!(polls, error = %e, "verification query failed, retrying"),
            Err(_) => return VerifyOutcome::TimedOut { polls },
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return VerifyOutcome::TimedOut { polls };
        }
        sleep(policy.poll_interval.min(remaining)).await;
    }
}
