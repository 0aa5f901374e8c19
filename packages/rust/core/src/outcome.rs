//! Per-item results of a pipeline run.

use serde::Serialize;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Dedup,
    Parse,
    Merge,
    Name,
    Archive,
    Verify,
    Rag,
    Cleanup,
    Record,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Dedup => "dedup",
            Self::Parse => "parse",
            Self::Merge => "merge",
            Self::Name => "name",
            Self::Archive => "archive",
            Self::Verify => "verify",
            Self::Rag => "rag",
            Self::Cleanup => "cleanup",
            Self::Record => "record",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item was not processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Already archived with the same content.
    Duplicate,
    /// Another task in this process holds the URL.
    InProgress,
    /// The parser does not accept this extension.
    UnsupportedFormat(String),
    /// The run was cancelled before the item was admitted.
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate => f.write_str("duplicate"),
            Self::InProgress => f.write_str("in progress"),
            Self::UnsupportedFormat(ext) => write!(f, "unsupported format: {ext}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal result of processing one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Completed {
        document_id: String,
        canonical_name: String,
        rag_indexed: bool,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        stage: Stage,
        error: String,
    },
}

impl Outcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short label for progress output.
    pub fn label(&self) -> String {
        match self {
            Self::Completed { canonical_name, .. } => format!("completed {canonical_name}"),
            Self::Skipped { reason } => format!("skipped ({reason})"),
            Self::Failed { stage, error } => format!("failed at {stage}: {error}"),
        }
    }
}
