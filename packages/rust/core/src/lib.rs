//! Pipeline orchestration for docpipe.
//!
//! [`Pipeline`] takes scraped items through parsing, metadata merge,
//! canonical naming, archival with verification, optional RAG ingestion,
//! and state recording.

mod outcome;
pub mod pipeline;
mod stats;
pub mod verify;

#[cfg(test)]
mod testing;

pub use outcome::{Outcome, SkipReason, Stage};
pub use pipeline::{ItemReport, Pipeline, ProgressReporter, RunReport, SilentProgress};
pub use stats::PipelineRunStats;
pub use verify::{VerifyOutcome, VerifyPolicy, verify};
