//! Metadata merging and canonical naming.
//!
//! - [`merge`] reconciles scraper context with parser-extracted content
//! - [`FilenameTemplate`] renders a deterministic, filesystem-safe filename
//!
//! Both are pure: the same inputs always produce the same output, which the
//! dedup check relies on across runs.

mod merge;
mod naming;

pub use merge::{
    DEFAULT_ORGANIZATION, DEFAULT_PUBLICATION_DATE, DEFAULT_TITLE, merge, value_as_text,
};
pub use naming::{FilenameTemplate, MAX_FILENAME_LEN, MAX_TOKEN_LEN, is_safe_char, sanitize_token};
