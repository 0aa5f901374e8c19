//! Shared types, error model, and configuration for docpipe.
//!
//! This crate is the foundation depended on by all other docpipe crates.
//! It provides:
//! - [`DocPipeError`]: the unified error type
//! - Domain types ([`SourceItem`], [`MergedMetadata`], [`MergeStrategy`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)
//! - Crash-safe file writes ([`write_atomic`], [`copy_atomic`])

pub mod atomic;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArchiveKind, ArchiveSettings, DEFAULT_FILENAME_TEMPLATE, ParserKind,
    PipelineConfig, RagKind, RagSettings, Timeouts, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from,
};
pub use atomic::{copy_atomic, temp_path_for, write_atomic};
pub use error::{DocPipeError, Result};
pub use types::{
    ContextMetadata, KEY_ORGANIZATION, KEY_PUBLICATION_DATE, KEY_TITLE, KEY_URL, MergeStrategy,
    MergedMetadata, Metadata, REQUIRED_KEYS, SourceItem, sha256_file,
};
