//! Application configuration for docpipe.
//!
//! User config lives at `~/.docpipe/docpipe.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! The file is deserialized into [`AppConfig`] with enumerated values kept as
//! strings; [`PipelineConfig::try_from`] validates every one of them so a bad
//! value fails before any item is touched.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocPipeError, Result};
use crate::types::MergeStrategy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docpipe";

/// Default canonical filename template.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{date}_{org}_{title}.{ext}";

// ---------------------------------------------------------------------------
// Config structs (matching docpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub timeouts: TimeoutsSection,

    #[serde(default)]
    pub parser: ParserSection,

    #[serde(default)]
    pub archive: ArchiveSection,

    #[serde(default)]
    pub rag: RagSection,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Directory holding one state file per source.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Maximum number of items in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// `smart`, `parser_wins`, or `scraper_wins`.
    #[serde(default = "default_merge_strategy")]
    pub merge_strategy: String,

    /// Canonical filename template.
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Re-process a completed URL when its content hash changed.
    #[serde(default = "default_true")]
    pub reprocess_on_hash_change: bool,

    /// Keep raw and normalized files after successful archival.
    #[serde(default)]
    pub keep_local_files: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            max_concurrency: default_max_concurrency(),
            merge_strategy: default_merge_strategy(),
            filename_template: default_filename_template(),
            reprocess_on_hash_change: true,
            keep_local_files: false,
        }
    }
}

fn default_state_dir() -> String {
    "~/.docpipe/state".into()
}
fn default_max_concurrency() -> u32 {
    4
}
fn default_merge_strategy() -> String {
    MergeStrategy::Smart.as_str().into()
}
fn default_filename_template() -> String {
    DEFAULT_FILENAME_TEMPLATE.into()
}
fn default_true() -> bool {
    true
}

/// `[timeouts]` section. All values must be nonzero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_parse_secs")]
    pub parse_secs: u64,
    #[serde(default = "default_archive_secs")]
    pub archive_secs: u64,
    #[serde(default = "default_verify_secs")]
    pub verify_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub verify_poll_interval_ms: u64,
    #[serde(default = "default_rag_secs")]
    pub rag_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            parse_secs: default_parse_secs(),
            archive_secs: default_archive_secs(),
            verify_secs: default_verify_secs(),
            verify_poll_interval_ms: default_poll_interval_ms(),
            rag_secs: default_rag_secs(),
        }
    }
}

fn default_parse_secs() -> u64 {
    300
}
fn default_archive_secs() -> u64 {
    120
}
fn default_verify_secs() -> u64 {
    300
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_rag_secs() -> u64 {
    120
}

/// `[parser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserSection {
    #[serde(default = "default_parser_backend")]
    pub backend: String,
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            backend: default_parser_backend(),
        }
    }
}

fn default_parser_backend() -> String {
    ParserKind::Local.as_str().into()
}

/// `[archive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSection {
    #[serde(default = "default_archive_backend")]
    pub backend: String,
    /// Root directory for the `directory` backend.
    #[serde(default = "default_archive_root")]
    pub root: String,
    /// Tags attached to every archived document.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        Self {
            backend: default_archive_backend(),
            root: default_archive_root(),
            tags: Vec::new(),
        }
    }
}

fn default_archive_backend() -> String {
    ArchiveKind::Directory.as_str().into()
}
fn default_archive_root() -> String {
    "~/.docpipe/archive".into()
}

/// `[rag]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSection {
    #[serde(default = "default_rag_backend")]
    pub backend: String,
    /// Root directory for the `directory` backend.
    #[serde(default = "default_rag_root")]
    pub root: String,
    /// Collection (workspace) the documents are indexed into.
    #[serde(default = "default_collection_id")]
    pub collection_id: String,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            backend: default_rag_backend(),
            root: default_rag_root(),
            collection_id: default_collection_id(),
        }
    }
}

fn default_rag_backend() -> String {
    RagKind::Disabled.as_str().into()
}
fn default_rag_root() -> String {
    "~/.docpipe/rag".into()
}
fn default_collection_id() -> String {
    "default".into()
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

macro_rules! backend_kind {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            fn expected() -> &'static str {
                concat!($($value, " "),+)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DocPipeError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($value => Ok(Self::$variant),)+
                    other => Err(DocPipeError::config(format!(
                        "unknown {} backend '{other}': expected one of: {}",
                        $label,
                        Self::expected().trim_end()
                    ))),
                }
            }
        }
    };
}

backend_kind!(
    /// Parser backend selection.
    ParserKind, "parser" { Local => "local" }
);

backend_kind!(
    /// Archive backend selection.
    ArchiveKind, "archive" { Directory => "directory" }
);

backend_kind!(
    /// RAG backend selection. `disabled` skips the ingest stage.
    RagKind, "rag" { Disabled => "disabled", Directory => "directory" }
);

// ---------------------------------------------------------------------------
// Runtime config (validated)
// ---------------------------------------------------------------------------

/// Per-stage timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub parse: Duration,
    pub archive: Duration,
    pub verify: Duration,
    pub verify_poll_interval: Duration,
    pub rag: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutsSection::default())
    }
}

impl From<&TimeoutsSection> for Timeouts {
    fn from(t: &TimeoutsSection) -> Self {
        Self {
            parse: Duration::from_secs(t.parse_secs),
            archive: Duration::from_secs(t.archive_secs),
            verify: Duration::from_secs(t.verify_secs),
            verify_poll_interval: Duration::from_millis(t.verify_poll_interval_ms),
            rag: Duration::from_secs(t.rag_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub kind: ArchiveKind,
    pub root: PathBuf,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RagSettings {
    pub kind: RagKind,
    pub root: PathBuf,
    pub collection_id: String,
}

/// Runtime pipeline configuration, validated from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub state_dir: PathBuf,
    pub max_concurrency: usize,
    pub merge_strategy: MergeStrategy,
    pub filename_template: String,
    pub reprocess_on_hash_change: bool,
    pub keep_local_files: bool,
    pub timeouts: Timeouts,
    pub parser: ParserKind,
    pub archive: ArchiveSettings,
    pub rag: RagSettings,
}

impl TryFrom<&AppConfig> for PipelineConfig {
    type Error = DocPipeError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let p = &config.pipeline;

        if p.max_concurrency == 0 {
            return Err(DocPipeError::config("pipeline.max_concurrency must be at least 1"));
        }

        let t = &config.timeouts;
        let zero = [
            ("parse_secs", t.parse_secs),
            ("archive_secs", t.archive_secs),
            ("verify_secs", t.verify_secs),
            ("verify_poll_interval_ms", t.verify_poll_interval_ms),
            ("rag_secs", t.rag_secs),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0);
        if let Some((name, _)) = zero {
            return Err(DocPipeError::config(format!("timeouts.{name} must be nonzero")));
        }

        let rag_kind: RagKind = config.rag.backend.parse()?;
        if rag_kind != RagKind::Disabled && config.rag.collection_id.trim().is_empty() {
            return Err(DocPipeError::config("rag.collection_id must not be empty"));
        }

        Ok(Self {
            state_dir: expand_home(&p.state_dir)?,
            max_concurrency: p.max_concurrency as usize,
            merge_strategy: p.merge_strategy.parse()?,
            filename_template: p.filename_template.clone(),
            reprocess_on_hash_change: p.reprocess_on_hash_change,
            keep_local_files: p.keep_local_files,
            timeouts: Timeouts::from(t),
            parser: config.parser.backend.parse()?,
            archive: ArchiveSettings {
                kind: config.archive.backend.parse()?,
                root: expand_home(&config.archive.root)?,
                tags: config.archive.tags.clone(),
            },
            rag: RagSettings {
                kind: rag_kind,
                root: expand_home(&config.rag.root)?,
                collection_id: config.rag.collection_id.clone(),
            },
        })
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| DocPipeError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None if path == "~" => {
            dirs::home_dir().ok_or_else(|| DocPipeError::config("could not determine home directory"))
        }
        None => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocPipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docpipe/docpipe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocPipeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocPipeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocPipeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| DocPipeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocPipeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
