//! Core domain types shared across the pipeline crates.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{DocPipeError, Result};

/// Open-ended metadata mapping. Ordered so that serialization and merging
/// are deterministic.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Canonical metadata keys. Every [`MergedMetadata`] carries all four.
pub const KEY_URL: &str = "url";
pub const KEY_TITLE: &str = "title";
pub const KEY_ORGANIZATION: &str = "organization";
pub const KEY_PUBLICATION_DATE: &str = "publication_date";

/// The required key set, in display order.
pub const REQUIRED_KEYS: [&str; 4] = [KEY_URL, KEY_TITLE, KEY_ORGANIZATION, KEY_PUBLICATION_DATE];

// ---------------------------------------------------------------------------
// SourceItem
// ---------------------------------------------------------------------------

/// Scraper-observed context for a discovered document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    /// Title hint from the listing page or link text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Publishing organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Publication date as observed by the scraper (usually `YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
    /// Any other scraper-specific fields.
    #[serde(flatten)]
    pub extra: Metadata,
}

/// One discovered document, as handed over by a scraper.
///
/// Identity is the source URL. The pipeline never mutates an item; stages
/// derive new values from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Origin URL (stable, unique key).
    pub url: String,
    /// Local path of the downloaded raw file.
    #[serde(rename = "file_path")]
    pub raw_path: PathBuf,
    /// SHA-256 of the raw file, if the scraper already computed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Optional side-car metadata file written by the scraper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_path: Option<PathBuf>,
    /// Context metadata observed while scraping.
    #[serde(flatten)]
    pub context: ContextMetadata,
}

impl SourceItem {
    /// Create an item with no context metadata.
    pub fn new(url: impl Into<String>, raw_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            raw_path: raw_path.into(),
            content_hash: None,
            sidecar_path: None,
            context: ContextMetadata::default(),
        }
    }

    /// Check the item is well-formed: an absolute http(s) URL and a file path.
    pub fn validate(&self) -> Result<()> {
        let parsed = Url::parse(&self.url)
            .map_err(|e| DocPipeError::validation(format!("invalid url '{}': {e}", self.url)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(DocPipeError::validation(format!(
                "unsupported url scheme '{}' for {}",
                parsed.scheme(),
                self.url
            )));
        }
        if self.raw_path.as_os_str().is_empty() {
            return Err(DocPipeError::validation(format!(
                "item {} has an empty file_path",
                self.url
            )));
        }
        Ok(())
    }

    /// Flatten the context metadata into a mapping, including the URL.
    pub fn context_mapping(&self) -> Metadata {
        let mut map = self.context.extra.clone();
        map.insert(KEY_URL.into(), self.url.clone().into());
        let fields = [
            (KEY_TITLE, &self.context.title),
            (KEY_ORGANIZATION, &self.context.organization),
            (KEY_PUBLICATION_DATE, &self.context.publication_date),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                map.insert(key.into(), v.clone().into());
            }
        }
        map
    }

    /// Lowercased extension of the raw file, without the dot.
    pub fn extension(&self) -> Option<String> {
        self.raw_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// Load a scraper item manifest (a JSON array of items).
    pub fn load_manifest(path: &Path) -> Result<Vec<SourceItem>> {
        let content = std::fs::read_to_string(path).map_err(|e| DocPipeError::io(path, e))?;
        let items: Vec<SourceItem> = serde_json::from_str(&content).map_err(|e| {
            DocPipeError::validation(format!("invalid item manifest {}: {e}", path.display()))
        })?;
        for item in &items {
            item.validate()?;
        }
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Merge strategy & merged metadata
// ---------------------------------------------------------------------------

/// How scraper context and parser content are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Context for provenance fields, content for descriptive fields.
    #[default]
    Smart,
    /// Every content field overwrites the matching context field.
    ParserWins,
    /// Context is authoritative; content only fills gaps.
    ScraperWins,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smart => "smart",
            Self::ParserWins => "parser_wins",
            Self::ScraperWins => "scraper_wins",
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = DocPipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "smart" => Ok(Self::Smart),
            "parser_wins" => Ok(Self::ParserWins),
            "scraper_wins" => Ok(Self::ScraperWins),
            other => Err(DocPipeError::config(format!(
                "unknown merge strategy '{other}': expected smart, parser_wins, or scraper_wins"
            ))),
        }
    }
}

/// Canonical metadata record produced by the merger.
///
/// The four required fields are always populated; everything else lives in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedMetadata {
    pub url: String,
    pub title: String,
    pub organization: String,
    pub publication_date: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub extra: Metadata,
}

impl MergedMetadata {
    /// Flatten back into a single mapping (required keys plus extras).
    pub fn to_mapping(&self) -> Metadata {
        let mut map = self.extra.clone();
        map.insert(KEY_URL.into(), self.url.clone().into());
        map.insert(KEY_TITLE.into(), self.title.clone().into());
        map.insert(KEY_ORGANIZATION.into(), self.organization.clone().into());
        map.insert(
            KEY_PUBLICATION_DATE.into(),
            self.publication_date.clone().into(),
        );
        map
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Stream a file through SHA-256 and return the lowercase hex digest.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| DocPipeError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| DocPipeError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
