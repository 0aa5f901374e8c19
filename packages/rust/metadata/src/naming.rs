//! Canonical filename rendering.
//!
//! A [`FilenameTemplate`] is parsed once at startup, so unknown variables and
//! unsafe literals are configuration errors rather than per-document ones.
//! Rendering only emits characters from [`is_safe_char`].
//!
//! Supported variables:
//!
//! | variable          | value                                         |
//! |-------------------|-----------------------------------------------|
//! | `{year}`          | 4-digit publication year (`0000` if unknown)  |
//! | `{month}`         | 2-digit publication month (`00` if unknown)   |
//! | `{date}`          | `YYYY-MM` (`YYYY` or `undated` when partial)  |
//! | `{org}`           | organization, sanitized and uppercased        |
//! | `{title}`         | title, sanitized, capped at 80 characters     |
//! | `{original_name}` | raw file stem, sanitized                      |
//! | `{ext}`           | lowercased raw file extension (`bin` if none) |

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate};
use regex::Regex;

use docpipe_shared::{DocPipeError, MergedMetadata, Result};

/// Maximum length of a rendered filename, extension included.
pub const MAX_FILENAME_LEN: usize = 200;
/// Maximum length of the title and original-name tokens.
pub const MAX_TOKEN_LEN: usize = 80;
/// Stem used when everything else sanitizes away.
const FALLBACK_STEM: &str = "document";
const MAX_EXT_LEN: usize = 10;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(?:-(\d{1,2}))?$").unwrap());

/// Date formats tried in order before falling back to `YYYY[-MM]`.
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d %B %Y", "%B %d, %Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    Year,
    Month,
    Date,
    Org,
    Title,
    OriginalName,
    Ext,
}

impl Variable {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "year" => Self::Year,
            "month" => Self::Month,
            "date" => Self::Date,
            "org" => Self::Org,
            "title" => Self::Title,
            "original_name" => Self::OriginalName,
            "ext" => Self::Ext,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(Variable),
}

/// A validated filename template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl FilenameTemplate {
    /// Parse and validate a template such as `{date}_{org}_{title}.{ext}`.
    pub fn parse(template: &str) -> Result<Self> {
        if template.trim().is_empty() {
            return Err(DocPipeError::config("filename template must not be empty"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(DocPipeError::config(format!(
                            "unclosed '{{' in filename template '{template}'"
                        )));
                    }
                    let var = Variable::lookup(name.trim()).ok_or_else(|| {
                        DocPipeError::config(format!(
                            "unknown filename template variable '{{{name}}}'"
                        ))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Var(var));
                }
                '}' => {
                    return Err(DocPipeError::config(format!(
                        "unmatched '}}' in filename template '{template}'"
                    )));
                }
                c if is_safe_char(c) => literal.push(c),
                c => {
                    return Err(DocPipeError::config(format!(
                        "character {c:?} is not allowed in filename template '{template}'"
                    )));
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// The template as written in the config.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render the canonical filename for `metadata`.
    ///
    /// `original` is the raw file path; it supplies `{original_name}` and `{ext}`.
    pub fn render(&self, metadata: &MergedMetadata, original: &Path) -> String {
        let date = PublicationDate::parse(&metadata.publication_date);
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(Variable::Year) => out.push_str(&date.year()),
                Segment::Var(Variable::Month) => out.push_str(&date.month()),
                Segment::Var(Variable::Date) => out.push_str(&date.prefix()),
                Segment::Var(Variable::Org) => {
                    out.push_str(&sanitize_token(&metadata.organization).to_ascii_uppercase())
                }
                Segment::Var(Variable::Title) => {
                    out.push_str(&cap(&sanitize_token(&metadata.title), MAX_TOKEN_LEN))
                }
                Segment::Var(Variable::OriginalName) => {
                    let stem = original
                        .file_stem()
                        .map(|s| s.to_string_lossy())
                        .unwrap_or_default();
                    out.push_str(&cap(&sanitize_token(&stem), MAX_TOKEN_LEN));
                }
                Segment::Var(Variable::Ext) => out.push_str(&extension_of(original)),
            }
        }

        finish(&out)
    }
}

impl std::fmt::Display for FilenameTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

// ---------------------------------------------------------------------------
// Date handling
// ---------------------------------------------------------------------------

/// Year and optional month parsed from a free-form publication date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PublicationDate {
    year: Option<i32>,
    month: Option<u32>,
}

impl PublicationDate {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Self::full(dt.year(), dt.month());
        }
        for format in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
                return Self::full(d.year(), d.month());
            }
        }
        if let Some(caps) = YEAR_MONTH.captures(raw) {
            let year = caps[1].parse().ok();
            let month = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .filter(|m| (1..=12).contains(m));
            return Self { year, month };
        }
        if !raw.is_empty() {
            tracing::debug!(date = raw, "unrecognized publication date, rendering as undated");
        }
        Self {
            year: None,
            month: None,
        }
    }

    fn full(year: i32, month: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
        }
    }

    fn year(&self) -> String {
        self.year
            .map(|y| format!("{y:04}"))
            .unwrap_or_else(|| "0000".into())
    }

    fn month(&self) -> String {
        self.month
            .map(|m| format!("{m:02}"))
            .unwrap_or_else(|| "00".into())
    }

    fn prefix(&self) -> String {
        match (self.year, self.month) {
            (Some(y), Some(m)) => format!("{y:04}-{m:02}"),
            (Some(y), None) => format!("{y:04}"),
            _ => "undated".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sanitization
// ---------------------------------------------------------------------------

/// Characters allowed in rendered filenames.
pub fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

/// Make a free-text value safe for use inside a filename.
///
/// Whitespace runs become `_`, path separators become `-`, dots become `_`
/// (they would otherwise read as an extension), anything else unsafe is dropped.
pub fn sanitize_token(input: &str) -> String {
    let spaced = WHITESPACE.replace_all(input.trim(), "_");
    let mapped: String = spaced
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' | ':' => Some('-'),
            '.' => Some('_'),
            c if is_safe_char(c) => Some(c),
            _ => None,
        })
        .collect();
    collapse_separators(&mapped)
        .trim_matches(is_separator)
        .to_string()
}

/// Collapse runs of separators to one; a `.` in a run wins so the extension survives.
fn collapse_separators(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match out.chars().last() {
            Some(prev) if is_separator(prev) && is_separator(c) => {
                if c == '.' {
                    out.pop();
                    out.push('.');
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn cap(token: &str, max: usize) -> String {
    // Tokens are ASCII after sanitization, so byte slicing is char-safe.
    if token.len() <= max {
        token.to_string()
    } else {
        token[..max].trim_end_matches(is_separator).to_string()
    }
}

fn extension_of(path: &Path) -> String {
    let ext: String = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXT_LEN)
        .collect();
    if ext.is_empty() { "bin".into() } else { ext }
}

/// Final pass over the assembled name: collapse, trim, cap, and ensure a stem.
fn finish(raw: &str) -> String {
    let collapsed = collapse_separators(raw);
    let (stem, ext) = match collapsed.rsplit_once('.') {
        Some((stem, ext)) => {
            let ext = ext.trim_matches(is_separator);
            if ext.is_empty() || ext.len() > MAX_EXT_LEN {
                (collapsed.as_str(), None)
            } else {
                (stem, Some(ext))
            }
        }
        None => (collapsed.as_str(), None),
    };

    let budget = match ext {
        Some(ext) => MAX_FILENAME_LEN - ext.len() - 1,
        None => MAX_FILENAME_LEN,
    };
    let mut stem = cap(stem.trim_matches(is_separator), budget);
    if stem.is_empty() {
        stem = FALLBACK_STEM.to_string();
    }

    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}
