//! Reconciles scraper context with parser-extracted content.
//!
//! Merging is a pure function of `(context, content, strategy)`; both inputs
//! are ordered maps, so identical inputs always yield identical output.

use serde_json::Value;

use docpipe_shared::{
    KEY_ORGANIZATION, KEY_PUBLICATION_DATE, KEY_TITLE, KEY_URL, MergeStrategy, MergedMetadata,
    Metadata, REQUIRED_KEYS,
};

/// Title used when neither side supplies one.
pub const DEFAULT_TITLE: &str = "Untitled";
/// Organization used when neither side supplies one.
pub const DEFAULT_ORGANIZATION: &str = "Unknown";
/// Publication date used when neither side supplies one.
pub const DEFAULT_PUBLICATION_DATE: &str = "unknown";

/// Merge context and content metadata according to `strategy`.
pub fn merge(context: &Metadata, content: &Metadata, strategy: MergeStrategy) -> MergedMetadata {
    match strategy {
        MergeStrategy::Smart => merge_smart(context, content),
        MergeStrategy::ParserWins => split_required(&overlay(context, content)),
        MergeStrategy::ScraperWins => split_required(&overlay(content, context)),
    }
}

/// Provenance fields from context, descriptive fields from content.
fn merge_smart(context: &Metadata, content: &Metadata) -> MergedMetadata {
    let url = first_text(KEY_URL, [context, content]);
    let organization = first_text(KEY_ORGANIZATION, [context, content]);
    let publication_date = first_text(KEY_PUBLICATION_DATE, [context, content]);
    let title = first_text(KEY_TITLE, [content, context]);

    // Content is chained last so its secondary fields (author etc.) win.
    let extra = context
        .iter()
        .chain(content.iter())
        .filter(|(key, value)| !is_required(key) && is_present(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    finish(url, title, organization, publication_date, extra)
}

/// `top` overwrites `base` key by key; absent values never overwrite.
fn overlay(base: &Metadata, top: &Metadata) -> Metadata {
    base.iter()
        .chain(top.iter())
        .filter(|(_, value)| is_present(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn split_required(combined: &Metadata) -> MergedMetadata {
    let extra = combined
        .iter()
        .filter(|(key, _)| !is_required(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    finish(
        first_text(KEY_URL, [combined]),
        first_text(KEY_TITLE, [combined]),
        first_text(KEY_ORGANIZATION, [combined]),
        first_text(KEY_PUBLICATION_DATE, [combined]),
        extra,
    )
}

fn finish(
    url: Option<String>,
    title: Option<String>,
    organization: Option<String>,
    publication_date: Option<String>,
    extra: Metadata,
) -> MergedMetadata {
    MergedMetadata {
        url: url.unwrap_or_default(),
        title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        organization: organization.unwrap_or_else(|| DEFAULT_ORGANIZATION.to_string()),
        publication_date: publication_date
            .unwrap_or_else(|| DEFAULT_PUBLICATION_DATE.to_string()),
        extra,
    }
}

/// First usable text value for `key`, in source priority order.
fn first_text<const N: usize>(key: &str, sources: [&Metadata; N]) -> Option<String> {
    sources
        .into_iter()
        .find_map(|source| source.get(key).and_then(value_as_text))
}

/// Render a scalar as text. Null, blank strings, arrays, and objects are absent.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn is_required(key: &str) -> bool {
    REQUIRED_KEYS.contains(&key)
}
