//! Text normalization for the local parser.
//!
//! HTML is reduced to its main content with `scraper`, converted with
//! `htmd`, then passed through the same whitespace cleanup as plain text.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use docpipe_shared::{KEY_TITLE, Metadata};

use crate::error::{BackendError, BackendResult};

/// A document reduced to Markdown plus whatever metadata it declared.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NormalizedDocument {
    pub markdown: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub word_count: usize,
}

impl NormalizedDocument {
    /// Content metadata as handed to the merger.
    pub fn metadata(&self) -> Metadata {
        let mut map = Metadata::new();
        let fields = [
            (KEY_TITLE, &self.title),
            ("author", &self.author),
            ("description", &self.description),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                map.insert(key.into(), Value::String(v.clone()));
            }
        }
        map.insert("word_count".into(), Value::from(self.word_count));
        map
    }
}

/// Normalize an HTML document.
pub(crate) fn from_html(html: &str) -> BackendResult<NormalizedDocument> {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, "head > title").or_else(|| first_text(&doc, "h1"));
    let author = meta_content(&doc, "author");
    let description = meta_content(&doc, "description");

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg"])
        .build();
    let raw = converter
        .convert(&main_content(&doc))
        .map_err(|e| BackendError::failed(format!("html conversion failed: {e}")))?;

    let markdown = cleanup(&raw);
    let word_count = count_words(&markdown);
    Ok(NormalizedDocument {
        markdown,
        title,
        author,
        description,
        word_count,
    })
}

/// Normalize Markdown or plain text. The first ATX heading becomes the title.
pub(crate) fn from_text(text: &str) -> NormalizedDocument {
    let markdown = cleanup(text);
    NormalizedDocument {
        title: first_heading(&markdown),
        author: None,
        description: None,
        word_count: count_words(&markdown),
        markdown,
    }
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).unwrap();
    doc.select(&sel)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

fn meta_content(doc: &Html, name: &str) -> Option<String> {
    let sel = Selector::parse(&format!(r#"meta[name="{name}"]"#)).unwrap();
    doc.select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|text| !text.is_empty())
}

/// Inner HTML of the main content region, with page chrome removed.
fn main_content(doc: &Html) -> String {
    for candidate in ["main", "article", r#"[role="main"]"#, "body"] {
        let sel = Selector::parse(candidate).unwrap();
        if let Some(el) = doc.select(&sel).next() {
            return strip_chrome(&el.inner_html());
        }
    }
    String::new()
}

fn strip_chrome(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let chrome = Selector::parse("nav, header, footer, aside, script, style").unwrap();
    fragment
        .select(&chrome)
        .fold(html.to_string(), |acc, el| acc.replace(&el.html(), ""))
}

/// Line endings, trailing whitespace, and blank-line runs.
fn cleanup(text: &str) -> String {
    static BLANK_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed_lines = unified
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let collapsed = BLANK_RUN_RE.replace_all(&trimmed_lines, "\n\n");

    let body = collapsed.trim_matches('\n');
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

fn first_heading(markdown: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+?)\s*#*\s*$").expect("valid regex"));

    H1_RE
        .captures(markdown)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokens containing at least one alphanumeric character.
fn count_words(markdown: &str) -> usize {
    markdown
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html>
<head>
  <title>Quarterly Energy Dynamics</title>
  <meta name="author" content="Market Insights Team">
  <meta name="description" content="Q2 2024 summary">
</head>
<body>
  <nav><a href="/">Home</a> <a href="/about">About us</a></nav>
  <main>
    <h1>Quarterly Energy Dynamics Q2</h1>
    <p>Wholesale prices fell across the  NEM.</p>
    <footer>Copyright notice</footer>
  </main>
</body>
</html>"#;

    #[test]
    fn html_keeps_main_content_and_drops_chrome() {
        let doc = from_html(PAGE).unwrap();
        assert!(doc.markdown.contains("Quarterly Energy Dynamics Q2"));
        assert!(doc.markdown.contains("Wholesale prices fell"));
        assert!(!doc.markdown.contains("About us"));
        assert!(!doc.markdown.contains("Copyright notice"));
        assert!(doc.markdown.ends_with('\n'));
    }

    #[test]
    fn html_metadata_comes_from_head() {
        let doc = from_html(PAGE).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Quarterly Energy Dynamics"));
        assert_eq!(doc.author.as_deref(), Some("Market Insights Team"));
        assert_eq!(doc.description.as_deref(), Some("Q2 2024 summary"));
    }

    #[test]
    fn html_without_title_falls_back_to_h1() {
        let doc = from_html("<html><body><h1>Only Heading</h1><p>x</p></body></html>").unwrap();
        assert_eq!(doc.title.as_deref(), Some("Only Heading"));
        assert!(doc.author.is_none());
    }

    #[test]
    fn text_cleanup_normalizes_whitespace() {
        let doc = from_text("# Title  \r\n\r\n\r\n\r\nBody line   \r\nsecond\n\n\n");
        assert_eq!(doc.markdown, "# Title\n\nBody line\nsecond\n");
        assert_eq!(doc.title.as_deref(), Some("Title"));
        assert_eq!(doc.word_count, 4);
    }

    #[test]
    fn plain_text_without_heading_has_no_title() {
        let doc = from_text("just some notes");
        assert!(doc.title.is_none());
        assert_eq!(doc.word_count, 3);
    }

    #[test]
    fn metadata_mapping_skips_missing_fields() {
        let doc = from_text("## Not an h1\n\ntext");
        let meta = doc.metadata();
        assert!(!meta.contains_key(KEY_TITLE));
        assert!(!meta.contains_key("author"));
        assert_eq!(meta.get("word_count"), Some(&Value::from(4)));
    }
}
