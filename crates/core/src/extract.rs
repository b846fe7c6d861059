//! Content-kind detection and normalized text extraction.
//!
//! [`extract`] turns a fetched payload into [`ExtractedContent`]: a title,
//! Markdown-flavored text for validation and prompting, a word count and,
//! for HTML, the markup of the chosen main-content subtree.
//!
//! Text payloads are decoded with the charset they declare (byte-order mark,
//! `Content-Type` parameter, then `<meta charset>` or the XML declaration),
//! defaulting to UTF-8.

use std::borrow::Cow;
use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::parse::{Document, Element};
use crate::preprocess::{PreprocessConfig, preprocess_html};
use crate::scoring::{ScoreConfig, best_candidate};
use crate::{AcquisitionFailure, DocifyError, Result};

/// Kind of a fetched payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Html,
    Pdf,
    Markdown,
    Json,
    Csv,
    Xml,
    /// RSS or Atom
    Feed,
    PlainText,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::Feed => "feed",
            Self::PlainText => "plain_text",
        }
    }

    /// Whether the small-payload threshold applies to this kind.
    ///
    /// Only HTML pages can be client-rendered shells worth re-fetching.
    pub fn is_html_like(&self) -> bool {
        matches!(self, Self::Html)
    }
}

/// Configuration for content extraction
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Minimum text length for a main-content match to be accepted
    pub min_main_chars: usize,
    /// Pages read from a PDF
    pub max_pdf_pages: usize,
    /// Entries rendered from a feed
    pub max_feed_entries: usize,
    /// Characters kept from each feed entry summary
    pub feed_summary_chars: usize,
    /// Lines shown from a CSV file
    pub csv_preview_lines: usize,
    /// Main-content selectors, tried in order
    pub main_selectors: Vec<String>,
    pub preprocess: PreprocessConfig,
    pub score: ScoreConfig,
}

/// Well-known main-content containers, most specific first.
pub const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "[role=\"main\"]",
    "article",
    ".main-content",
    ".post-content",
    ".entry-content",
    "#content",
    "#main",
    ".content",
];

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_main_chars: 100,
            max_pdf_pages: 50,
            max_feed_entries: 10,
            feed_summary_chars: 500,
            csv_preview_lines: 20,
            main_selectors: MAIN_CONTENT_SELECTORS.iter().map(|s| s.to_string()).collect(),
            preprocess: PreprocessConfig::default(),
            score: ScoreConfig::default(),
        }
    }
}

/// Normalized output of extraction
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContent {
    pub title: String,
    pub text: String,
    pub word_count: usize,
    /// Markup of the main-content subtree, HTML only
    pub html: Option<String>,
    pub kind: ContentKind,
    pub description: Option<String>,
    /// PDF only
    pub page_count: Option<usize>,
}

/// Detect the payload kind.
///
/// Order: `Content-Type` header, `%PDF-` magic bytes, URL extension, markup
/// sniff (bare JSON and XML documents are recognized). Unlabeled payloads
/// default to HTML. A `text/plain` header is a weak label: a more specific
/// file extension overrides it, since raw file hosts serve everything as
/// plain text.
pub fn detect_kind(body: &[u8], content_type: Option<&str>, url: &Url) -> ContentKind {
    let from_extension = kind_from_extension(url);

    if let Some(kind) = content_type.and_then(kind_from_header) {
        if kind == ContentKind::PlainText
            && let Some(
                ext_kind @ (ContentKind::Markdown
                | ContentKind::Json
                | ContentKind::Csv
                | ContentKind::Xml
                | ContentKind::Feed),
            ) = from_extension
        {
            return ext_kind;
        }
        return kind;
    }

    if body.starts_with(b"%PDF-") {
        return ContentKind::Pdf;
    }

    if let Some(kind) = from_extension {
        return kind;
    }

    if !looks_like_markup(body) {
        if looks_like_json(body) {
            return ContentKind::Json;
        }
        if looks_like_xml(body) {
            return ContentKind::Xml;
        }
    }

    ContentKind::Html
}

fn kind_from_header(content_type: &str) -> Option<ContentKind> {
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if mime.contains("pdf") {
        Some(ContentKind::Pdf)
    } else if mime.contains("markdown") {
        Some(ContentKind::Markdown)
    } else if mime.contains("html") {
        Some(ContentKind::Html)
    } else if mime.contains("rss") || mime.contains("atom") {
        Some(ContentKind::Feed)
    } else if mime.contains("json") {
        Some(ContentKind::Json)
    } else if mime.contains("csv") {
        Some(ContentKind::Csv)
    } else if mime.contains("xml") {
        Some(ContentKind::Xml)
    } else if mime == "text/plain" {
        Some(ContentKind::PlainText)
    } else {
        None
    }
}

fn kind_from_extension(url: &Url) -> Option<ContentKind> {
    let path = url.path().to_ascii_lowercase();
    let ext = path.rsplit('/').next()?.rsplit_once('.')?.1.to_string();
    match ext.as_str() {
        "pdf" => Some(ContentKind::Pdf),
        "md" | "markdown" => Some(ContentKind::Markdown),
        "html" | "htm" | "xhtml" => Some(ContentKind::Html),
        "json" => Some(ContentKind::Json),
        "csv" => Some(ContentKind::Csv),
        "xml" => Some(ContentKind::Xml),
        "rss" | "atom" => Some(ContentKind::Feed),
        "txt" => Some(ContentKind::PlainText),
        _ => None,
    }
}

fn looks_like_markup(body: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&body[..body.len().min(1024)]).to_ascii_lowercase();
    ["<!doctype html", "<html", "<head", "<body", "<div", "<p>"].iter().any(|marker| head.contains(marker))
}

fn looks_like_json(body: &[u8]) -> bool {
    let trimmed = body.trim_ascii_start();
    (trimmed.starts_with(b"{") || trimmed.starts_with(b"[")) && serde_json::from_slice::<serde_json::Value>(body).is_ok()
}

fn looks_like_xml(body: &[u8]) -> bool {
    let trimmed = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body).trim_ascii_start();
    const XML_PREFIXES: [&[u8]; 4] = [b"<?xml", b"<rss", b"<feed", b"<rdf:RDF"];
    XML_PREFIXES.iter().any(|prefix| trimmed.starts_with(prefix))
}

/// Extract normalized content from a fetched payload.
///
/// # Errors
///
/// `AcquisitionFailed(decode_error)` for bytes that are malformed in their
/// declared encoding, invalid JSON or XML, or a PDF that cannot be parsed.
pub fn extract(body: &[u8], content_type: Option<&str>, url: &Url, config: &ExtractConfig) -> Result<ExtractedContent> {
    let kind = detect_kind(body, content_type, url);
    tracing::debug!(kind = kind.as_str(), bytes = body.len(), "extracting content");

    if kind == ContentKind::Pdf {
        return extract_pdf(body, url, config);
    }

    let source = decode_text(body, content_type, kind)?;
    match kind {
        ContentKind::Pdf => extract_pdf(body, url, config),
        ContentKind::Html => Ok(extract_html(&source, url, config)),
        ContentKind::Markdown => {
            let text = normalize_text(&source);
            let title = markdown_title(&text).unwrap_or_else(|| title_from_url(url));
            Ok(simple_content(title, text, kind))
        }
        ContentKind::Csv => Ok(extract_csv(&source, url, config)),
        ContentKind::Xml | ContentKind::Feed => crate::xml::extract_xml(&source, url, config),
        ContentKind::Json => {
            let value: serde_json::Value = serde_json::from_str(&source)
                .map_err(|e| DocifyError::acquisition(AcquisitionFailure::DecodeError, format!("invalid JSON: {}", e)))?;
            let text = serde_json::to_string_pretty(&value)?;
            Ok(simple_content(title_from_url(url), text, kind))
        }
        ContentKind::PlainText => {
            let text = normalize_text(&source);
            Ok(simple_content(title_from_url(url), text, kind))
        }
    }
}

/// Extract content from an HTML page.
pub fn extract_html(source: &str, url: &Url, config: &ExtractConfig) -> ExtractedContent {
    let raw = Document::parse(source);
    let title = raw.extract_title().unwrap_or_else(|| title_from_url(url));
    let description = raw.extract_description();

    let cleaned = preprocess_html(source, &config.preprocess);
    let doc = Document::parse(&cleaned);

    let main = select_main_content(&doc, config).or_else(|| {
        best_candidate(&doc, &config.score)
            .map(|(element, _)| element)
            .filter(|element| element.text_len() >= config.min_main_chars)
    });

    let html = match main {
        Some(element) => element.outer_html(),
        None => {
            tracing::debug!("no main content container found, using full body");
            doc.body().map(|body| body.inner_html()).unwrap_or_else(|| doc.as_string())
        }
    };

    let text = normalize_text(&html_to_text(&html));
    let word_count = count_words(&text);

    ExtractedContent { title, text, word_count, html: Some(html), kind: ContentKind::Html, description, page_count: None }
}

/// The first well-known container holding enough text.
fn select_main_content<'a>(doc: &'a Document, config: &ExtractConfig) -> Option<Element<'a>> {
    config.main_selectors.iter().find_map(|selector| {
        doc.select(selector)
            .ok()?
            .into_iter()
            .find(|element| element.text_len() >= config.min_main_chars)
    })
}

#[cfg(feature = "markdown")]
fn html_to_text(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "markdown conversion failed, falling back to plain text");
        plain_text(html)
    })
}

#[cfg(not(feature = "markdown"))]
fn html_to_text(html: &str) -> String {
    plain_text(html)
}

/// Block-level text of a fragment, one paragraph per block.
#[cfg_attr(feature = "markdown", allow(dead_code))]
fn plain_text(html: &str) -> String {
    let doc = Document::parse(html);
    let blocks: Vec<String> = doc
        .select("h1, h2, h3, h4, h5, h6, p, li, pre, blockquote, td")
        .unwrap_or_default()
        .iter()
        .map(|el| el.text().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    if blocks.is_empty() { doc.text_content() } else { blocks.join("\n\n") }
}

#[cfg(feature = "pdf")]
fn extract_pdf(body: &[u8], url: &Url, config: &ExtractConfig) -> Result<ExtractedContent> {
    let pdf = crate::pdf::extract_pdf_text(body, config.max_pdf_pages)?;
    let text = normalize_text(&pdf.text);
    Ok(ExtractedContent {
        title: title_from_url(url),
        word_count: count_words(&text),
        text,
        html: None,
        kind: ContentKind::Pdf,
        description: Some(format!("PDF document - {} pages", pdf.page_count)),
        page_count: Some(pdf.page_count),
    })
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(_body: &[u8], _url: &Url, _config: &ExtractConfig) -> Result<ExtractedContent> {
    Err(DocifyError::acquisition(AcquisitionFailure::DecodeError, "PDF support is not enabled"))
}

fn simple_content(title: String, text: String, kind: ContentKind) -> ExtractedContent {
    let word_count = count_words(&text);
    ExtractedContent { title, text, word_count, html: None, kind, description: None, page_count: None }
}

/// First lines of a CSV file, fenced so their layout survives.
fn extract_csv(source: &str, url: &Url, config: &ExtractConfig) -> ExtractedContent {
    let lines: Vec<&str> = source.lines().filter(|line| !line.trim().is_empty()).collect();
    let shown = lines.len().min(config.csv_preview_lines);

    let text = format!(
        "CSV data, showing {} of {} lines:\n\n```csv\n{}\n```",
        shown,
        lines.len(),
        lines[..shown].join("\n")
    );
    let mut content = simple_content(title_from_url(url), text, ContentKind::Csv);
    content.description = Some(format!("CSV file - {} lines", lines.len()));
    content
}

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_.:\-]+)"#).expect("valid regex")
});
static XML_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*\bencoding\s*=\s*["']([A-Za-z0-9_.:\-]+)["']"#).expect("valid regex")
});

/// Decode a text payload of the given kind.
///
/// The encoding is taken from a byte-order mark, then the `charset`
/// parameter of `content_type`, then an in-document declaration, and
/// defaults to UTF-8.
///
/// # Errors
///
/// `AcquisitionFailed(decode_error)` when the bytes are malformed in the
/// chosen encoding.
pub fn decode_text(body: &[u8], content_type: Option<&str>, kind: ContentKind) -> Result<String> {
    let (encoding, payload) = match Encoding::for_bom(body) {
        Some((encoding, bom_len)) => (encoding, &body[bom_len..]),
        None => (declared_encoding(body, content_type, kind).unwrap_or(UTF_8), body),
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(payload)
        .map(Cow::into_owned)
        .ok_or_else(|| {
            DocifyError::acquisition(
                AcquisitionFailure::DecodeError,
                format!("payload is not valid {}", encoding.name()),
            )
        })
}

fn declared_encoding(body: &[u8], content_type: Option<&str>, kind: ContentKind) -> Option<&'static Encoding> {
    if let Some(encoding) = content_type.and_then(charset_param).and_then(|label| Encoding::for_label(label.as_bytes())) {
        return Some(encoding);
    }

    let pattern = match kind {
        ContentKind::Html => &META_CHARSET,
        ContentKind::Xml | ContentKind::Feed => &XML_ENCODING,
        _ => return None,
    };
    let head = String::from_utf8_lossy(&body[..body.len().min(1024)]);
    pattern.captures(&head).and_then(|caps| Encoding::for_label(caps[1].as_bytes()))
}

fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim().eq_ignore_ascii_case("charset").then(|| value.trim().trim_matches('"'))
    })
}

fn markdown_title(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.trim_start().strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

static TRAILING_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("valid regex"));
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Trim trailing spaces and collapse runs of blank lines.
fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = TRAILING_SPACE.replace_all(&text, "\n");
    BLANK_RUNS.replace_all(&text, "\n\n").trim().to_string()
}

/// Whitespace-separated word count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Derive a title from the last path segment of a URL.
///
/// The extension is dropped, `-` and `_` become spaces and each word is
/// capitalized. Falls back to `"Document"`.
pub fn title_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .unwrap_or_default();
    let segment = segment.replace("%20", " ");
    let stem = match segment.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => segment.as_str(),
    };

    let words: Vec<String> = stem
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() { "Document".to_string() } else { words.join(" ") }
}
