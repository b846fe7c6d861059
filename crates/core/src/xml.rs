//! XML documents and RSS/Atom feeds.
//!
//! Payloads are read into a small element tree with quick-xml. A tree whose
//! root is `rss`, `rdf:RDF` or an Atom `feed` is rendered as a feed digest
//! (feed title plus the newest entries); anything else becomes an indented
//! element outline.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use url::Url;

use crate::extract::{ContentKind, ExtractConfig, ExtractedContent, count_words, title_from_url};
use crate::parse::Document;
use crate::{AcquisitionFailure, DocifyError, Result};

/// An element with its attributes, trimmed text and child elements.
///
/// Names are local names, so `atom:link` and `link` both read as `link`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

fn malformed(e: impl std::fmt::Display) -> DocifyError {
    DocifyError::acquisition(AcquisitionFailure::DecodeError, format!("invalid XML: {}", e))
}

impl XmlNode {
    /// Parse a document and return its root element.
    pub fn parse(source: &str) -> Result<Self> {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(true);

        let mut stack = vec![XmlNode::default()];
        loop {
            match reader.read_event().map_err(malformed)? {
                Event::Start(start) => stack.push(Self::from_start(&start)?),
                Event::Empty(start) => {
                    let node = Self::from_start(&start)?;
                    attach(&mut stack, node);
                }
                Event::End(_) => {
                    if stack.len() > 1
                        && let Some(node) = stack.pop()
                    {
                        attach(&mut stack, node);
                    }
                }
                Event::Text(text) => {
                    // Unknown entities (common in feeds) keep their raw text.
                    let value = text
                        .unescape()
                        .map(Cow::into_owned)
                        .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                    push_text(&mut stack, &value);
                }
                Event::CData(data) => push_text(&mut stack, &String::from_utf8_lossy(&data.into_inner())),
                Event::Eof => break,
                _ => {}
            }
        }

        if stack.len() != 1 {
            return Err(malformed("unclosed element"));
        }
        stack
            .pop()
            .and_then(|document| document.children.into_iter().next())
            .ok_or_else(|| malformed("no root element"))
    }

    fn from_start(start: &BytesStart) -> Result<Self> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(malformed)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(malformed)?.into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child called `name` that has any.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.children_named(name).map(|c| c.text.as_str()).find(|t| !t.is_empty())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Number of elements in this subtree, itself included.
    pub fn element_count(&self) -> usize {
        1 + self.children.iter().map(XmlNode::element_count).sum::<usize>()
    }
}

fn attach(stack: &mut [XmlNode], node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn push_text(stack: &mut [XmlNode], value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    if let Some(node) = stack.last_mut() {
        if !node.text.is_empty() {
            node.text.push(' ');
        }
        node.text.push_str(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

impl FeedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rss => "RSS",
            Self::Atom => "Atom",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub format: FeedFormat,
    pub title: Option<String>,
    pub description: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// Read a feed from a parsed root element, if it is one.
pub fn read_feed(root: &XmlNode) -> Option<Feed> {
    let owned = |s: Option<&str>| s.map(str::to_string);

    match root.name.as_str() {
        "rss" => {
            let channel = root.child("channel")?;
            Some(Feed {
                format: FeedFormat::Rss,
                title: owned(channel.child_text("title")),
                description: owned(channel.child_text("description")),
                entries: channel.children_named("item").map(rss_entry).collect(),
            })
        }
        // RSS 1.0 keeps items beside the channel
        "RDF" => {
            let channel = root.child("channel");
            Some(Feed {
                format: FeedFormat::Rss,
                title: owned(channel.and_then(|c| c.child_text("title"))),
                description: owned(channel.and_then(|c| c.child_text("description"))),
                entries: root.children_named("item").map(rss_entry).collect(),
            })
        }
        "feed" => Some(Feed {
            format: FeedFormat::Atom,
            title: owned(root.child_text("title")),
            description: owned(root.child_text("subtitle")),
            entries: root.children_named("entry").map(atom_entry).collect(),
        }),
        _ => None,
    }
}

fn rss_entry(item: &XmlNode) -> FeedEntry {
    FeedEntry {
        title: item.child_text("title").map(str::to_string),
        link: item.child_text("link").map(str::to_string),
        summary: item.child_text("description").or_else(|| item.child_text("encoded")).map(str::to_string),
    }
}

fn atom_entry(entry: &XmlNode) -> FeedEntry {
    let link = entry
        .children_named("link")
        .find(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .or_else(|| entry.child("link"))
        .and_then(|l| l.attr("href"))
        .map(str::to_string);

    FeedEntry {
        title: entry.child_text("title").map(str::to_string),
        link,
        summary: entry.child_text("summary").or_else(|| entry.child_text("content")).map(str::to_string),
    }
}

/// Entry summaries are frequently HTML; keep their text, bounded.
fn summary_text(summary: &str, max_chars: usize) -> String {
    let text = Document::parse(summary).text_content();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>().trim_end())
    } else {
        text
    }
}

fn render_feed(feed: &Feed, title: &str, config: &ExtractConfig) -> String {
    let mut out = format!("# {}\n\n", title);
    if let Some(description) = &feed.description {
        out.push_str(&summary_text(description, config.feed_summary_chars));
        out.push_str("\n\n");
    }

    let shown = feed.entries.len().min(config.max_feed_entries);
    out.push_str(&format!("{} feed with {} entries", feed.format.as_str(), feed.entries.len()));
    if shown < feed.entries.len() {
        out.push_str(&format!(", showing the first {}", shown));
    }
    out.push_str(".\n");

    for (index, entry) in feed.entries.iter().take(shown).enumerate() {
        let heading = entry.title.clone().unwrap_or_else(|| format!("Entry {}", index + 1));
        out.push_str(&format!("\n## {}\n", heading));
        if let Some(link) = &entry.link {
            out.push_str(&format!("\nLink: {}\n", link));
        }
        if let Some(summary) = &entry.summary {
            let summary = summary_text(summary, config.feed_summary_chars);
            if !summary.is_empty() {
                out.push_str(&format!("\n{}\n", summary));
            }
        }
    }
    out
}

fn outline(node: &XmlNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    if node.text.is_empty() {
        out.push_str(&format!("{}- {}\n", indent, node.name));
    } else {
        out.push_str(&format!("{}- {}: {}\n", indent, node.name, node.text));
    }
    for child in &node.children {
        outline(child, depth + 1, out);
    }
}

/// Extract an XML payload, as a feed digest when the root is a feed.
pub fn extract_xml(source: &str, url: &Url, config: &ExtractConfig) -> Result<ExtractedContent> {
    let root = XmlNode::parse(source)?;

    if let Some(feed) = read_feed(&root) {
        let title = feed.title.clone().unwrap_or_else(|| title_from_url(url));
        let text = render_feed(&feed, &title, config).trim_end().to_string();
        return Ok(ExtractedContent {
            word_count: count_words(&text),
            description: Some(format!("{} feed - {} entries", feed.format.as_str(), feed.entries.len())),
            title,
            text,
            html: None,
            kind: ContentKind::Feed,
            page_count: None,
        });
    }

    let mut text = String::new();
    outline(&root, 0, &mut text);
    let text = text.trim_end().to_string();
    Ok(ExtractedContent {
        title: title_from_url(url),
        word_count: count_words(&text),
        description: Some(format!("XML document - {} elements", root.element_count())),
        text,
        html: None,
        kind: ContentKind::Xml,
        page_count: None,
    })
}
