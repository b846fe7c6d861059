//! HTML parsing and DOM navigation.
//!
//! [`Document`] wraps a parsed page for CSS-selector queries and the page
//! metadata lookups the extractor needs (title, description).
//!
//! # Example
//!
//! ```rust
//! use docify_core::parse::Document;
//!
//! let html = r#"
//!     <html>
//!         <head><meta property="og:title" content="Shared Title"></head>
//!         <body>
//!             <h1>Heading</h1>
//!             <p class="content">Paragraph</p>
//!         </body>
//!     </html>
//! "#;
//!
//! let doc = Document::parse(html);
//! assert_eq!(doc.extract_title(), Some("Shared Title".to_string()));
//! assert_eq!(doc.select("p.content").unwrap().len(), 1);
//! ```

use scraper::{ElementRef, Html, Selector};

use crate::{DocifyError, Result};

/// A parsed HTML document.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses HTML from a string. Parsing is lenient and never fails.
    pub fn parse(html: &str) -> Self {
        Self { html: Html::parse_document(html) }
    }

    /// Serializes the whole document back to HTML.
    pub fn as_string(&self) -> String {
        self.html.html()
    }

    /// Selects elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`DocifyError::HtmlParseError`] if the selector is invalid.
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = parse_selector(selector)?;
        Ok(self.html.select(&sel).map(Element::new).collect())
    }

    /// The first element matching `selector`, if any.
    pub fn select_first(&'_ self, selector: &str) -> Result<Option<Element<'_>>> {
        let sel = parse_selector(selector)?;
        Ok(self.html.select(&sel).next().map(Element::new))
    }

    /// The `<body>` element, if the document has one.
    pub fn body(&'_ self) -> Option<Element<'_>> {
        self.select_first("body").ok().flatten()
    }

    /// Content of the `<title>` element, trimmed.
    pub fn title(&self) -> Option<String> {
        let title = self.select_first("title").ok()??.text();
        non_empty(&title)
    }

    /// All text content of the document.
    pub fn text_content(&self) -> String {
        self.html.root_element().text().collect()
    }

    /// Page title with priority fallback:
    /// 1. Open Graph `og:title`
    /// 2. Twitter `twitter:title`
    /// 3. `<title>` element
    /// 4. First `<h1>` element
    pub fn extract_title(&self) -> Option<String> {
        self.meta_content("og:title")
            .or_else(|| self.meta_content("twitter:title"))
            .or_else(|| self.title())
            .or_else(|| {
                let h1 = self.select_first("h1").ok()??.text();
                non_empty(&h1)
            })
    }

    /// Page description: meta `description`, then `og:description`, then
    /// `twitter:description`.
    pub fn extract_description(&self) -> Option<String> {
        self.meta_content("description")
            .or_else(|| self.meta_content("og:description"))
            .or_else(|| self.meta_content("twitter:description"))
    }

    /// Content of a `<meta>` tag looked up by `name` and then by `property`.
    pub fn meta_content(&self, key: &str) -> Option<String> {
        for attr in ["name", "property"] {
            let selector = format!("meta[{}=\"{}\"]", attr, key);
            if let Ok(Some(el)) = self.select_first(&selector)
                && let Some(content) = el.attr("content")
                && let Some(value) = non_empty(content)
            {
                return Some(value);
            }
        }
        None
    }
}

/// A wrapper around scraper's `ElementRef`.
#[derive(Clone, Copy, Debug)]
pub struct Element<'a> {
    element: ElementRef<'a>,
}

impl<'a> Element<'a> {
    fn new(element: ElementRef<'a>) -> Self {
        Self { element }
    }

    /// The wrapped `ElementRef`, for node identity and tree walks.
    pub fn inner(&self) -> ElementRef<'a> {
        self.element
    }

    pub fn inner_html(&self) -> String {
        self.element.inner_html()
    }

    pub fn outer_html(&self) -> String {
        self.element.html()
    }

    /// Concatenated text nodes within this element.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    /// Character count of the trimmed text, ignoring whitespace runs.
    pub fn text_len(&self) -> usize {
        self.element.text().flat_map(|t| t.split_whitespace()).map(|w| w.chars().count() + 1).sum()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Lowercase tag name.
    pub fn tag_name(&self) -> String {
        self.element.value().name().to_lowercase()
    }

    /// The nearest ancestor that is an element.
    pub fn parent(&self) -> Option<Element<'a>> {
        self.element.parent().and_then(ElementRef::wrap).map(Element::new)
    }

    /// Selects descendants using a CSS selector.
    pub fn select(&self, selector: &str) -> Result<Vec<Element<'a>>> {
        let sel = parse_selector(selector)?;
        Ok(self.element.select(&sel).map(Element::new).collect())
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| DocifyError::HtmlParseError(format!("Invalid selector: {}", e)))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value.to_string()) }
}
