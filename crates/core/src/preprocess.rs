use std::sync::LazyLock;

use regex::Regex;

/// Configuration for HTML preprocessing
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Tags removed together with their content
    pub remove_tags: Vec<String>,
    /// Whether to remove elements whose class or id looks like an ad container
    pub remove_ads: bool,
    /// Whether to unwrap unlikely candidates (sidebars, comments, menus)
    pub remove_unlikely: bool,
    /// Whether to keep positive candidates even if they match unlikely patterns
    pub keep_positive: bool,
    /// Whether to remove hidden elements
    pub remove_hidden: bool,
}

/// Tags that never carry main content.
pub const NON_CONTENT_TAGS: &[&str] =
    &["script", "style", "noscript", "iframe", "svg", "canvas", "nav", "footer", "aside", "form"];

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            remove_tags: NON_CONTENT_TAGS.iter().map(|t| t.to_string()).collect(),
            remove_ads: true,
            remove_unlikely: true,
            keep_positive: true,
            remove_hidden: true,
        }
    }
}

static COMMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static AD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^ads?$|^ad[-_]|[-_]ads?$|[-_]ad[-_]|advert|sponsor|promo|doubleclick|adsense|banner-ad)")
        .expect("valid regex")
});

static UNLIKELY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(breadcrumbs?|combx|comment|community|disqus|extra|menu|related|remark|rss|shoutbox|sidebar|agegate|pagination|pager|popup|cookie)",
    )
    .expect("valid regex")
});

static POSITIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(article|body|content|entry|hentry|h-entry|main|page|post|text|blog|story|docs?)")
        .expect("valid regex")
});

static HIDDEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(display\s*:\s*none|visibility\s*:\s*hidden)").expect("valid regex"));

/// Strip non-content markup from a page before extraction.
///
/// Whitespace is left alone so `<pre>` blocks keep their line structure.
pub fn preprocess_html(html: &str, config: &PreprocessConfig) -> String {
    let mut processed = remove_comments(html);

    if !config.remove_tags.is_empty() {
        processed = remove_tags(&processed, &config.remove_tags);
    }

    if config.remove_ads {
        processed = remove_ad_containers(&processed);
    }

    if config.remove_unlikely {
        processed = remove_unlikely_candidates(&processed, config.keep_positive);
    }

    if config.remove_hidden {
        processed = remove_hidden_elements(&processed);
    }

    processed
}

/// Run a lol_html rewrite, falling back to the input when rewriting fails.
fn rewrite(html: &str, handlers: Vec<(std::borrow::Cow<'static, lol_html::Selector>, lol_html::ElementContentHandlers<'_>)>) -> String {
    let mut output = String::new();
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings { element_content_handlers: handlers, ..Default::default() },
        |c: &[u8]| {
            output.push_str(&String::from_utf8_lossy(c));
        },
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        return html.to_string();
    }

    if output.is_empty() { html.to_string() } else { output }
}

/// Remove the given tags and everything inside them
fn remove_tags(html: &str, tags: &[String]) -> String {
    let handlers = tags
        .iter()
        .map(|tag| {
            lol_html::element!(tag.as_str(), |el| {
                el.remove();
                Ok(())
            })
        })
        .collect();
    rewrite(html, handlers)
}

/// Remove HTML comments from the document
fn remove_comments(html: &str) -> String {
    COMMENT_PATTERN.replace_all(html, "").to_string()
}

fn matches_attr(el: &lol_html::html_content::Element<'_, '_>, pattern: &Regex) -> bool {
    if let Some(id) = el.get_attribute("id")
        && pattern.is_match(&id)
    {
        return true;
    }
    el.get_attribute("class").is_some_and(|class| class.split_whitespace().any(|c| pattern.is_match(c)))
}

/// Remove elements whose class or id marks them as an ad slot
fn remove_ad_containers(html: &str) -> String {
    rewrite(
        html,
        vec![lol_html::element!("*", |el| {
            if matches_attr(el, &AD_PATTERN) {
                el.remove();
            }
            Ok(())
        })],
    )
}

/// Unwrap elements that match unlikely candidate patterns, keeping their children
fn remove_unlikely_candidates(html: &str, keep_positive: bool) -> String {
    rewrite(
        html,
        vec![lol_html::element!("*", |el| {
            if matches!(el.tag_name().as_str(), "html" | "body" | "main" | "article") {
                return Ok(());
            }
            if matches_attr(el, &UNLIKELY_PATTERN) && (!keep_positive || !matches_attr(el, &POSITIVE_PATTERN)) {
                el.remove_and_keep_content();
            }
            Ok(())
        })],
    )
}

/// Remove elements with display:none or visibility:hidden styles
fn remove_hidden_elements(html: &str) -> String {
    rewrite(
        html,
        vec![lol_html::element!("*", |el| {
            if let Some(style) = el.get_attribute("style")
                && HIDDEN_PATTERN.is_match(&style)
            {
                el.remove();
            }
            Ok(())
        })],
    )
}
