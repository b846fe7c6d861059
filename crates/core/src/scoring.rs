//! Readability-style candidate scoring.
//!
//! Used when none of the well-known main-content selectors matches: every
//! block container is scored on its tag, class/id hints and text density,
//! scores flow up to the parent (half) and grandparent (a third), and the
//! best-scoring container wins.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::parse::{Document, Element};

/// Configuration for content scoring
#[derive(Debug, Clone)]
pub struct ScoreConfig {
    /// Minimum final score for the winning candidate
    pub min_score_threshold: f64,
    /// Minimum text length for a non-sectioning element to be scored
    pub min_candidate_chars: usize,
    /// Weight for positive class/ID patterns
    pub positive_weight: f64,
    /// Weight for negative class/ID patterns
    pub negative_weight: f64,
    /// Maximum content density score from character count
    pub max_char_density_score: f64,
    /// Maximum content density score from comma count
    pub max_comma_density_score: f64,
    /// Characters per point for content density scoring
    pub chars_per_point: usize,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            min_score_threshold: 10.0,
            min_candidate_chars: 25,
            positive_weight: 25.0,
            negative_weight: -25.0,
            max_char_density_score: 3.0,
            max_comma_density_score: 3.0,
            chars_per_point: 100,
        }
    }
}

/// Breakdown of an element's score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub base_score: f64,
    pub class_weight: f64,
    pub content_density: f64,
    /// Link text share of all text, 0.0 to 1.0
    pub link_density: f64,
    pub final_score: f64,
}

/// Tags considered as content containers
const CANDIDATE_TAGS: &str = "div, article, section, main, p, td, pre, blockquote";

static POSITIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(article|body|content|entry|hentry|h-entry|main|page|post|text|blog|story|docs?|guide)")
        .expect("valid regex")
});

static NEGATIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(banner|breadcrumbs?|combx|comment|community|disqus|extra|foot|header|menu|related|remark|rss|shoutbox|sidebar|sponsor|ad-break|agegate|pagination|pager|popup|share|social)")
        .expect("valid regex")
});

/// Base score from the tag name
pub fn base_tag_score(element: &Element<'_>) -> f64 {
    match element.tag_name().as_str() {
        "article" => 10.0,
        "section" | "main" => 8.0,
        "div" => 5.0,
        "td" | "blockquote" => 3.0,
        "pre" => 0.0,
        "form" => -3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" | "header" | "footer" | "nav" => -5.0,
        _ => 0.0,
    }
}

/// Class/ID weight: the id is checked before the class list, positive before negative
pub fn class_id_weight(element: &Element<'_>, config: &ScoreConfig) -> f64 {
    let id = element.attr("id").into_iter();
    let classes = element.attr("class").into_iter().flat_map(str::split_whitespace);

    for name in id.chain(classes) {
        if POSITIVE_PATTERN.is_match(name) {
            return config.positive_weight;
        }
        if NEGATIVE_PATTERN.is_match(name) {
            return config.negative_weight;
        }
    }
    0.0
}

/// Density score from text length and comma count (commas suggest prose)
pub fn content_density_score(text: &str, config: &ScoreConfig) -> f64 {
    let char_score = ((text.chars().count() / config.chars_per_point.max(1)) as f64).min(config.max_char_density_score);
    let comma_score = (text.matches(',').count() as f64).min(config.max_comma_density_score);
    char_score + comma_score
}

/// Ratio of link text to all text
pub fn link_density(element: &Element<'_>, text: &str) -> f64 {
    let text_length = text.chars().count();
    if text_length == 0 {
        return 0.0;
    }

    let link_length: usize = element
        .select("a")
        .unwrap_or_default()
        .iter()
        .map(|link| link.text().chars().count())
        .sum();

    (link_length as f64 / text_length as f64).min(1.0)
}

/// Score a single element.
///
/// Link density scales the score down; the penalty is halved for elements
/// with a positive class/id hint or more than 500 characters of text.
pub fn calculate_score(element: &Element<'_>, config: &ScoreConfig) -> ScoreResult {
    let text = element.text();
    let base_score = base_tag_score(element);
    let class_weight = class_id_weight(element, config);
    let content_density = content_density_score(&text, config);
    let ld = link_density(element, &text);

    let lenient = class_weight > 0.0 || text.chars().count() > 500;
    let link_penalty = if lenient { 1.0 - ld * 0.5 } else { 1.0 - ld };
    let final_score = (base_score + class_weight + content_density) * link_penalty;

    ScoreResult { base_score, class_weight, content_density, link_density: ld, final_score }
}

/// Find the best-scoring content container in `doc`.
///
/// Returns `None` when nothing reaches `config.min_score_threshold`.
pub fn best_candidate<'a>(doc: &'a Document, config: &ScoreConfig) -> Option<(Element<'a>, f64)> {
    let elements = doc.select(CANDIDATE_TAGS).ok()?;
    let mut scores = HashMap::new();
    let mut add = |element: Element<'a>, score: f64| {
        scores.entry(element.inner().id()).or_insert((element, 0.0)).1 += score;
    };

    for element in elements {
        let sectioning = matches!(element.tag_name().as_str(), "article" | "section" | "main");
        if !sectioning && element.text_len() < config.min_candidate_chars {
            continue;
        }

        let score = calculate_score(&element, config).final_score;
        add(element, score);

        if let Some(parent) = element.parent() {
            add(parent, score / 2.0);
            if let Some(grandparent) = parent.parent() {
                add(grandparent, score / 3.0);
            }
        }
    }

    scores
        .into_values()
        .filter(|(el, _)| !matches!(el.tag_name().as_str(), "html" | "body"))
        .max_by(compare_candidates)
        .filter(|(_, score)| *score >= config.min_score_threshold)
}

fn compare_candidates(a: &(Element<'_>, f64), b: &(Element<'_>, f64)) -> Ordering {
    a.1.partial_cmp(&b.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| candidate_priority(&a.0.tag_name()).cmp(&candidate_priority(&b.0.tag_name())))
        .then_with(|| a.0.text_len().cmp(&b.0.text_len()))
}

fn candidate_priority(tag_name: &str) -> u8 {
    match tag_name {
        "article" | "main" | "section" => 3,
        "div" => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn first<'a>(doc: &'a Document, selector: &str) -> Element<'a> {
        doc.select_first(selector).unwrap().unwrap()
    }

    #[rstest]
    #[case("<article>Content</article>", "article", 10.0)]
    #[case("<section>Content</section>", "section", 8.0)]
    #[case("<div>Content</div>", "div", 5.0)]
    #[case("<blockquote>Quote</blockquote>", "blockquote", 3.0)]
    #[case("<pre>Code</pre>", "pre", 0.0)]
    #[case("<ul><li>Item</li></ul>", "li", -3.0)]
    #[case("<nav>Nav</nav>", "nav", -5.0)]
    fn test_base_tag_score(#[case] html: &str, #[case] selector: &str, #[case] expected: f64) {
        let doc = Document::parse(html);
        assert_eq!(base_tag_score(&first(&doc, selector)), expected);
    }

    #[rstest]
    #[case(r#"<div class="article-content">x</div>"#, 25.0)]
    #[case(r#"<div id="main-content">x</div>"#, 25.0)]
    #[case(r#"<div class="sidebar">x</div>"#, -25.0)]
    #[case(r#"<div id="main-article" class="sidebar">x</div>"#, 25.0)]
    #[case(r#"<div class="container" id="wrapper">x</div>"#, 0.0)]
    fn test_class_id_weight(#[case] html: &str, #[case] expected: f64) {
        let doc = Document::parse(html);
        assert_eq!(class_id_weight(&first(&doc, "div"), &ScoreConfig::default()), expected);
    }

    #[test]
    fn test_content_density_caps() {
        let config = ScoreConfig::default();
        assert_eq!(content_density_score("Short text here.", &config), 0.0);
        assert_eq!(content_density_score(&"a".repeat(500), &config), 3.0);
        assert_eq!(content_density_score("one, two, three, four, five", &config), 3.0);
    }

    #[test]
    fn test_link_density() {
        let doc = Document::parse(r##"<div id="a"><a href="#">Link text</a></div><div id="b">Some text <a href="#">link</a> more</div>"##);
        let all_links = first(&doc, "#a");
        assert_eq!(link_density(&all_links, &all_links.text()), 1.0);

        let mixed = first(&doc, "#b");
        let density = link_density(&mixed, &mixed.text());
        assert!(density > 0.0 && density < 1.0);
    }

    #[test]
    fn test_navigation_scores_negative() {
        let doc = Document::parse(r##"<nav class="menu"><a href="#">Link 1</a><a href="#">Link 2</a></nav>"##);
        let result = calculate_score(&first(&doc, "nav"), &ScoreConfig::default());
        assert_eq!(result.base_score, -5.0);
        assert_eq!(result.class_weight, -25.0);
        assert!(result.final_score < 0.0);
    }

    #[test]
    fn test_best_candidate_prefers_prose_container() {
        let prose = "The scheduler keeps a queue of tasks, ordered by deadline, and wakes workers as needed. ".repeat(6);
        let html = format!(
            r##"<body>
                <div class="links"><a href="#">One</a> <a href="#">Two</a> <a href="#">Three</a></div>
                <div id="story"><p>{prose}</p><p>{prose}</p></div>
            </body>"##
        );
        let doc = Document::parse(&html);
        let (element, score) = best_candidate(&doc, &ScoreConfig::default()).unwrap();
        assert_eq!(element.attr("id"), Some("story"));
        assert!(score >= 10.0);
    }

    #[test]
    fn test_best_candidate_none_for_empty_page() {
        let doc = Document::parse("<body><span>hi</span></body>");
        assert!(best_candidate(&doc, &ScoreConfig::default()).is_none());
    }
}
