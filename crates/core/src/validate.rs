//! Heuristic content quality scoring.
//!
//! Three independent subscores (structure, readability, completeness) are
//! averaged and reduced by 0.1 per detected issue. The pipeline only sends
//! content to synthesis when the result clears the quality gate.
//!
//! # Example
//!
//! ```rust
//! use docify_core::validate::{ValidationConfig, Validator};
//!
//! let result = Validator::new(ValidationConfig::default()).validate("Too brief.");
//! assert!(result.issues.iter().any(|issue| issue.contains("too short")));
//! assert!(!result.is_valid());
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ValidationFailure;

/// Thresholds for issue detection
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Minimum text length in characters
    pub min_length: usize,
    /// Maximum text length in characters
    pub max_length: usize,
    /// Minimum share of non-stopword, non-numeric tokens
    pub min_meaningful_ratio: f64,
    /// Minimum share of common function words
    pub min_language_marker_ratio: f64,
    /// Texts shorter than this many words skip the language-marker check
    pub language_check_min_words: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_length: 200,
            max_length: 500_000,
            min_meaningful_ratio: 0.3,
            min_language_marker_ratio: 0.05,
            language_check_min_words: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Subscores {
    pub structure: f64,
    pub readability: f64,
    pub completeness: f64,
}

impl Subscores {
    pub fn mean(&self) -> f64 {
        (self.structure + self.readability + self.completeness) / 3.0
    }
}

/// Outcome of validating extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Always within [0, 1].
    pub confidence: f64,
    pub issues: Vec<String>,
    pub subscores: Subscores,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.confidence > 0.6 && self.issues.is_empty()
    }

    /// Apply the pipeline gate: pass only with confidence above `threshold`
    /// and no issues.
    ///
    /// A refusal is `LowConfidence` when the confidence itself is too low,
    /// `QualityIssues` when only the issue list blocks the content.
    pub fn gate(&self, threshold: f64) -> std::result::Result<(), ValidationFailure> {
        if self.confidence > threshold && self.issues.is_empty() {
            Ok(())
        } else if self.confidence <= threshold {
            Err(ValidationFailure::LowConfidence)
        } else {
            Err(ValidationFailure::QualityIssues)
        }
    }
}

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+\S|^\S[^\n]*\n[=-]{3,}[ \t]*$").expect("valid regex"));
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:[-*+]|\d+[.)])[ \t]+\S").expect("valid regex"));
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"));
static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)```|~~~|^(?: {4}|\t)\S").expect("valid regex"));
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+(?:\s|$)|\n[ \t]*\n").expect("valid regex"));

static INTRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(introduction|overview|getting started|in this (guide|document|article|tutorial|post|page)|this (guide|document|article|tutorial) (covers|explains|describes|shows))\b")
        .expect("valid regex")
});
static CONCLUSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(conclusion|in summary|to summarize|summary|wrapping up|next steps|finally)\b").expect("valid regex")
});
static EXAMPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```|\b(example|examples|for instance|e\.g\.|such as|sample)\b").expect("valid regex")
});
static CAUSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(because|therefore|thus|hence|as a result|consequently|so that|due to)\b").expect("valid regex")
});

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by", "can",
    "could", "do", "does", "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in", "into",
    "is", "it", "its", "just", "more", "most", "no", "not", "of", "on", "one", "or", "other", "our", "out", "she",
    "so", "some", "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "to",
    "up", "was", "we", "were", "what", "when", "which", "who", "will", "with", "would", "you", "your",
];

const LANGUAGE_MARKERS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "is", "are", "for", "with", "on", "that", "this", "it", "as",
    "be", "by", "from", "at", "you", "we", "can", "not",
];

static STOPWORD_SET: LazyLock<HashSet<&'static str>> = LazyLock::new(|| STOPWORDS.iter().copied().collect());
static MARKER_SET: LazyLock<HashSet<&'static str>> = LazyLock::new(|| LANGUAGE_MARKERS.iter().copied().collect());

/// Scores extracted text.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(chars = text.len()))]
    pub fn validate(&self, text: &str) -> ValidationResult {
        let tokens = tokenize(text);
        let subscores = Subscores {
            structure: structure_score(text),
            readability: readability_score(text, &tokens),
            completeness: completeness_score(text, tokens.len()),
        };
        let issues = self.detect_issues(text, &tokens);

        let confidence = (subscores.mean() - 0.1 * issues.len() as f64).clamp(0.0, 1.0);
        tracing::debug!(confidence, issues = issues.len(), "content validated");

        ValidationResult { confidence, issues, subscores }
    }

    fn detect_issues(&self, text: &str, tokens: &[String]) -> Vec<String> {
        let mut issues = Vec::new();
        let length = text.trim().chars().count();

        if length < self.config.min_length {
            issues.push(format!("Content too short ({} characters, minimum {})", length, self.config.min_length));
        }
        if length > self.config.max_length {
            issues.push(format!("Content too long ({} characters, maximum {})", length, self.config.max_length));
        }

        if !tokens.is_empty() {
            let meaningful = tokens
                .iter()
                .filter(|t| t.chars().any(char::is_alphabetic) && !STOPWORD_SET.contains(t.as_str()))
                .count();
            let ratio = meaningful as f64 / tokens.len() as f64;
            if ratio < self.config.min_meaningful_ratio {
                issues.push(format!(
                    "Low meaningful word ratio ({:.2}, minimum {:.2})",
                    ratio, self.config.min_meaningful_ratio
                ));
            }
        }

        if tokens.len() >= self.config.language_check_min_words {
            let markers = tokens.iter().filter(|t| MARKER_SET.contains(t.as_str())).count();
            let ratio = markers as f64 / tokens.len() as f64;
            if ratio < self.config.min_language_marker_ratio {
                issues.push(format!(
                    "Few common language markers ({:.2}, minimum {:.2}); text may not be natural language",
                    ratio, self.config.min_language_marker_ratio
                ));
            }
        }

        issues
    }
}

/// Lowercased words with surrounding punctuation removed.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn structure_score(text: &str) -> f64 {
    let mut score: f64 = 0.0;
    if HEADING.is_match(text) {
        score += 0.3;
    }
    if LIST_ITEM.is_match(text) {
        score += 0.2;
    }
    if PARAGRAPH_BREAK.find_iter(text).count() >= 2 {
        score += 0.2;
    }
    if CODE_BLOCK.is_match(text) {
        score += 0.3;
    }
    score.min(1.0)
}

/// 1.0 inside `[low, high]`, decaying linearly to 0 below `low` and over
/// another `high` above it.
fn band_score(value: f64, low: f64, high: f64) -> f64 {
    if value < low {
        (value / low).max(0.0)
    } else if value > high {
        (1.0 - (value - high) / high).max(0.0)
    } else {
        1.0
    }
}

fn readability_score(text: &str, tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }

    let sentences = SENTENCE_END
        .split(text)
        .filter(|s| s.split_whitespace().next().is_some())
        .count()
        .max(1);
    let words_per_sentence = tokens.len() as f64 / sentences as f64;

    let letters: usize = tokens.iter().map(|t| t.chars().filter(|c| c.is_alphanumeric()).count()).sum();
    let chars_per_word = letters as f64 / tokens.len() as f64;

    (band_score(words_per_sentence, 10.0, 25.0) + band_score(chars_per_word, 4.0, 7.0)) / 2.0
}

fn completeness_score(text: &str, word_count: usize) -> f64 {
    let mut score: f64 = 0.0;
    for pattern in [&INTRO, &CONCLUSION, &EXAMPLE, &CAUSAL] {
        if pattern.is_match(text) {
            score += 0.2;
        }
    }
    if (100..=2000).contains(&word_count) {
        score += 0.2;
    }
    score.min(1.0)
}
