//! Error types for Docify pipeline operations.
//!
//! [`DocifyError`] covers the three pipeline failure families (acquisition,
//! validation, synthesis) plus the infrastructure errors raised by stores and
//! adapters. Pipeline failures are terminal for a document; the coordinator
//! records their `Display` text as the document's `error_message`.
//!
//! # Example
//!
//! ```rust
//! use docify_core::{AcquisitionFailure, DocifyError};
//!
//! let err = DocifyError::acquisition(AcquisitionFailure::SsrfRejected, "host resolves to 127.0.0.1");
//! assert!(err.to_string().contains("ssrf_rejected"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{DocumentId, Status};
use crate::fetch::FetchAttempt;

/// Why content acquisition stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionFailure {
    /// The URL targets a loopback, private or otherwise internal host.
    SsrfRejected,
    /// Every fetch strategy (and the rendering fallback) failed.
    AllStrategiesExhausted,
    /// The fetched bytes could not be decoded for their content kind.
    DecodeError,
    /// Every attempt failed by timing out.
    Timeout,
}

/// Why extracted content was refused by the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    LowConfidence,
    QualityIssues,
}

/// Why the generative call did not produce usable analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisFailure {
    /// Retryable failures persisted until the attempt cap.
    RetryableExhausted,
    /// The service refused the request (auth, malformed request).
    NonRetryable,
    /// The model output did not contain the expected JSON structure.
    MalformedResponse,
}

impl AcquisitionFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SsrfRejected => "ssrf_rejected",
            Self::AllStrategiesExhausted => "all_strategies_exhausted",
            Self::DecodeError => "decode_error",
            Self::Timeout => "timeout",
        }
    }
}

impl ValidationFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::QualityIssues => "quality_issues",
        }
    }
}

impl SynthesisFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetryableExhausted => "retryable_exhausted",
            Self::NonRetryable => "non_retryable",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for AcquisitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SynthesisFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum DocifyError {
    /// Content could not be fetched or decoded.
    ///
    /// `attempts` carries the fetch attempt log for diagnostics; it is empty
    /// when the failure happened before any request was made.
    #[error("Acquisition failed ({kind}): {detail}")]
    AcquisitionFailed { kind: AcquisitionFailure, detail: String, attempts: Vec<FetchAttempt> },

    /// Extracted content did not pass the quality gate.
    #[error("Validation failed ({kind}): confidence {confidence:.2}; {}", format_issues(.issues))]
    ValidationFailed { kind: ValidationFailure, confidence: f64, issues: Vec<String> },

    /// The generative service did not produce usable analysis.
    #[error("Synthesis failed ({kind}) after {attempts} attempt(s): {detail}")]
    SynthesisFailed { kind: SynthesisFailure, attempts: u32, detail: String },

    /// Invalid URL provided at submission.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No record exists for the given id.
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// A write tried to move a record backwards in its lifecycle.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: Status, to: Status },

    /// Document store failures.
    #[error("Document store error: {0}")]
    Store(String),

    /// Blob store failures.
    #[error("Blob store error: {0}")]
    Blob(String),

    /// HTML parsing errors, usually an invalid CSS selector.
    #[error("Failed to parse HTML: {0}")]
    HtmlParseError(String),

    /// Filesystem errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors outside model output parsing.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client construction errors from reqwest.
    #[cfg(feature = "fetch")]
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl DocifyError {
    /// Acquisition failure without an attempt log.
    pub fn acquisition(kind: AcquisitionFailure, detail: impl Into<String>) -> Self {
        Self::AcquisitionFailed { kind, detail: detail.into(), attempts: Vec::new() }
    }

    /// Whether this error is one of the pipeline failure families, as opposed
    /// to an infrastructure error.
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionFailed { .. } | Self::ValidationFailed { .. } | Self::SynthesisFailed { .. }
        )
    }
}

fn format_issues(issues: &[String]) -> String {
    if issues.is_empty() { "no issues".to_string() } else { issues.join("; ") }
}

/// Result type alias for DocifyError.
pub type Result<T> = std::result::Result<T, DocifyError>;
