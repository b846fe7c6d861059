//! Pipeline-wide configuration.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use docify_core::PipelineConfig;
//!
//! let config = PipelineConfig::builder()
//!     .gate_threshold(0.75)
//!     .fetch_timeout(Duration::from_secs(10))
//!     .max_attempts(5)
//!     .build();
//! assert_eq!(config.synthesis.retry.max_attempts, 5);
//! ```

use std::time::Duration;

use crate::extract::ExtractConfig;
use crate::fetch::{FetchConfig, FetchStrategy};
use crate::prompt::PromptConfig;
use crate::synthesis::SynthesisConfig;
use crate::validate::ValidationConfig;

/// Everything the pipeline stages need to know besides their services.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub validation: ValidationConfig,
    pub prompt: PromptConfig,
    pub synthesis: SynthesisConfig,

    /// Minimum confidence (exclusive) for content to reach synthesis (default: 0.7).
    pub gate_threshold: f64,

    /// Extracted text or HTML larger than this many bytes goes to the blob
    /// store (default: 64 KiB).
    pub inline_payload_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            extract: ExtractConfig::default(),
            validation: ValidationConfig::default(),
            prompt: PromptConfig::default(),
            synthesis: SynthesisConfig::default(),
            gate_threshold: 0.7,
            inline_payload_limit: 64 * 1024,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

/// Fluent builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self { config: PipelineConfig::default() }
    }

    pub fn fetch(mut self, fetch: FetchConfig) -> Self {
        self.config.fetch = fetch;
        self
    }

    pub fn extract(mut self, extract: ExtractConfig) -> Self {
        self.config.extract = extract;
        self
    }

    pub fn validation(mut self, validation: ValidationConfig) -> Self {
        self.config.validation = validation;
        self
    }

    pub fn prompt(mut self, prompt: PromptConfig) -> Self {
        self.config.prompt = prompt;
        self
    }

    pub fn synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.config.synthesis = synthesis;
        self
    }

    /// Sets the per-request timeout for direct fetches.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch.timeout = timeout;
        self
    }

    /// Sets the timeout for the rendering fallback.
    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch.render_timeout = timeout;
        self
    }

    /// Sets the HTML size below which the next strategy is tried.
    pub fn min_viable_bytes(mut self, bytes: usize) -> Self {
        self.config.fetch.min_viable_bytes = bytes;
        self
    }

    /// Replaces the direct fetch strategies.
    pub fn strategies(mut self, strategies: Vec<FetchStrategy>) -> Self {
        self.config.fetch.strategies = strategies;
        self
    }

    pub fn gate_threshold(mut self, threshold: f64) -> Self {
        self.config.gate_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn inline_payload_limit(mut self, bytes: usize) -> Self {
        self.config.inline_payload_limit = bytes;
        self
    }

    /// Sets the character budget for document text in the prompt.
    pub fn max_content_chars(mut self, chars: usize) -> Self {
        self.config.prompt.max_content_chars = chars;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.synthesis.retry.max_attempts = attempts.max(1);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.synthesis.retry.base_delay = delay;
        self
    }

    /// Sets the deadline for one generative call.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.synthesis.retry.attempt_timeout = timeout;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
