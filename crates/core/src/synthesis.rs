//! Generative synthesis with bounded retries.
//!
//! A [`Generator`] turns a prompt into raw model text. [`SynthesisClient`]
//! wraps it with a per-attempt timeout and exponential backoff for retryable
//! failures; everything else fails immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{DocifyError, Result, SynthesisFailure};

/// Sampling parameters passed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { temperature: 0.7, top_p: 0.95, max_output_tokens: 4000 }
    }
}

/// Retry policy for the generative call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt following `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before retrying after `attempt`. A server `retry_after` longer
    /// than the backoff is honored, but never beyond `max_delay`.
    pub fn delay_after(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        match retry_after {
            Some(after) if after > backoff => after.min(self.max_delay),
            _ => backoff,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisConfig {
    pub generation: GenerationConfig,
    pub retry: RetryConfig,
}

/// A failed generative call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerateError {
    #[error("rate limited by the generative service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request timed out")]
    Timeout,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GenerateError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_) | Self::Timeout)
    }

    /// Map a non-success HTTP status onto an error kind.
    pub fn classify_status(status: u16, detail: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let detail = detail.into();
        match status {
            429 => Self::RateLimited { retry_after },
            408 | 500..=599 => Self::Transient(format!("HTTP {}: {}", status, detail)),
            401 | 403 => Self::Unauthorized(format!("HTTP {}: {}", status, detail)),
            _ => Self::InvalidRequest(format!("HTTP {}: {}", status, detail)),
        }
    }
}

/// Produces model text for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> std::result::Result<String, GenerateError>;
}

/// Successful synthesis output.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub text: String,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Retrying wrapper around a [`Generator`].
#[derive(Clone)]
pub struct SynthesisClient {
    generator: Arc<dyn Generator>,
    config: SynthesisConfig,
}

impl SynthesisClient {
    pub fn new(generator: Arc<dyn Generator>, config: SynthesisConfig) -> Self {
        Self { generator, config }
    }

    /// Run the prompt, retrying retryable failures.
    ///
    /// # Errors
    ///
    /// `SynthesisFailed(non_retryable)` on the first non-retryable error and
    /// `SynthesisFailed(retryable_exhausted)` once `max_attempts` is reached.
    pub async fn generate(&self, prompt: &str) -> Result<Synthesis> {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_attempts, "calling generative service");

            let outcome =
                match tokio::time::timeout(retry.attempt_timeout, self.generator.generate(prompt, &self.config.generation))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(GenerateError::Timeout),
                };

            let error = match outcome {
                Ok(text) => return Ok(Synthesis { text, attempts: attempt }),
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(attempt, error = %error, "generative call failed permanently");
                return Err(DocifyError::SynthesisFailed {
                    kind: SynthesisFailure::NonRetryable,
                    attempts: attempt,
                    detail: error.to_string(),
                });
            }

            if attempt >= max_attempts {
                warn!(attempt, error = %error, "generative call retries exhausted");
                return Err(DocifyError::SynthesisFailed {
                    kind: SynthesisFailure::RetryableExhausted,
                    attempts: attempt,
                    detail: error.to_string(),
                });
            }

            let retry_after = match &error {
                GenerateError::RateLimited { retry_after } => *retry_after,
                _ => None,
            };
            let delay = retry.delay_after(attempt, retry_after);

            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying generative call");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(feature = "fetch")]
mod gemini {
    use super::*;
    use reqwest::Client;
    use reqwest::header::RETRY_AFTER;
    use serde::{Deserialize, Serialize};
    use url::Url;

    /// Public Gemini REST endpoint.
    pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
    pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerateRequest<'a> {
        contents: [Content<'a>; 1],
        generation_config: RequestGenerationConfig,
    }

    #[derive(Serialize)]
    struct Content<'a> {
        role: &'static str,
        parts: [Part<'a>; 1],
    }

    #[derive(Serialize)]
    struct Part<'a> {
        text: &'a str,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct RequestGenerationConfig {
        temperature: f32,
        top_p: f32,
        max_output_tokens: u32,
        response_mime_type: &'static str,
    }

    #[derive(Deserialize)]
    struct GenerateResponse {
        #[serde(default)]
        candidates: Vec<Candidate>,
    }

    #[derive(Deserialize)]
    struct Candidate {
        content: Option<CandidateContent>,
    }

    #[derive(Deserialize)]
    struct CandidateContent {
        #[serde(default)]
        parts: Vec<CandidatePart>,
    }

    #[derive(Deserialize)]
    struct CandidatePart {
        text: Option<String>,
    }

    fn map_error(e: reqwest::Error) -> GenerateError {
        if e.is_timeout() { GenerateError::Timeout } else { GenerateError::Transient(e.to_string()) }
    }

    /// [`Generator`] calling the Gemini `generateContent` endpoint.
    #[derive(Debug, Clone)]
    pub struct GeminiGenerator {
        client: Client,
        endpoint: Url,
        api_key: String,
    }

    impl GeminiGenerator {
        pub fn new(base_url: &str, model: &str, api_key: impl Into<String>) -> Result<Self> {
            let api_key = api_key.into();
            if api_key.trim().is_empty() {
                return Err(DocifyError::ConfigError("Gemini API key is empty".to_string()));
            }

            let endpoint = Url::parse(base_url)
                .and_then(|base| base.join(&format!("/v1beta/models/{}:generateContent", model)))
                .map_err(|e| DocifyError::ConfigError(format!("invalid generator URL: {}", e)))?;
            let client = Client::builder().build()?;
            Ok(Self { client, endpoint, api_key })
        }
    }

    #[async_trait]
    impl Generator for GeminiGenerator {
        async fn generate(
            &self, prompt: &str, config: &GenerationConfig,
        ) -> std::result::Result<String, GenerateError> {
            let request = GenerateRequest {
                contents: [Content { role: "user", parts: [Part { text: prompt }] }],
                generation_config: RequestGenerationConfig {
                    temperature: config.temperature,
                    top_p: config.top_p,
                    max_output_tokens: config.max_output_tokens,
                    response_mime_type: "application/json",
                },
            };

            let response = self
                .client
                .post(self.endpoint.clone())
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(map_error)?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                let body = response.text().await.unwrap_or_default();
                let detail: String = body.chars().take(200).collect();
                return Err(GenerateError::classify_status(status.as_u16(), detail, retry_after));
            }

            let parsed: GenerateResponse =
                response.json().await.map_err(|e| GenerateError::InvalidResponse(e.to_string()))?;

            let text: String = parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
                .unwrap_or_default();

            if text.trim().is_empty() {
                return Err(GenerateError::InvalidResponse("response contained no text".to_string()));
            }
            Ok(text)
        }
    }
}

#[cfg(feature = "fetch")]
pub use gemini::{DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL, GeminiGenerator};
