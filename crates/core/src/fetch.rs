//! Content acquisition.
//!
//! [`acquire`] runs the URL guard, then tries each [`FetchStrategy`] in order
//! through a [`Fetcher`], falling back to a headless [`Renderer`] when every
//! direct payload is suspiciously small. Local files and stdin are read with
//! [`fetch_file`] and [`fetch_stdin`].

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::extract::detect_kind;
use crate::guard::{HostResolver, check_url};
use crate::{AcquisitionFailure, DocifyError, Result};

/// A named set of request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchStrategy {
    pub name: String,
    pub headers: Vec<(String, String)>,
}

impl FetchStrategy {
    pub fn new(name: impl Into<String>, headers: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Desktop browser, mobile browser and self-identifying bot, in that order.
pub fn default_strategies() -> Vec<FetchStrategy> {
    vec![
        FetchStrategy::new(
            "modern-browser",
            &[
                (
                    "User-Agent",
                    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                ),
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
                ),
                ("Accept-Language", "en-US,en;q=0.9"),
                ("DNT", "1"),
                ("Upgrade-Insecure-Requests", "1"),
                ("Sec-Fetch-Dest", "document"),
                ("Sec-Fetch-Mode", "navigate"),
                ("Sec-Fetch-Site", "none"),
                ("Cache-Control", "max-age=0"),
            ],
        ),
        FetchStrategy::new(
            "mobile",
            &[
                (
                    "User-Agent",
                    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
                ),
                ("Accept", HTML_ACCEPT),
                ("Accept-Language", "en-US,en;q=0.9"),
            ],
        ),
        FetchStrategy::new(
            "bot-friendly",
            &[
                ("User-Agent", "Mozilla/5.0 (compatible; DocifyBot/1.0; +https://docify.app)"),
                ("Accept", HTML_ACCEPT),
                ("Accept-Language", "en-US,en;q=0.9"),
            ],
        ),
    ]
}

/// Configuration for content acquisition.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout for direct fetches.
    pub timeout: Duration,
    /// Timeout for the rendering fallback.
    pub render_timeout: Duration,
    /// HTML payloads below this size trigger the next strategy.
    pub min_viable_bytes: usize,
    /// Larger bodies count as failed attempts.
    pub max_body_bytes: usize,
    pub max_redirects: usize,
    pub strategies: Vec<FetchStrategy>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            render_timeout: Duration::from_secs(30),
            min_viable_bytes: 10_000,
            max_body_bytes: 10 * 1024 * 1024,
            max_redirects: 5,
            strategies: default_strategies(),
        }
    }
}

/// One entry of the fetch attempt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub strategy: String,
    pub succeeded: bool,
    pub status: Option<u16>,
    pub byte_length: usize,
    pub elapsed_ms: u64,
    pub detail: Option<String>,
}

/// Raw result of a single HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure of a fetch or render.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("request failed: {0}")]
    Request(String),
}

/// Performs a single GET request.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, headers: &[(String, String)]) -> std::result::Result<FetchResponse, FetchError>;
}

/// Renders a page in a headless browser and returns the resulting HTML.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Name recorded as the fetch method when the rendered payload is used.
    fn name(&self) -> &str;

    async fn render(&self, url: &Url) -> std::result::Result<String, FetchError>;
}

/// The payload chosen by [`acquire`].
#[derive(Debug, Clone)]
pub struct Acquired {
    pub response: FetchResponse,
    /// Strategy or renderer name that produced the payload.
    pub method: String,
    pub attempts: Vec<FetchAttempt>,
}

/// Acquire the content behind `url`.
///
/// Direct strategies run in order and stop at the first successful payload
/// that is non-HTML or at least `min_viable_bytes` long. Otherwise the
/// renderer, if any, is called once and its payload replaces the best direct
/// payload only when larger.
///
/// # Errors
///
/// `ssrf_rejected` before any request for disallowed URLs; `timeout` when
/// every attempt timed out; `all_strategies_exhausted` when nothing succeeded.
#[tracing::instrument(level = "debug", skip_all, fields(url = %url))]
pub async fn acquire(
    url: &Url, fetcher: &dyn Fetcher, renderer: Option<&dyn Renderer>, resolver: &dyn HostResolver,
    config: &FetchConfig,
) -> Result<Acquired> {
    check_url(url, resolver).await?;

    let mut attempts = Vec::new();
    let mut timeouts = 0;
    let mut best: Option<(FetchResponse, String)> = None;

    for strategy in &config.strategies {
        let started = Instant::now();
        let result = fetcher.fetch(url, &strategy.headers).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let response = match result {
            Ok(response) if !response.is_success() => {
                attempts.push(failed_attempt(&strategy.name, Some(response.status), elapsed_ms, format!("HTTP {}", response.status)));
                continue;
            }
            Ok(response) if response.body.len() > config.max_body_bytes => {
                let err = FetchError::TooLarge { limit: config.max_body_bytes };
                attempts.push(failed_attempt(&strategy.name, Some(response.status), elapsed_ms, err.to_string()));
                continue;
            }
            Ok(response) => response,
            Err(err) => {
                timeouts += usize::from(err == FetchError::Timeout);
                tracing::debug!(strategy = %strategy.name, error = %err, "fetch attempt failed");
                attempts.push(failed_attempt(&strategy.name, None, elapsed_ms, err.to_string()));
                continue;
            }
        };

        let byte_length = response.body.len();
        attempts.push(FetchAttempt {
            strategy: strategy.name.clone(),
            succeeded: true,
            status: Some(response.status),
            byte_length,
            elapsed_ms,
            detail: None,
        });

        let kind = detect_kind(&response.body, response.content_type.as_deref(), url);
        let viable = !kind.is_html_like() || byte_length >= config.min_viable_bytes;
        tracing::debug!(strategy = %strategy.name, bytes = byte_length, viable, "fetch attempt succeeded");

        if viable {
            return Ok(Acquired { response, method: strategy.name.clone(), attempts });
        }
        if best.as_ref().is_none_or(|(current, _)| byte_length > current.body.len()) {
            best = Some((response, strategy.name.clone()));
        }
    }

    if let Some(renderer) = renderer {
        let started = Instant::now();
        let result = renderer.render(url).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(html) => {
                let byte_length = html.len();
                attempts.push(FetchAttempt {
                    strategy: renderer.name().to_string(),
                    succeeded: true,
                    status: Some(200),
                    byte_length,
                    elapsed_ms,
                    detail: None,
                });
                if best.as_ref().is_none_or(|(current, _)| byte_length > current.body.len()) {
                    let response =
                        FetchResponse { status: 200, body: html.into_bytes(), content_type: Some("text/html".into()) };
                    best = Some((response, renderer.name().to_string()));
                }
            }
            Err(err) => {
                timeouts += usize::from(err == FetchError::Timeout);
                tracing::warn!(renderer = renderer.name(), error = %err, "rendering fallback failed");
                attempts.push(failed_attempt(renderer.name(), None, elapsed_ms, err.to_string()));
            }
        }
    }

    match best {
        Some((response, method)) => {
            tracing::info!(method = %method, bytes = response.body.len(), "using best available payload");
            Ok(Acquired { response, method, attempts })
        }
        None => {
            let all_timed_out = !attempts.is_empty() && timeouts == attempts.len();
            let kind = if all_timed_out { AcquisitionFailure::Timeout } else { AcquisitionFailure::AllStrategiesExhausted };
            let detail = format!("{} fetch attempt(s) failed", attempts.len());
            tracing::warn!(kind = kind.as_str(), attempts = attempts.len(), "acquisition failed");
            Err(DocifyError::AcquisitionFailed { kind, detail, attempts })
        }
    }
}

fn failed_attempt(strategy: &str, status: Option<u16>, elapsed_ms: u64, detail: String) -> FetchAttempt {
    FetchAttempt { strategy: strategy.to_string(), succeeded: false, status, byte_length: 0, elapsed_ms, detail: Some(detail) }
}

/// Reads a local file.
///
/// Callers should validate and sanitize the path when accepting user input.
pub fn fetch_file(path: &str) -> Result<Vec<u8>> {
    let path_buf = PathBuf::from(path);
    fs::read(&path_buf).map_err(DocifyError::from)
}

/// Reads all of standard input.
pub fn fetch_stdin() -> Result<Vec<u8>> {
    use std::io::{self, Read};

    let mut buffer = Vec::new();
    io::stdin().read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(feature = "fetch")]
pub use http::{BrowserlessRenderer, DEFAULT_BROWSERLESS_URL, HttpFetcher};

#[cfg(feature = "fetch")]
mod http {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use reqwest::Client;
    use reqwest::dns::{Addrs, Name, Resolve, Resolving};
    use reqwest::header::CONTENT_TYPE;
    use reqwest::redirect::Policy;

    use crate::guard::{SystemResolver, check_literal, resolve_public};

    /// Hosted browserless endpoint.
    pub const DEFAULT_BROWSERLESS_URL: &str = "https://production-sfo.browserless.io";

    fn map_error(e: reqwest::Error) -> FetchError {
        if e.is_timeout() { FetchError::Timeout } else { FetchError::Request(e.to_string()) }
    }

    /// DNS for the reqwest client. Every connection the client opens,
    /// redirect hops included, resolves through [`resolve_public`].
    pub(crate) struct GuardedResolver(pub(crate) Arc<dyn HostResolver>);

    impl Resolve for GuardedResolver {
        fn resolve(&self, name: Name) -> Resolving {
            let resolver = self.0.clone();
            Box::pin(async move {
                let addrs = resolve_public(name.as_str(), 0, resolver.as_ref())
                    .await
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
                let addrs: Addrs = Box::new(addrs.into_iter().map(|ip| SocketAddr::new(ip, 0)));
                Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
            })
        }
    }

    /// [`Fetcher`] backed by a shared reqwest client.
    ///
    /// Redirects are followed up to the configured hop count. Hosts are
    /// resolved through the outbound guard, so a redirect or a re-resolution
    /// that lands on an internal address fails the request.
    #[derive(Debug, Clone)]
    pub struct HttpFetcher {
        client: Client,
        max_body_bytes: usize,
    }

    impl HttpFetcher {
        pub fn new(config: &FetchConfig) -> Result<Self> {
            Self::with_resolver(config, Arc::new(SystemResolver))
        }

        pub fn with_resolver(config: &FetchConfig, resolver: Arc<dyn HostResolver>) -> Result<Self> {
            let max_redirects = config.max_redirects;
            let policy = Policy::custom(move |attempt| {
                if attempt.previous().len() >= max_redirects {
                    attempt.error("too many redirects")
                } else if check_literal(attempt.url()).is_err() {
                    attempt.error("redirect to a disallowed host")
                } else {
                    attempt.follow()
                }
            });

            let client = Client::builder()
                .timeout(config.timeout)
                .redirect(policy)
                .dns_resolver(Arc::new(GuardedResolver(resolver)))
                .build()?;
            Ok(Self { client, max_body_bytes: config.max_body_bytes })
        }
    }

    #[async_trait]
    impl Fetcher for HttpFetcher {
        async fn fetch(
            &self, url: &Url, headers: &[(String, String)],
        ) -> std::result::Result<FetchResponse, FetchError> {
            let mut request = self.client.get(url.clone());
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let mut response = request.send().await.map_err(map_error)?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let limit = self.max_body_bytes;
            if response.content_length().is_some_and(|len| len as usize > limit) {
                return Err(FetchError::TooLarge { limit });
            }

            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await.map_err(map_error)? {
                if body.len() + chunk.len() > limit {
                    return Err(FetchError::TooLarge { limit });
                }
                body.extend_from_slice(&chunk);
            }

            Ok(FetchResponse { status, body, content_type })
        }
    }

    /// [`Renderer`] calling a browserless `/content` endpoint.
    #[derive(Debug, Clone)]
    pub struct BrowserlessRenderer {
        client: Client,
        endpoint: Url,
        token: String,
        timeout: Duration,
    }

    impl BrowserlessRenderer {
        pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
            let base = Url::parse(base_url).map_err(|e| DocifyError::ConfigError(format!("invalid renderer URL: {}", e)))?;
            let endpoint = base
                .join("/content")
                .map_err(|e| DocifyError::ConfigError(format!("invalid renderer URL: {}", e)))?;
            let client = Client::builder().timeout(timeout).build()?;
            Ok(Self { client, endpoint, token: token.into(), timeout })
        }
    }

    #[async_trait]
    impl Renderer for BrowserlessRenderer {
        fn name(&self) -> &str {
            "browserless"
        }

        async fn render(&self, url: &Url) -> std::result::Result<String, FetchError> {
            let body = serde_json::json!({
                "url": url.as_str(),
                "gotoOptions": {
                    "waitUntil": "networkidle2",
                    "timeout": self.timeout.as_millis() as u64,
                },
            });

            let response = self
                .client
                .post(self.endpoint.clone())
                .query(&[("token", self.token.as_str())])
                .json(&body)
                .send()
                .await
                .map_err(map_error)?;

            if !response.status().is_success() {
                return Err(FetchError::Request(format!("renderer returned HTTP {}", response.status().as_u16())));
            }

            response.text().await.map_err(map_error)
        }
    }
}
