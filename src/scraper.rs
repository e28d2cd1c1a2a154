use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{redirect, StatusCode};
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use url::Url;

use crate::config::ScraperConfig;
use crate::rate_limit::DomainRateLimiter;
use crate::utils::error::{AppError, Result};

/// Longest 429 block a fetch sleeps through before giving up on the host.
const MAX_BLOCK_WAIT: Duration = Duration::from_secs(30);

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub success: bool,
    pub status: Option<u16>,
    pub html: Option<String>,
    pub error: Option<String>,
    pub response_time_ms: u64,
    pub final_url: String, // After redirects
}

impl ScrapeResult {
    /// Body of a successful fetch, or the recorded error.
    pub fn into_html(self) -> Result<String> {
        match (self.success, self.html) {
            (true, Some(html)) => Ok(html),
            _ => Err(AppError::Scraping(
                self.error.unwrap_or_else(|| format!("empty response from {}", self.final_url)),
            )),
        }
    }
}

#[derive(Debug)]
enum FetchError {
    Status(StatusCode),
    Transport(reqwest::Error),
    Blocked(Duration),
    InvalidUrl(String),
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FetchError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Blocked(_) | FetchError::InvalidUrl(_) => false,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Status(status) => write!(f, "HTTP {}", status),
            FetchError::Transport(e) => write!(f, "request failed: {}", e),
            FetchError::Blocked(remaining) => {
                write!(f, "host blocked for another {}s", remaining.as_secs())
            }
            FetchError::InvalidUrl(url) => write!(f, "invalid url: {}", url),
        }
    }
}

/// Plain HTTP fetcher shared by every source and the link converter.
///
/// Requests rotate through the configured user agents, are paced per host
/// and retried with exponential backoff on 429, 5xx and transport errors.
#[derive(Clone)]
pub struct WebScraper {
    client: reqwest::Client,
    config: Arc<ScraperConfig>,
    limiter: Arc<DomainRateLimiter>,
    next_agent: Arc<AtomicUsize>,
}

impl WebScraper {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("pt-BR,pt;q=0.9,en;q=0.8"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .redirect(redirect::Policy::limited(10))
            .gzip(true)
            .default_headers(headers)
            .build()?;

        let limiter = DomainRateLimiter::new(
            Duration::from_millis(config.min_domain_interval_ms),
            Duration::from_secs(1),
            Duration::from_secs(config.max_backoff_secs),
        );

        Ok(Self {
            client,
            config: Arc::new(config),
            limiter: Arc::new(limiter),
            next_agent: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn limiter(&self) -> &DomainRateLimiter {
        &self.limiter
    }

    /// Round-robin over the configured user agents.
    pub fn next_user_agent(&self) -> &str {
        let agents = &self.config.user_agents;
        if agents.is_empty() {
            return FALLBACK_USER_AGENT;
        }
        let index = self.next_agent.fetch_add(1, Ordering::Relaxed) % agents.len();
        &agents[index]
    }

    /// Fetch a page. Failures are reported inside the result rather than as errors.
    pub async fn fetch_html(&self, url: &str) -> ScrapeResult {
        let start_time = Instant::now();

        let strategy = ExponentialBackoff::from_millis(2)
            .factor((self.config.retry_delay_ms / 2).max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.retry_attempts as usize);

        let outcome = RetryIf::spawn(
            strategy,
            || self.fetch_once(url),
            |e: &FetchError| {
                let retry = e.is_retryable();
                if retry {
                    tracing::debug!(url, error = %e, "Retrying fetch");
                }
                retry
            },
        )
        .await;

        let response_time_ms = start_time.elapsed().as_millis() as u64;
        match outcome {
            Ok((status, final_url, body)) => ScrapeResult {
                success: true,
                status: Some(status),
                html: Some(body),
                error: None,
                response_time_ms,
                final_url,
            },
            Err(e) => {
                tracing::warn!(url, error = %e, "Fetch failed");
                ScrapeResult {
                    success: false,
                    status: match &e {
                        FetchError::Status(status) => Some(status.as_u16()),
                        _ => None,
                    },
                    html: None,
                    error: Some(e.to_string()),
                    response_time_ms,
                    final_url: url.to_string(),
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<(u16, String, String), FetchError> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        self.limiter
            .acquire_within(&host, MAX_BLOCK_WAIT)
            .await
            .map_err(FetchError::Blocked)?;

        let response = match self
            .client
            .get(url)
            .header(USER_AGENT, self.next_user_agent())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.limiter.record_failure(&host, false).await;
                return Err(FetchError::Transport(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.limiter
                .record_failure(&host, status == StatusCode::TOO_MANY_REQUESTS)
                .await;
            return Err(FetchError::Status(status));
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(FetchError::Transport)?;
        self.limiter.record_success(&host).await;
        Ok((status.as_u16(), final_url, body))
    }

    /// HEAD request following redirects; the final URL, or the input when that fails.
    pub async fn resolve_redirect(&self, url: &str) -> String {
        let response = self
            .client
            .head(url)
            .header(USER_AGENT, self.next_user_agent())
            .send()
            .await;

        match response {
            Ok(response) => {
                let final_url = response.url().to_string();
                tracing::debug!(from = url, to = %final_url, "Resolved redirect");
                final_url
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Could not resolve redirect");
                url.to_string()
            }
        }
    }

    pub async fn test_connection(&self, url: &str) -> bool {
        self.fetch_html(url).await.success
    }
}

/// Parse a selector known at compile time.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| {
        tracing::error!(css, "Invalid CSS selector");
        Selector::parse("*:not(*)").expect("fallback selector parses")
    })
}

/// Collapsed text of the first element matching any of `selectors`.
pub fn select_text(element: &ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let sel = selector(css);
        element
            .select(&sel)
            .map(|el| element_text(&el))
            .find(|text| !text.is_empty())
    })
}

/// Attribute of the first element matching any of `selectors` that carries it.
pub fn select_attr(element: &ElementRef<'_>, selectors: &[&str], attr: &str) -> Option<String> {
    selectors.iter().find_map(|css| {
        let sel = selector(css);
        element
            .select(&sel)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    })
}

pub fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve `href` against `base`, keeping only http(s) results.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }
    let joined = Url::parse(base).ok()?.join(href).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}
