//! Fetch adapters for the three source types plus the headless renderer.
//!
//! Each adapter returns a normalized [`FetchResult`] or a
//! [`FetchError`] with a stable kind. Conditional headers are sent when
//! the previous run recorded an etag or last-modified stamp; a `304`
//! comes back as a result with `not_modified = true` and no body.

pub mod api;
pub mod browser;
pub mod feed;
pub mod http;
pub mod robots;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap};
use reqwest::StatusCode;
use tracing::warn;

use crate::config::FetchConfig;
use crate::error::{FetchError, FetchErrorKind};
use crate::types::Source;

pub use api::ApiFetcher;
pub use browser::BrowserFetcher;
pub use feed::FeedFetcher;
pub use http::HtmlFetcher;
pub use robots::RobotsCache;

/// Conditional-request state carried over from the previous run.
#[derive(Debug, Clone, Default)]
pub struct Conditional {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Conditional {
    pub fn from_source(source: &Source) -> Self {
        Self {
            etag: source.etag.clone(),
            last_modified: source.last_modified.clone(),
        }
    }
}

/// Normalized outcome of one fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: u16,
    /// Absent on 304
    pub body: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// URL after redirects
    pub final_url: String,
    pub elapsed: Duration,
    pub not_modified: bool,
    /// Response headers, lowercased names (the admin probe sanitizes them)
    pub headers: HashMap<String, String>,
}

impl FetchOutcome {
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map(|b| b.len()).unwrap_or(0)
    }
}

/// A fetch adapter for one source type.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &Source, cond: &Conditional) -> Result<FetchOutcome, FetchError>;

    fn name(&self) -> &str;
}

/// Build the shared reqwest client the adapters use.
///
/// Browser-like Accept headers cut down on bot blocks from career-page
/// CDNs; redirects are capped at 5.
pub fn build_client(cfg: &FetchConfig, timeout: Duration) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8"
            .parse()
            .expect("static header"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        "en-US,en;q=0.5".parse().expect("static header"),
    );

    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(cfg.user_agent.clone())
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .expect("reqwest client construction cannot fail with static config")
}

/// Map a non-success status to a fetch error.
pub(crate) fn status_error(status: StatusCode, url: &str) -> FetchError {
    let code = status.as_u16();
    let kind = if status.is_client_error() {
        FetchErrorKind::Http4xx(code)
    } else {
        FetchErrorKind::Http5xx(code)
    };
    FetchError::new(kind, format!("HTTP {} for {}", code, url))
}

/// Read a body up to `cap` bytes, erroring instead of truncating.
pub(crate) async fn read_capped(
    response: reqwest::Response,
    cap: usize,
    url: &str,
) -> Result<String, FetchError> {
    if let Some(len) = response.content_length() {
        if len as usize > cap {
            return Err(FetchError::new(
                FetchErrorKind::PayloadTooLarge,
                format!("{} declared {} bytes (cap {})", url, len, cap),
            ));
        }
    }

    let mut bytes: Vec<u8> = Vec::new();
    let mut stream = response;
    while let Some(chunk) = stream.chunk().await.map_err(|e| FetchError::from_reqwest(&e))? {
        if bytes.len() + chunk.len() > cap {
            return Err(FetchError::new(
                FetchErrorKind::PayloadTooLarge,
                format!("{} exceeded cap of {} bytes", url, cap),
            ));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Collect response headers with lowercased names.
pub(crate) fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|v| (k.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

pub(crate) fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Decorate a GET request with conditional headers.
pub(crate) fn apply_conditional(
    request: reqwest::RequestBuilder,
    cond: &Conditional,
) -> reqwest::RequestBuilder {
    let mut request = request;
    if let Some(etag) = &cond.etag {
        request = request.header(header::IF_NONE_MATCH, etag);
    }
    if let Some(lm) = &cond.last_modified {
        request = request.header(header::IF_MODIFIED_SINCE, lm);
    }
    request
}

/// Run a fetch with the configured per-request retries. Retries apply
/// only to retriable kinds; permanent errors surface immediately.
pub async fn fetch_with_retries(
    fetcher: &dyn Fetcher,
    source: &Source,
    cond: &Conditional,
    cfg: &FetchConfig,
) -> Result<FetchOutcome, FetchError> {
    let mut last_err: Option<FetchError> = None;

    for attempt in 0..=cfg.retries {
        if attempt > 0 {
            let backoff = cfg
                .retry_backoff
                .get((attempt - 1) as usize)
                .copied()
                .unwrap_or_else(|| Duration::from_secs(4));
            tokio::time::sleep(backoff).await;
        }

        match fetcher.fetch(source, cond).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.retriable() && attempt < cfg.retries => {
                warn!(
                    source = %source.name,
                    url = %source.careers_url,
                    attempt,
                    kind = e.kind.as_str(),
                    "fetch failed, retrying"
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.expect("loop either returned or stored an error"))
}
