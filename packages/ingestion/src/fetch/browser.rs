//! Headless-browser fetcher.
//!
//! Drives a browserless-style rendering service over HTTP: POST the
//! target URL, wait for network idle, get back `document.outerHTML`.
//! On render failure a debug screenshot is captured into the raw-page
//! store next to where the HTML would have gone.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{FetchError, FetchErrorKind};
use crate::fetch::robots::RobotsCache;
use crate::fetch::{build_client, Conditional, FetchOutcome, Fetcher};
use crate::rawstore::{PayloadExt, RawPageMeta, RawPageStore};
use crate::types::Source;

/// Quiet window the renderer waits for before snapshotting the DOM.
const NETWORK_IDLE_MS: u64 = 500;

/// Ceiling on the in-page wait, independent of the HTTP timeout.
const RENDER_CEILING_MS: u64 = 15_000;

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    wait_for_idle_ms: u64,
    timeout_ms: u64,
}

pub struct BrowserFetcher {
    client: reqwest::Client,
    endpoint: String,
    robots: Arc<RobotsCache>,
    screenshots: Option<Arc<dyn RawPageStore>>,
}

impl BrowserFetcher {
    /// `endpoint` is the base URL of the rendering service, e.g.
    /// `http://browserless:3000`.
    pub fn new(cfg: &FetchConfig, endpoint: impl Into<String>, robots: Arc<RobotsCache>) -> Self {
        Self {
            client: build_client(cfg, cfg.render_timeout),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            robots,
            screenshots: None,
        }
    }

    /// Store debug screenshots of failed renders here.
    pub fn with_screenshot_store(mut self, store: Arc<dyn RawPageStore>) -> Self {
        self.screenshots = Some(store);
        self
    }

    async fn capture_failure_screenshot(&self, source: &Source, url: &str) {
        let Some(store) = &self.screenshots else {
            return;
        };

        let request = self
            .client
            .post(format!("{}/screenshot", self.endpoint))
            .json(&serde_json::json!({ "url": url }));

        match request.send().await {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(bytes) => {
                    let meta = RawPageMeta {
                        source_id: source.id,
                        url: url.to_string(),
                        status: 0,
                        headers: Default::default(),
                        fetched_at: Utc::now(),
                        ext: PayloadExt::Png,
                    };
                    if let Err(e) = store.put(&bytes, &meta).await {
                        warn!(url = %url, error = %e, "failed to store render screenshot");
                    }
                }
                Err(e) => warn!(url = %url, error = %e, "failed to read render screenshot"),
            },
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "screenshot endpoint refused")
            }
            Err(e) => warn!(url = %url, error = %e, "screenshot request failed"),
        }
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, source: &Source, _cond: &Conditional) -> Result<FetchOutcome, FetchError> {
        let url_str = source.careers_url.as_str();
        let url = Url::parse(url_str).map_err(|e| {
            FetchError::new(FetchErrorKind::Dns, format!("invalid URL {}: {}", url_str, e))
        })?;

        if !self.robots.allows(&url, source.ignore_robots).await {
            return Err(FetchError::new(
                FetchErrorKind::RobotsDenied,
                format!("robots.txt disallows {}", url),
            ));
        }

        let started = Instant::now();
        let request = RenderRequest {
            url: url_str,
            wait_for_idle_ms: NETWORK_IDLE_MS,
            timeout_ms: RENDER_CEILING_MS,
        };

        let response = self
            .client
            .post(format!("{}/content", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let inner = FetchError::from_reqwest(&e);
                FetchError::new(
                    FetchErrorKind::RenderFailure,
                    format!("render service unreachable: {}", inner.message),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            self.capture_failure_screenshot(source, url_str).await;
            return Err(FetchError::new(
                FetchErrorKind::RenderFailure,
                format!("render service returned HTTP {} for {}", status.as_u16(), url_str),
            ));
        }

        let body = response.text().await.map_err(|e| {
            FetchError::new(FetchErrorKind::RenderFailure, format!("render body unreadable: {}", e))
        })?;

        if body.trim().is_empty() {
            self.capture_failure_screenshot(source, url_str).await;
            return Err(FetchError::new(
                FetchErrorKind::RenderFailure,
                format!("render produced empty DOM for {}", url_str),
            ));
        }

        debug!(url = %url_str, bytes = body.len(), "page rendered");

        Ok(FetchOutcome {
            status: 200,
            body: Some(body),
            content_type: Some("text/html".to_string()),
            etag: None,
            last_modified: None,
            final_url: url_str.to_string(),
            elapsed: started.elapsed(),
            not_modified: false,
            headers: Default::default(),
        })
    }

    fn name(&self) -> &str {
        "browser"
    }
}
