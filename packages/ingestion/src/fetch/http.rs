//! HTML page fetcher.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::config::FetchConfig;
use crate::error::{FetchError, FetchErrorKind};
use crate::fetch::robots::RobotsCache;
use crate::fetch::{
    apply_conditional, build_client, collect_headers, header_string, read_capped, status_error,
    Conditional, FetchOutcome, Fetcher,
};
use crate::types::Source;

/// Fetches a career page over plain HTTP with conditional headers and a
/// size cap.
pub struct HtmlFetcher {
    client: reqwest::Client,
    robots: Arc<RobotsCache>,
    max_bytes: usize,
}

impl HtmlFetcher {
    pub fn new(cfg: &FetchConfig, robots: Arc<RobotsCache>) -> Self {
        Self {
            client: build_client(cfg, cfg.html_timeout),
            robots,
            max_bytes: cfg.html_max_bytes,
        }
    }

    pub(crate) async fn fetch_url(
        &self,
        url_str: &str,
        cond: &Conditional,
        ignore_robots: bool,
    ) -> Result<FetchOutcome, FetchError> {
        let url = Url::parse(url_str).map_err(|e| {
            FetchError::new(FetchErrorKind::Dns, format!("invalid URL {}: {}", url_str, e))
        })?;

        if !self.robots.allows(&url, ignore_robots).await {
            return Err(FetchError::new(
                FetchErrorKind::RobotsDenied,
                format!("robots.txt disallows {}", url),
            ));
        }

        let started = Instant::now();
        let request = apply_conditional(self.client.get(url.clone()), cond);
        let response = request.send().await.map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());
        let etag = header_string(response.headers(), header::ETAG);
        let last_modified = header_string(response.headers(), header::LAST_MODIFIED);
        let content_type = header_string(response.headers(), header::CONTENT_TYPE);

        if status == StatusCode::NOT_MODIFIED {
            debug!(url = %url, "304 not modified");
            return Ok(FetchOutcome {
                status: status.as_u16(),
                body: None,
                content_type,
                etag: etag.or_else(|| cond.etag.clone()),
                last_modified: last_modified.or_else(|| cond.last_modified.clone()),
                final_url,
                elapsed: started.elapsed(),
                not_modified: true,
                headers,
            });
        }

        if !status.is_success() {
            return Err(status_error(status, url.as_str()));
        }

        let body = read_capped(response, self.max_bytes, url.as_str()).await?;

        debug!(url = %url, bytes = body.len(), elapsed_ms = started.elapsed().as_millis() as u64, "page fetched");

        Ok(FetchOutcome {
            status: status.as_u16(),
            body: Some(body),
            content_type,
            etag,
            last_modified,
            final_url,
            elapsed: started.elapsed(),
            not_modified: false,
            headers,
        })
    }
}

#[async_trait]
impl Fetcher for HtmlFetcher {
    async fn fetch(&self, source: &Source, cond: &Conditional) -> Result<FetchOutcome, FetchError> {
        self.fetch_url(&source.careers_url, cond, source.ignore_robots)
            .await
    }

    fn name(&self) -> &str {
        "html"
    }
}
