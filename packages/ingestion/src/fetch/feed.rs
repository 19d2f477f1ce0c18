//! RSS/Atom feed fetcher.
//!
//! Transport only: parsing the feed body is the extractor's job.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::fetch::{
    apply_conditional, build_client, collect_headers, header_string, read_capped, status_error,
    Conditional, FetchOutcome, Fetcher,
};
use crate::types::Source;

pub struct FeedFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl FeedFetcher {
    pub fn new(cfg: &FetchConfig) -> Self {
        Self {
            client: build_client(cfg, cfg.feed_timeout),
            max_bytes: cfg.feed_max_bytes,
        }
    }
}

#[async_trait]
impl Fetcher for FeedFetcher {
    async fn fetch(&self, source: &Source, cond: &Conditional) -> Result<FetchOutcome, FetchError> {
        let url = &source.careers_url;
        let started = Instant::now();

        let request = apply_conditional(self.client.get(url), cond)
            .header(header::ACCEPT, "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8");
        let response = request.send().await.map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());
        let etag = header_string(response.headers(), header::ETAG);
        let last_modified = header_string(response.headers(), header::LAST_MODIFIED);
        let content_type = header_string(response.headers(), header::CONTENT_TYPE);

        if status == StatusCode::NOT_MODIFIED {
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
            return Err(status_error(status, url));
        }

        let body = read_capped(response, self.max_bytes, url).await?;
        debug!(url = %url, bytes = body.len(), "feed fetched");

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

    fn name(&self) -> &str {
        "feed"
    }
}
