//! JSON/REST endpoint fetcher.
//!
//! Builds the request from the source's strict `v:1` parser hint,
//! resolving `SECRET:NAME` indirection just-in-time. Secrets never land
//! in logs or in the returned headers map.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::{FetchError, FetchErrorKind};
use crate::fetch::{
    apply_conditional, build_client, collect_headers, header_string, read_capped, status_error,
    Conditional, FetchOutcome, Fetcher,
};
use crate::secrets::{self, SecretResolver};
use crate::types::{ApiAuth, Source};

pub struct ApiFetcher {
    client: reqwest::Client,
    secrets: Arc<dyn SecretResolver>,
    max_bytes: usize,
}

impl ApiFetcher {
    pub fn new(cfg: &FetchConfig, secrets: Arc<dyn SecretResolver>) -> Self {
        Self {
            client: build_client(cfg, cfg.api_timeout),
            secrets,
            max_bytes: cfg.api_max_bytes,
        }
    }

    fn resolve(&self, value: &str) -> Result<String, FetchError> {
        secrets::expand(self.secrets.as_ref(), value).map_err(|name| {
            FetchError::new(
                FetchErrorKind::Http4xx(401),
                format!("unresolved secret reference: {}", name),
            )
        })
    }
}

#[async_trait]
impl Fetcher for ApiFetcher {
    async fn fetch(&self, source: &Source, cond: &Conditional) -> Result<FetchOutcome, FetchError> {
        let hint = source.api_hint().map_err(|e| {
            FetchError::new(FetchErrorKind::Http4xx(400), format!("bad parser_hint: {}", e))
        })?;

        let mut url = hint.request_url();
        let mut request = self.client.get(&url);

        match &hint.auth {
            ApiAuth::Bearer { value } => {
                let token = self.resolve(value)?;
                request = request.bearer_auth(token);
            }
            ApiAuth::Header { name, value } => {
                let value = self.resolve(value)?;
                request = request.header(name.as_str(), value);
            }
            ApiAuth::Query { name, value } => {
                let value = self.resolve(value)?;
                let sep = if url.contains('?') { '&' } else { '?' };
                url = format!("{}{}{}={}", url, sep, name, value);
                request = self.client.get(&url);
            }
            ApiAuth::None => {}
        }

        let started = Instant::now();
        let request = apply_conditional(request, cond).header(header::ACCEPT, "application/json");
        let response = request.send().await.map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        // Report the unauthenticated URL so query-string credentials never
        // reach sidecars or logs.
        let final_url = hint.request_url();
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
            return Err(status_error(status, &hint.request_url()));
        }

        let body = read_capped(response, self.max_bytes, &hint.request_url()).await?;
        debug!(source = %source.name, bytes = body.len(), "api payload fetched");

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
        "api"
    }
}
