//! Search-index sink.
//!
//! Committed upserts stream to an external search index as `{id,
//! document}` documents; deletes ship `{id}`. Delivery is at-least-once
//! and idempotent on `id`. Failures retry with exponential backoff
//! in-process; once retries are spent the sink counts the failure and
//! moves on — it never blocks pipeline progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SinkConfig;
use crate::error::SinkError;

/// One document headed for the index.
#[derive(Debug, Clone)]
pub struct SearchDocument {
    pub id: Uuid,
    pub document: Value,
}

/// The external index, reduced to the two operations the pipeline needs.
#[async_trait]
pub trait SearchSink: Send + Sync {
    async fn upsert(&self, documents: &[SearchDocument]) -> Result<(), SinkError>;

    async fn delete(&self, ids: &[Uuid]) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: SearchSink + ?Sized> SearchSink for Arc<S> {
    async fn upsert(&self, documents: &[SearchDocument]) -> Result<(), SinkError> {
        (**self).upsert(documents).await
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), SinkError> {
        (**self).delete(ids).await
    }
}

/// Retry/backoff decorator around any sink.
pub struct RetryingSink<S: SearchSink> {
    inner: S,
    max_attempts: u32,
    base_backoff: Duration,
    consecutive_failures: AtomicU64,
}

impl<S: SearchSink> RetryingSink<S> {
    pub fn new(inner: S, cfg: &SinkConfig) -> Self {
        Self {
            inner,
            max_attempts: cfg.max_attempts.max(1),
            base_backoff: cfg.base_backoff,
            consecutive_failures: AtomicU64::new(0),
        }
    }

    /// Exhausted-retry events since the last success.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    async fn with_retries<F, Fut>(&self, what: &str, op: F) -> Result<(), SinkError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), SinkError>>,
    {
        let mut last_err: Option<SinkError> = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let backoff = self.base_backoff * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }
            match op().await {
                Ok(()) => {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    debug!(what, attempt, error = %e, "sink attempt failed");
                    last_err = Some(e);
                }
            }
        }
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        Err(last_err.expect("at least one attempt ran"))
    }
}

#[async_trait]
impl<S: SearchSink> SearchSink for RetryingSink<S> {
    async fn upsert(&self, documents: &[SearchDocument]) -> Result<(), SinkError> {
        self.with_retries("upsert", || self.inner.upsert(documents)).await
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), SinkError> {
        self.with_retries("delete", || self.inner.delete(ids)).await
    }
}

/// Shared, non-blocking handle the pipeline uses. Errors are logged and
/// absorbed here so callers never stall on the index.
#[derive(Clone)]
pub struct SinkHandle {
    sink: Arc<dyn SearchSink>,
}

impl SinkHandle {
    pub fn new(sink: Arc<dyn SearchSink>) -> Self {
        Self { sink }
    }

    /// A handle that drops everything, for pipelines without an index.
    pub fn disabled() -> Self {
        Self {
            sink: Arc::new(NullSink),
        }
    }

    pub async fn enqueue_upserts(&self, documents: Vec<SearchDocument>) {
        if documents.is_empty() {
            return;
        }
        if let Err(e) = self.sink.upsert(&documents).await {
            warn!(count = documents.len(), error = %e, "search sink upsert dropped");
        }
    }

    pub async fn enqueue_delete(&self, id: Uuid) {
        if let Err(e) = self.sink.delete(&[id]).await {
            warn!(id = %id, error = %e, "search sink delete dropped");
        }
    }
}

struct NullSink;

#[async_trait]
impl SearchSink for NullSink {
    async fn upsert(&self, _documents: &[SearchDocument]) -> Result<(), SinkError> {
        Ok(())
    }

    async fn delete(&self, _ids: &[Uuid]) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Document-API sink over HTTP (Meilisearch-style endpoints).
pub struct HttpSearchSink {
    client: reqwest::Client,
    base_url: String,
    index: String,
    api_key: Option<String>,
}

impl HttpSearchSink {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request
    }
}

#[async_trait]
impl SearchSink for HttpSearchSink {
    async fn upsert(&self, documents: &[SearchDocument]) -> Result<(), SinkError> {
        let body: Vec<&Value> = documents.iter().map(|d| &d.document).collect();
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/indexes/{}/documents", self.index),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError(format!(
                "index returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), SinkError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/indexes/{}/documents/delete-batch", self.index),
            )
            .json(&ids)
            .send()
            .await
            .map_err(|e| SinkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError(format!(
                "index returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemorySink {
    documents: RwLock<std::collections::HashMap<Uuid, Value>>,
    /// Failures to serve before succeeding, for retry tests
    fail_next: AtomicU64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_times(times: u64) -> Self {
        let sink = Self::new();
        sink.fail_next.store(times, Ordering::SeqCst);
        sink
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.documents.read().await.contains_key(&id)
    }

    fn should_fail(&self) -> bool {
        loop {
            let left = self.fail_next.load(Ordering::SeqCst);
            if left == 0 {
                return false;
            }
            if self
                .fail_next
                .compare_exchange(left, left - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }
}

#[async_trait]
impl SearchSink for MemorySink {
    async fn upsert(&self, documents: &[SearchDocument]) -> Result<(), SinkError> {
        if self.should_fail() {
            return Err(SinkError("simulated index outage".to_string()));
        }
        let mut map = self.documents.write().await;
        for doc in documents {
            map.insert(doc.id, doc.document.clone());
        }
        Ok(())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), SinkError> {
        if self.should_fail() {
            return Err(SinkError("simulated index outage".to_string()));
        }
        let mut map = self.documents.write().await;
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: Uuid) -> SearchDocument {
        SearchDocument {
            id,
            document: serde_json::json!({ "id": id, "title": "Role" }),
        }
    }

    fn fast_cfg(attempts: u32) -> SinkConfig {
        SinkConfig {
            max_attempts: attempts,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_recover_transient_outages() {
        let sink = RetryingSink::new(MemorySink::failing_times(2), &fast_cfg(5));
        let id = Uuid::new_v4();

        sink.upsert(&[doc(id)]).await.unwrap();
        assert_eq!(sink.consecutive_failures(), 0);
        assert!(sink.inner.contains(id).await);
    }

    #[tokio::test]
    async fn exhausted_retries_count_but_do_not_panic() {
        let sink = RetryingSink::new(MemorySink::failing_times(10), &fast_cfg(3));
        let err = sink.upsert(&[doc(Uuid::new_v4())]).await.unwrap_err();
        assert!(err.to_string().contains("search_unavailable"));
        assert_eq!(sink.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn handle_absorbs_failures() {
        let handle = SinkHandle::new(Arc::new(RetryingSink::new(
            MemorySink::failing_times(100),
            &fast_cfg(2),
        )));
        // Must not error or block
        handle.enqueue_upserts(vec![doc(Uuid::new_v4())]).await;
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_id() {
        let sink = MemorySink::new();
        let id = Uuid::new_v4();
        sink.upsert(&[doc(id)]).await.unwrap();
        sink.upsert(&[doc(id)]).await.unwrap();
        assert_eq!(sink.len().await, 1);
    }
}
