//! Admin RPC surface consumed by the admin layer.
//!
//! Library-level service: the HTTP layer on top of it is out of scope.
//! Covers manual triggers, fetch probes, extraction dry-runs, log and
//! coverage reads, and the soft-delete/restore contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::observe::{ExtractionLog, FailedInsert, ObservabilityStore, SourceCoverage};
use crate::pipeline::Pipeline;
use crate::schedule::SourceStore;
use crate::secrets::{self, SecretResolver};
use crate::sink::SinkHandle;
use crate::types::{NewJob, SourceStatus, SourceType};
use crate::upsert::JobStore;

/// Headers removed (by name or pattern) before a probe response leaves
/// the service.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];
const SENSITIVE_PATTERNS: &[&str] = &["secret", "token", "key"];

/// Strip credentials and anything credential-shaped.
pub fn sanitize_headers(headers: &std::collections::HashMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.to_lowercase();
            !SENSITIVE_HEADERS.contains(&name.as_str())
                && !SENSITIVE_PATTERNS.iter().any(|p| name.contains(p))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct RunAccepted {
    pub accepted: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub ok: bool,
    pub status: Option<u16>,
    pub host: Option<String>,
    pub size: usize,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub missing_secrets: Vec<String>,
    /// Response headers after sanitization
    pub headers_sanitized: BTreeMap<String, String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulateReport {
    pub ok: bool,
    pub count: usize,
    /// First three normalized jobs
    pub sample: Vec<NewJob>,
    pub error: Option<String>,
    pub error_category: Option<String>,
}

pub struct AdminService {
    sources: Arc<dyn SourceStore>,
    pipeline: Arc<Pipeline>,
    observe: Arc<dyn ObservabilityStore>,
    jobs: Arc<dyn JobStore>,
    sink: SinkHandle,
    secrets: Arc<dyn SecretResolver>,
}

impl AdminService {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        pipeline: Arc<Pipeline>,
        observe: Arc<dyn ObservabilityStore>,
        jobs: Arc<dyn JobStore>,
        sink: SinkHandle,
        secrets: Arc<dyn SecretResolver>,
    ) -> Self {
        Self {
            sources,
            pipeline,
            observe,
            jobs,
            sink,
            secrets,
        }
    }

    /// Schedule an immediate run for a source.
    pub async fn run(&self, source_id: Uuid) -> StoreResult<RunAccepted> {
        let Some(source) = self.sources.get(source_id).await? else {
            return Ok(RunAccepted {
                accepted: false,
                reason: Some("source not found".to_string()),
            });
        };
        if source.status != SourceStatus::Active {
            return Ok(RunAccepted {
                accepted: false,
                reason: Some(format!("source is {}", source.status.as_str())),
            });
        }

        let accepted = self.sources.request_run(source_id, Utc::now()).await?;
        Ok(RunAccepted {
            accepted,
            reason: (!accepted).then(|| "a run is already in flight".to_string()),
        })
    }

    /// Fetch-only probe. Secrets are checked before any network I/O so
    /// misconfigured api sources fail fast with `missing_secrets`.
    pub async fn test(&self, source_id: Uuid) -> StoreResult<TestReport> {
        let Some(source) = self.sources.get(source_id).await? else {
            return Ok(TestReport {
                ok: false,
                status: None,
                host: None,
                size: 0,
                etag: None,
                last_modified: None,
                missing_secrets: Vec::new(),
                headers_sanitized: BTreeMap::new(),
                error: Some("source not found".to_string()),
            });
        };

        let host = source.host();

        if source.source_type == SourceType::Api {
            match source.api_hint() {
                Ok(hint) => {
                    let missing = secrets::missing(self.secrets.as_ref(), &hint.secret_refs());
                    if !missing.is_empty() {
                        return Ok(TestReport {
                            ok: false,
                            status: None,
                            host,
                            size: 0,
                            etag: None,
                            last_modified: None,
                            missing_secrets: missing,
                            headers_sanitized: BTreeMap::new(),
                            error: Some("unresolved secret references".to_string()),
                        });
                    }
                }
                Err(e) => {
                    return Ok(TestReport {
                        ok: false,
                        status: None,
                        host,
                        size: 0,
                        etag: None,
                        last_modified: None,
                        missing_secrets: Vec::new(),
                        headers_sanitized: BTreeMap::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        match self.pipeline.probe(&source).await {
            Ok(outcome) => Ok(TestReport {
                ok: true,
                status: Some(outcome.status),
                host,
                size: outcome.body_len(),
                etag: outcome.etag.clone(),
                last_modified: outcome.last_modified.clone(),
                missing_secrets: Vec::new(),
                headers_sanitized: sanitize_headers(&outcome.headers),
                error: None,
            }),
            Err(e) => Ok(TestReport {
                ok: false,
                status: None,
                host,
                size: 0,
                etag: None,
                last_modified: None,
                missing_secrets: Vec::new(),
                headers_sanitized: BTreeMap::new(),
                error: Some(e.to_string()),
            }),
        }
    }

    /// Fetch + extract without upsert; returns the first three jobs.
    pub async fn simulate_extract(&self, source_id: Uuid) -> StoreResult<SimulateReport> {
        let Some(source) = self.sources.get(source_id).await? else {
            return Ok(SimulateReport {
                ok: false,
                count: 0,
                sample: Vec::new(),
                error: Some("source not found".to_string()),
                error_category: None,
            });
        };

        match self.pipeline.simulate(&source).await {
            Ok((extraction, jobs)) => Ok(SimulateReport {
                ok: true,
                count: extraction.candidates.len(),
                sample: jobs.into_iter().take(3).collect(),
                error: None,
                error_category: None,
            }),
            Err(e) => Ok(SimulateReport {
                ok: false,
                count: 0,
                sample: Vec::new(),
                error: Some(e.to_string()),
                error_category: Some(e.kind().to_string()),
            }),
        }
    }

    /// Latest extraction log rows for a source.
    pub async fn logs(&self, source_id: Uuid, limit: usize) -> StoreResult<Vec<ExtractionLog>> {
        self.observe.recent_logs(source_id, limit).await
    }

    /// Coverage aggregates over a trailing window.
    pub async fn coverage(&self, hours: u32) -> StoreResult<Vec<SourceCoverage>> {
        self.observe.coverage(hours).await
    }

    /// Failed inserts filtered to validation failures.
    pub async fn validation_errors(
        &self,
        source_id: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<FailedInsert>> {
        self.observe.validation_failures(source_id, limit).await
    }

    /// Soft delete: sets `{deleted_at, deleted_by, deletion_reason}`
    /// atomically and removes the job from the search index.
    pub async fn soft_delete_job(&self, id: Uuid, deleted_by: &str, reason: &str) -> StoreResult<()> {
        self.jobs.soft_delete(id, deleted_by, reason).await?;
        self.sink.enqueue_delete(id).await;
        info!(job_id = %id, deleted_by, "job soft-deleted");
        Ok(())
    }

    /// Restore clears the deletion triple and re-enters the job into
    /// the search index through the normal sink path.
    pub async fn restore_job(&self, id: Uuid) -> StoreResult<bool> {
        let Some(record) = self.jobs.restore(id).await? else {
            return Ok(false);
        };
        self.sink
            .enqueue_upserts(vec![crate::sink::SearchDocument {
                id: record.id,
                document: record.job.search_document(record.id),
            }])
            .await;
        info!(job_id = %id, "job restored");
        Ok(true)
    }

    /// Hard delete requires a non-empty reason and also removes the row
    /// from the search index.
    pub async fn hard_delete_job(&self, id: Uuid, reason: &str) -> StoreResult<bool> {
        if reason.trim().is_empty() {
            return Ok(false);
        }
        self.jobs.hard_delete(id).await?;
        self.sink.enqueue_delete(id).await;
        info!(job_id = %id, reason, "job hard-deleted");
        Ok(true)
    }

    /// Mark a failed-insert ledger row resolved.
    pub async fn resolve_failed_insert(&self, id: Uuid, notes: &str) -> StoreResult<()> {
        self.observe.resolve_failed_insert(id, notes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitization_removes_credential_headers() {
        let mut headers = std::collections::HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        headers.insert("authorization".to_string(), "Bearer abc".to_string());
        headers.insert("cookie".to_string(), "session=1".to_string());
        headers.insert("set-cookie".to_string(), "session=1".to_string());
        headers.insert("x-api-key".to_string(), "k".to_string());
        headers.insert("x-csrf-token".to_string(), "t".to_string());
        headers.insert("x-client-secret".to_string(), "s".to_string());
        headers.insert("etag".to_string(), "\"abc\"".to_string());

        let sanitized = sanitize_headers(&headers);
        assert_eq!(sanitized.len(), 2);
        assert!(sanitized.contains_key("content-type"));
        assert!(sanitized.contains_key("etag"));
    }
}
