//! In-memory observability store for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::observe::{
    ExtractionLog, FailedInsert, FailedOp, NewExtractionLog, NewFailedInsert, ObservabilityStore,
    RawPageRecord, SourceCoverage,
};
use crate::rawstore::RawPageMeta;

#[derive(Default)]
pub struct MemoryObservabilityStore {
    raw_pages: RwLock<Vec<RawPageRecord>>,
    logs: RwLock<Vec<ExtractionLog>>,
    failed: RwLock<Vec<FailedInsert>>,
    /// (source_id → (inserted, updated)) fed by the upsert engine via logs
    counts: RwLock<HashMap<Uuid, (u64, u64)>>,
}

impl MemoryObservabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn raw_pages(&self) -> Vec<RawPageRecord> {
        self.raw_pages.read().await.clone()
    }

    pub async fn logs(&self) -> Vec<ExtractionLog> {
        self.logs.read().await.clone()
    }

    pub async fn failed_inserts(&self) -> Vec<FailedInsert> {
        self.failed.read().await.clone()
    }

    /// Test hook mirroring what the coverage view reads in Postgres.
    pub async fn note_upserts(&self, source_id: Uuid, inserted: u64, updated: u64) {
        let mut counts = self.counts.write().await;
        let entry = counts.entry(source_id).or_insert((0, 0));
        entry.0 += inserted;
        entry.1 += updated;
    }
}

#[async_trait]
impl ObservabilityStore for MemoryObservabilityStore {
    async fn record_raw_page(
        &self,
        meta: &RawPageMeta,
        storage_path: &str,
        content_length: usize,
    ) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        self.raw_pages.write().await.push(RawPageRecord {
            id,
            source_id: meta.source_id,
            url: meta.url.clone(),
            status: meta.status,
            http_headers: meta.headers.clone(),
            storage_path: storage_path.to_string(),
            content_length,
            fetched_at: meta.fetched_at,
        });
        Ok(id)
    }

    async fn record_log(&self, log: NewExtractionLog) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        self.logs.write().await.push(ExtractionLog {
            id,
            source_id: log.source_id,
            raw_page_id: log.raw_page_id,
            url: log.url,
            status: log.status,
            reason: log.reason,
            extracted_fields: log.extracted_fields,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn record_failed_insert(&self, failed: NewFailedInsert) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        self.failed.write().await.push(FailedInsert {
            id,
            source_id: failed.source_id,
            source_url: failed.source_url,
            error: failed.error,
            payload: failed.payload,
            raw_page_id: failed.raw_page_id,
            attempt_at: Utc::now(),
            operation: failed.operation,
            resolved_at: None,
            resolution_notes: None,
        });
        Ok(id)
    }

    async fn recent_logs(&self, source_id: Uuid, limit: usize) -> StoreResult<Vec<ExtractionLog>> {
        let logs = self.logs.read().await;
        let mut out: Vec<ExtractionLog> = logs
            .iter()
            .filter(|l| l.source_id == source_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn validation_failures(
        &self,
        source_id: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<FailedInsert>> {
        let failed = self.failed.read().await;
        let mut out: Vec<FailedInsert> = failed
            .iter()
            .filter(|f| f.operation == FailedOp::Validation)
            .filter(|f| source_id.map(|id| f.source_id == id).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.attempt_at.cmp(&a.attempt_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn coverage(&self, window_hours: u32) -> StoreResult<Vec<SourceCoverage>> {
        let cutoff = Utc::now() - Duration::hours(window_hours as i64);
        let logs = self.logs.read().await;
        let counts = self.counts.read().await;

        let mut discovered: HashMap<Uuid, std::collections::HashSet<String>> = HashMap::new();
        for log in logs.iter().filter(|l| l.created_at >= cutoff) {
            discovered
                .entry(log.source_id)
                .or_default()
                .insert(log.url.clone());
        }

        Ok(discovered
            .into_iter()
            .map(|(source_id, urls)| {
                let (inserted, updated) = counts.get(&source_id).copied().unwrap_or((0, 0));
                SourceCoverage::compute(source_id, urls.len() as u64, inserted, updated)
            })
            .collect())
    }

    async fn resolve_failed_insert(&self, id: Uuid, notes: &str) -> StoreResult<()> {
        let mut failed = self.failed.write().await;
        if let Some(row) = failed.iter_mut().find(|f| f.id == id) {
            row.resolved_at = Some(Utc::now());
            row.resolution_notes = Some(notes.to_string());
        }
        Ok(())
    }
}
