//! Observability substrate: raw-page sidecars, extraction logs, the
//! failed-insert ledger, and coverage aggregates.
//!
//! `extraction_logs` and `failed_inserts` are append-only; only
//! `resolved_at`/`resolution_notes` ever change, and only through the
//! admin path.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{NewJob, RunStatus};

pub use memory::MemoryObservabilityStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresObservabilityStore;

/// Sidecar row for one stored raw page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPageRecord {
    pub id: Uuid,
    pub source_id: Uuid,
    pub url: String,
    pub status: u16,
    pub http_headers: HashMap<String, String>,
    pub storage_path: String,
    pub content_length: usize,
    pub fetched_at: DateTime<Utc>,
}

/// One summary row per source run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionLog {
    pub id: Uuid,
    pub source_id: Uuid,
    pub raw_page_id: Option<Uuid>,
    pub url: String,
    pub status: RunStatus,
    pub reason: Option<String>,
    pub extracted_fields: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a new extraction log row.
#[derive(Debug, Clone)]
pub struct NewExtractionLog {
    pub source_id: Uuid,
    pub raw_page_id: Option<Uuid>,
    pub url: String,
    pub status: RunStatus,
    pub reason: Option<String>,
    pub extracted_fields: Vec<String>,
}

/// Which operation a failed insert came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailedOp {
    Insert,
    Update,
    Validation,
    Process,
}

impl FailedOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Validation => "validation",
            Self::Process => "process",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "validation" => Some(Self::Validation),
            "process" => Some(Self::Process),
            _ => None,
        }
    }
}

/// Ledger row: one candidate that did not persist, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedInsert {
    pub id: Uuid,
    pub source_id: Uuid,
    pub source_url: String,
    pub error: String,
    pub payload: Value,
    pub raw_page_id: Option<Uuid>,
    pub attempt_at: DateTime<Utc>,
    pub operation: FailedOp,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewFailedInsert {
    pub source_id: Uuid,
    pub source_url: String,
    pub error: String,
    pub payload: Value,
    pub raw_page_id: Option<Uuid>,
    pub operation: FailedOp,
}

impl NewFailedInsert {
    /// Ledger entry for a job blocked by validation. The payload carries
    /// the offending job plus `validation_error`, always populated.
    pub fn validation(source_id: Uuid, job: &NewJob, error: &crate::error::HardError, raw_page_id: Option<Uuid>) -> Self {
        let mut payload = serde_json::to_value(job).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut payload {
            map.insert(
                "validation_error".to_string(),
                Value::String(error.to_string()),
            );
        }
        Self {
            source_id,
            source_url: job.apply_url.clone(),
            error: error.to_string(),
            payload,
            raw_page_id,
            operation: FailedOp::Validation,
        }
    }

    /// Ledger entry for an upsert failure.
    pub fn upsert(source_id: Uuid, job: &NewJob, error: &str, operation: FailedOp, raw_page_id: Option<Uuid>) -> Self {
        Self {
            source_id,
            source_url: job.apply_url.clone(),
            error: error.to_string(),
            payload: serde_json::to_value(job).unwrap_or(Value::Null),
            raw_page_id,
            operation,
        }
    }
}

/// Coverage health per source over a time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageLevel {
    Ok,
    Warning,
    Critical,
}

impl CoverageLevel {
    /// warning above 5% mismatch, critical above 10%.
    pub fn from_mismatch(mismatch_pct: f64) -> Self {
        if mismatch_pct > 0.10 {
            Self::Critical
        } else if mismatch_pct > 0.05 {
            Self::Warning
        } else {
            Self::Ok
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCoverage {
    pub source_id: Uuid,
    pub discovered_urls: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub mismatch_pct: f64,
    pub level: CoverageLevel,
}

impl SourceCoverage {
    pub fn compute(source_id: Uuid, discovered_urls: u64, rows_inserted: u64, rows_updated: u64) -> Self {
        let mismatch_pct = if discovered_urls == 0 {
            0.0
        } else {
            (1.0 - rows_inserted as f64 / discovered_urls as f64).max(0.0)
        };
        Self {
            source_id,
            discovered_urls,
            rows_inserted,
            rows_updated,
            mismatch_pct,
            level: CoverageLevel::from_mismatch(mismatch_pct),
        }
    }
}

/// The observability store.
#[async_trait]
pub trait ObservabilityStore: Send + Sync {
    /// Record the sidecar for a stored raw page, returning its id.
    async fn record_raw_page(
        &self,
        meta: &crate::rawstore::RawPageMeta,
        storage_path: &str,
        content_length: usize,
    ) -> StoreResult<Uuid>;

    /// Append the run's summary log row.
    async fn record_log(&self, log: NewExtractionLog) -> StoreResult<Uuid>;

    /// Append one failed-insert ledger row.
    async fn record_failed_insert(&self, failed: NewFailedInsert) -> StoreResult<Uuid>;

    /// Latest log rows for one source, newest first.
    async fn recent_logs(&self, source_id: Uuid, limit: usize) -> StoreResult<Vec<ExtractionLog>>;

    /// Failed inserts filtered to validation failures, newest first.
    async fn validation_failures(
        &self,
        source_id: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<FailedInsert>>;

    /// Coverage aggregates over the trailing window.
    async fn coverage(&self, window_hours: u32) -> StoreResult<Vec<SourceCoverage>>;

    /// Admin path: mark a ledger row resolved.
    async fn resolve_failed_insert(&self, id: Uuid, notes: &str) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_levels() {
        assert_eq!(CoverageLevel::from_mismatch(0.0), CoverageLevel::Ok);
        assert_eq!(CoverageLevel::from_mismatch(0.05), CoverageLevel::Ok);
        assert_eq!(CoverageLevel::from_mismatch(0.07), CoverageLevel::Warning);
        assert_eq!(CoverageLevel::from_mismatch(0.101), CoverageLevel::Critical);
    }

    #[test]
    fn coverage_compute_handles_zero_discovered() {
        let c = SourceCoverage::compute(Uuid::new_v4(), 0, 0, 0);
        assert_eq!(c.mismatch_pct, 0.0);
        assert_eq!(c.level, CoverageLevel::Ok);
    }

    #[test]
    fn validation_payload_always_carries_the_error() {
        let job = NewJob::minimal(Uuid::new_v4(), "", "https://x/y");
        let entry = NewFailedInsert::validation(
            job.source_id,
            &job,
            &crate::error::HardError::MissingTitle,
            None,
        );
        assert_eq!(entry.operation, FailedOp::Validation);
        assert_eq!(
            entry.payload.get("validation_error").and_then(|v| v.as_str()),
            Some("Missing required field: title")
        );
    }
}
