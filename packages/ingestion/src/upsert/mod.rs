//! Dedupe and upsert engine.
//!
//! Jobs are identified by `(source_id, canonical_hash)`. Batches of up
//! to `batch_size` jobs go through one transaction; a failed batch rolls
//! back and every job in it retries at batch size 1 so a single
//! malformed row cannot poison a source run. Committed ids feed the
//! search sink.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreResult, UpsertError};
use crate::observe::{FailedOp, NewFailedInsert, ObservabilityStore};
use crate::sink::{SearchDocument, SinkHandle};
use crate::types::{JobRecord, NewJob, RunCounts};

pub use memory::MemoryJobStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresJobStore;

/// What happened to one job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(Uuid),
    Updated(Uuid),
    /// Row already matched on every tracked column
    Skipped(Uuid),
}

impl UpsertOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Inserted(id) | Self::Updated(id) | Self::Skipped(id) => *id,
        }
    }

    pub fn committed(&self) -> bool {
        matches!(self, Self::Inserted(_) | Self::Updated(_))
    }
}

/// Persistent job storage.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Upsert a whole batch inside one transaction. Any error rolls the
    /// batch back; the engine retries per-row.
    async fn upsert_batch(&self, jobs: &[NewJob]) -> Result<Vec<UpsertOutcome>, UpsertError>;

    /// Upsert a single job (the batch-of-one retry path).
    async fn upsert_one(&self, job: &NewJob) -> Result<UpsertOutcome, UpsertError>;

    /// Does a row exist for this identity? Distinguishes failed inserts
    /// from failed updates in the ledger.
    async fn exists(&self, source_id: Uuid, canonical_hash: &str) -> Result<bool, UpsertError>;

    /// Live (non-deleted) rows for one source.
    async fn count_for_source(&self, source_id: Uuid) -> Result<u64, UpsertError>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<JobRecord>>;

    /// Soft delete: set the deletion triple atomically.
    async fn soft_delete(&self, id: Uuid, deleted_by: &str, reason: &str) -> StoreResult<()>;

    /// Restore: clear the deletion triple atomically.
    async fn restore(&self, id: Uuid) -> StoreResult<Option<JobRecord>>;

    /// Hard delete: remove the row outright.
    async fn hard_delete(&self, id: Uuid) -> StoreResult<()>;
}

/// Drives batching, accounting, ledger writes, and sink hand-off.
pub struct UpsertEngine {
    store: Arc<dyn JobStore>,
    observe: Arc<dyn ObservabilityStore>,
    sink: SinkHandle,
    batch_size: usize,
}

impl UpsertEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        observe: Arc<dyn ObservabilityStore>,
        sink: SinkHandle,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            observe,
            sink,
            batch_size: batch_size.max(1),
        }
    }

    /// Upsert all valid jobs for one run, in listing order.
    pub async fn run(
        &self,
        source_id: Uuid,
        jobs: Vec<NewJob>,
        raw_page_id: Option<Uuid>,
    ) -> RunCounts {
        let mut counts = RunCounts {
            found: jobs.len(),
            ..RunCounts::default()
        };
        let mut documents: Vec<SearchDocument> = Vec::new();

        for batch in jobs.chunks(self.batch_size) {
            match self.store.upsert_batch(batch).await {
                Ok(outcomes) => {
                    self.account(batch, &outcomes, &mut counts, &mut documents);
                }
                Err(batch_error) => {
                    warn!(
                        source_id = %source_id,
                        batch_len = batch.len(),
                        error = %batch_error,
                        "batch upsert failed, retrying per row"
                    );
                    for job in batch {
                        match self.store.upsert_one(job).await {
                            Ok(outcome) => {
                                self.account(
                                    std::slice::from_ref(job),
                                    &[outcome],
                                    &mut counts,
                                    &mut documents,
                                );
                            }
                            Err(row_error) => {
                                counts.failed += 1;
                                let operation = match self
                                    .store
                                    .exists(source_id, &job.canonical_hash)
                                    .await
                                {
                                    Ok(true) => FailedOp::Update,
                                    _ => FailedOp::Insert,
                                };
                                let entry = NewFailedInsert::upsert(
                                    source_id,
                                    job,
                                    &row_error.to_string(),
                                    operation,
                                    raw_page_id,
                                );
                                if let Err(e) = self.observe.record_failed_insert(entry).await {
                                    warn!(error = %e, "failed to write failed_inserts row");
                                }
                            }
                        }
                    }
                }
            }
        }

        if !documents.is_empty() {
            self.sink.enqueue_upserts(documents).await;
        }

        debug!(
            source_id = %source_id,
            inserted = counts.inserted,
            updated = counts.updated,
            skipped = counts.skipped,
            failed = counts.failed,
            "upsert accounting complete"
        );
        counts
    }

    fn account(
        &self,
        jobs: &[NewJob],
        outcomes: &[UpsertOutcome],
        counts: &mut RunCounts,
        documents: &mut Vec<SearchDocument>,
    ) {
        for (job, outcome) in jobs.iter().zip(outcomes.iter()) {
            match outcome {
                UpsertOutcome::Inserted(id) => {
                    counts.inserted += 1;
                    documents.push(SearchDocument {
                        id: *id,
                        document: job.search_document(*id),
                    });
                }
                UpsertOutcome::Updated(id) => {
                    counts.updated += 1;
                    documents.push(SearchDocument {
                        id: *id,
                        document: job.search_document(*id),
                    });
                }
                UpsertOutcome::Skipped(_) => counts.skipped += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::MemoryObservabilityStore;
    use crate::sink::{MemorySink, RetryingSink};
    use crate::config::SinkConfig;

    fn engine(store: Arc<MemoryJobStore>, observe: Arc<MemoryObservabilityStore>, sink: Arc<MemorySink>) -> UpsertEngine {
        let handle = SinkHandle::new(Arc::new(RetryingSink::new(sink, &SinkConfig::default())));
        UpsertEngine::new(store, observe, handle, 500)
    }

    #[tokio::test]
    async fn insert_then_idempotent_rerun() {
        let store = Arc::new(MemoryJobStore::new());
        let observe = Arc::new(MemoryObservabilityStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = engine(store.clone(), observe.clone(), sink.clone());

        let source_id = Uuid::new_v4();
        let jobs = vec![
            NewJob::minimal(source_id, "Data Analyst", "https://acme.org/jobs/1"),
            NewJob::minimal(source_id, "Field Officer", "https://acme.org/jobs/2"),
        ];

        let counts = engine.run(source_id, jobs.clone(), None).await;
        assert_eq!(counts.inserted, 2);
        assert_eq!(counts.updated + counts.skipped + counts.failed, 0);
        assert_eq!(sink.len().await, 2);

        // Unchanged rerun: everything skips
        let counts = engine.run(source_id, jobs, None).await;
        assert_eq!(counts.inserted, 0);
        assert_eq!(counts.updated, 0);
        assert_eq!(counts.skipped, 2);
    }

    #[tokio::test]
    async fn changed_rows_update_not_insert() {
        let store = Arc::new(MemoryJobStore::new());
        let observe = Arc::new(MemoryObservabilityStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = engine(store.clone(), observe.clone(), sink.clone());

        let source_id = Uuid::new_v4();
        let job = NewJob::minimal(source_id, "Data Analyst", "https://acme.org/jobs/1");
        engine.run(source_id, vec![job.clone()], None).await;

        let mut changed = job.clone();
        changed.location_raw = Some("Remote".into());
        let counts = engine.run(source_id, vec![changed], None).await;
        assert_eq!(counts.inserted, 0);
        assert_eq!(counts.updated, 1);

        // Same id both times: identity is (source_id, canonical_hash)
        assert_eq!(store.count_for_source(source_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn poisoned_row_fails_alone() {
        let store = Arc::new(MemoryJobStore::new());
        store.poison("Poison Pill Role").await;
        let observe = Arc::new(MemoryObservabilityStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = engine(store.clone(), observe.clone(), sink.clone());

        let source_id = Uuid::new_v4();
        let jobs = vec![
            NewJob::minimal(source_id, "Good Role One", "https://x.org/1"),
            NewJob::minimal(source_id, "Poison Pill Role", "https://x.org/2"),
            NewJob::minimal(source_id, "Good Role Two", "https://x.org/3"),
        ];

        let counts = engine.run(source_id, jobs, None).await;
        assert_eq!(counts.inserted, 2);
        assert_eq!(counts.failed, 1);

        let ledger = observe.failed_inserts().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].operation, FailedOp::Insert);
    }
}
