//! In-memory job store for tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreResult, UpsertError};
use crate::types::job::tracked_columns;
use crate::types::{JobRecord, NewJob};
use crate::upsert::{JobStore, UpsertOutcome};

#[derive(Default)]
pub struct MemoryJobStore {
    rows: RwLock<HashMap<(Uuid, String), JobRecord>>,
    /// Titles that fail every upsert, for failure-path tests
    poisoned: RwLock<HashSet<String>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any job with this title fail its upsert.
    pub async fn poison(&self, title: &str) {
        self.poisoned.write().await.insert(title.to_string());
    }

    pub async fn all(&self) -> Vec<JobRecord> {
        self.rows.read().await.values().cloned().collect()
    }

    async fn upsert_inner(&self, job: &NewJob) -> Result<UpsertOutcome, UpsertError> {
        if self.poisoned.read().await.contains(&job.title) {
            return Err(UpsertError::Sql(format!(
                "simulated failure for '{}'",
                job.title
            )));
        }

        let key = (job.source_id, job.canonical_hash.clone());
        let mut rows = self.rows.write().await;
        let now = Utc::now();

        match rows.get_mut(&key) {
            Some(existing) => {
                if tracked_columns(&existing.job) == tracked_columns(job) {
                    return Ok(UpsertOutcome::Skipped(existing.id));
                }
                // created_at is never overwritten
                let id = existing.id;
                let created_at = existing.created_at;
                let deleted = (
                    existing.deleted_at,
                    existing.deleted_by.clone(),
                    existing.deletion_reason.clone(),
                );
                *existing = JobRecord {
                    id,
                    job: job.clone(),
                    created_at,
                    updated_at: now,
                    deleted_at: deleted.0,
                    deleted_by: deleted.1,
                    deletion_reason: deleted.2,
                };
                Ok(UpsertOutcome::Updated(id))
            }
            None => {
                let id = Uuid::new_v4();
                rows.insert(
                    key,
                    JobRecord {
                        id,
                        job: job.clone(),
                        created_at: now,
                        updated_at: now,
                        deleted_at: None,
                        deleted_by: None,
                        deletion_reason: None,
                    },
                );
                Ok(UpsertOutcome::Inserted(id))
            }
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn upsert_batch(&self, jobs: &[NewJob]) -> Result<Vec<UpsertOutcome>, UpsertError> {
        // Transaction semantics: a poisoned row fails the whole batch
        // without applying anything.
        {
            let poisoned = self.poisoned.read().await;
            if let Some(bad) = jobs.iter().find(|j| poisoned.contains(&j.title)) {
                return Err(UpsertError::Sql(format!(
                    "simulated batch failure at '{}'",
                    bad.title
                )));
            }
        }

        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            outcomes.push(self.upsert_inner(job).await?);
        }
        Ok(outcomes)
    }

    async fn upsert_one(&self, job: &NewJob) -> Result<UpsertOutcome, UpsertError> {
        self.upsert_inner(job).await
    }

    async fn exists(&self, source_id: Uuid, canonical_hash: &str) -> Result<bool, UpsertError> {
        Ok(self
            .rows
            .read()
            .await
            .contains_key(&(source_id, canonical_hash.to_string())))
    }

    async fn count_for_source(&self, source_id: Uuid) -> Result<u64, UpsertError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.job.source_id == source_id && r.deleted_at.is_none())
            .count() as u64)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<JobRecord>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn soft_delete(&self, id: Uuid, deleted_by: &str, reason: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.values_mut().find(|r| r.id == id) {
            row.deleted_at = Some(Utc::now());
            row.deleted_by = Some(deleted_by.to_string());
            row.deletion_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> StoreResult<Option<JobRecord>> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.values_mut().find(|r| r.id == id) {
            row.deleted_at = None;
            row.deleted_by = None;
            row.deletion_reason = None;
            return Ok(Some(row.clone()));
        }
        Ok(None)
    }

    async fn hard_delete(&self, id: Uuid) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        rows.retain(|_, r| r.id != id);
        Ok(())
    }
}
