//! Source persistence and leasing.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::types::{Source, SourceStatus};

/// Scheduling-field update written after a run completes. Only the
/// scheduler mutates these, isolated by the lease.
#[derive(Debug, Clone, Default)]
pub struct SourceRunUpdate {
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub last_crawl_status: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub consecutive_failures: Option<i32>,
    pub consecutive_nochange: Option<i32>,
    pub etag: Option<Option<String>>,
    pub last_modified: Option<Option<String>>,
    pub last_content_hash: Option<Option<String>>,
    /// Always clear the lease on completion
    pub clear_lease: bool,
}

#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Atomically select and lease up to `limit` due sources: active,
    /// `next_run_at <= now` (or never run), not currently leased.
    async fn lease_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: std::time::Duration,
    ) -> StoreResult<Vec<Source>>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Source>>;

    /// Apply post-run bookkeeping under the lease.
    async fn complete_run(&self, id: Uuid, update: SourceRunUpdate) -> StoreResult<()>;

    /// Circuit breaker: set status to paused.
    async fn pause(&self, id: Uuid) -> StoreResult<()>;

    /// Admin trigger: pull the next run forward to now. Fails when the
    /// source is not active or a run is in flight.
    async fn request_run(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;
}

/// In-memory source store for tests.
#[derive(Default)]
pub struct MemorySourceStore {
    sources: RwLock<Vec<Source>>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, source: Source) {
        self.sources.write().await.push(source);
    }

    pub async fn all(&self) -> Vec<Source> {
        self.sources.read().await.clone()
    }
}

#[async_trait]
impl SourceStore for MemorySourceStore {
    async fn lease_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: std::time::Duration,
    ) -> StoreResult<Vec<Source>> {
        let mut sources = self.sources.write().await;
        let lease_until = now + ChronoDuration::from_std(lease).unwrap_or(ChronoDuration::minutes(30));
        let mut leased = Vec::new();

        for source in sources.iter_mut() {
            if leased.len() >= limit {
                break;
            }
            let due = source.status == SourceStatus::Active
                && source.next_run_at.map(|t| t <= now).unwrap_or(true)
                && source.leased_until.map(|t| t < now).unwrap_or(true);
            if due {
                source.leased_until = Some(lease_until);
                leased.push(source.clone());
            }
        }

        Ok(leased)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Source>> {
        Ok(self.sources.read().await.iter().find(|s| s.id == id).cloned())
    }

    async fn complete_run(&self, id: Uuid, update: SourceRunUpdate) -> StoreResult<()> {
        let mut sources = self.sources.write().await;
        let source = sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(v) = update.last_crawled_at {
            source.last_crawled_at = Some(v);
        }
        if let Some(v) = update.last_crawl_status {
            source.last_crawl_status = Some(v);
        }
        if let Some(v) = update.next_run_at {
            source.next_run_at = Some(v);
        }
        if let Some(v) = update.consecutive_failures {
            source.consecutive_failures = v;
        }
        if let Some(v) = update.consecutive_nochange {
            source.consecutive_nochange = v;
        }
        if let Some(v) = update.etag {
            source.etag = v;
        }
        if let Some(v) = update.last_modified {
            source.last_modified = v;
        }
        if let Some(v) = update.last_content_hash {
            source.last_content_hash = v;
        }
        if update.clear_lease {
            source.leased_until = None;
        }
        source.updated_at = Utc::now();
        Ok(())
    }

    async fn pause(&self, id: Uuid) -> StoreResult<()> {
        let mut sources = self.sources.write().await;
        if let Some(source) = sources.iter_mut().find(|s| s.id == id) {
            source.status = SourceStatus::Paused;
        }
        Ok(())
    }

    async fn request_run(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut sources = self.sources.write().await;
        let Some(source) = sources.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if source.status != SourceStatus::Active {
            return Ok(false);
        }
        if source.leased_until.map(|t| t >= now).unwrap_or(false) {
            return Ok(false);
        }
        source.next_run_at = Some(now);
        Ok(true)
    }
}

#[cfg(feature = "postgres")]
pub use self::pg::PostgresSourceStore;

#[cfg(feature = "postgres")]
mod pg {
    use super::*;
    use sqlx::postgres::{PgPool, PgRow};
    use sqlx::Row;

    use crate::types::SourceType;

    pub struct PostgresSourceStore {
        pool: PgPool,
    }

    impl PostgresSourceStore {
        pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
            let store = Self { pool };
            store.run_migrations().await?;
            Ok(store)
        }

        async fn run_migrations(&self) -> StoreResult<()> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS sources (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL,
                    careers_url TEXT NOT NULL,
                    source_type TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'active',
                    crawl_frequency_days INTEGER NOT NULL DEFAULT 1,
                    parser_hint TEXT,
                    render_js BOOLEAN NOT NULL DEFAULT FALSE,
                    detail_fetch_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                    ignore_robots BOOLEAN NOT NULL DEFAULT FALSE,
                    last_crawled_at TIMESTAMPTZ,
                    last_crawl_status TEXT,
                    next_run_at TIMESTAMPTZ,
                    consecutive_failures INTEGER NOT NULL DEFAULT 0,
                    consecutive_nochange INTEGER NOT NULL DEFAULT 0,
                    leased_until TIMESTAMPTZ,
                    etag TEXT,
                    last_modified TEXT,
                    last_content_hash TEXT,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    deleted_at TIMESTAMPTZ
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_sources_due ON sources(next_run_at) WHERE status = 'active'",
            )
            .execute(&self.pool)
            .await
            .ok();

            Ok(())
        }
    }

    fn db_err(e: sqlx::Error) -> StoreError {
        StoreError::Database(e.to_string())
    }

    fn source_from_row(row: &PgRow) -> StoreResult<Source> {
        let type_raw: String = row.try_get("source_type").map_err(db_err)?;
        let status_raw: String = row.try_get("status").map_err(db_err)?;
        Ok(Source {
            id: row.try_get("id").map_err(db_err)?,
            name: row.try_get("name").map_err(db_err)?,
            careers_url: row.try_get("careers_url").map_err(db_err)?,
            source_type: SourceType::parse(&type_raw)
                .ok_or_else(|| StoreError::Database(format!("unknown source_type {}", type_raw)))?,
            status: SourceStatus::parse(&status_raw)
                .ok_or_else(|| StoreError::Database(format!("unknown status {}", status_raw)))?,
            crawl_frequency_days: row.try_get("crawl_frequency_days").map_err(db_err)?,
            parser_hint: row.try_get("parser_hint").map_err(db_err)?,
            render_js: row.try_get("render_js").map_err(db_err)?,
            detail_fetch_enabled: row.try_get("detail_fetch_enabled").map_err(db_err)?,
            ignore_robots: row.try_get("ignore_robots").map_err(db_err)?,
            last_crawled_at: row.try_get("last_crawled_at").map_err(db_err)?,
            last_crawl_status: row.try_get("last_crawl_status").map_err(db_err)?,
            next_run_at: row.try_get("next_run_at").map_err(db_err)?,
            consecutive_failures: row.try_get("consecutive_failures").map_err(db_err)?,
            consecutive_nochange: row.try_get("consecutive_nochange").map_err(db_err)?,
            leased_until: row.try_get("leased_until").map_err(db_err)?,
            etag: row.try_get("etag").map_err(db_err)?,
            last_modified: row.try_get("last_modified").map_err(db_err)?,
            last_content_hash: row.try_get("last_content_hash").map_err(db_err)?,
            created_at: row.try_get("created_at").map_err(db_err)?,
            updated_at: row.try_get("updated_at").map_err(db_err)?,
            deleted_at: row.try_get("deleted_at").map_err(db_err)?,
        })
    }

    #[async_trait]
    impl SourceStore for PostgresSourceStore {
        async fn lease_due(
            &self,
            now: DateTime<Utc>,
            limit: usize,
            lease: std::time::Duration,
        ) -> StoreResult<Vec<Source>> {
            let lease_until = now
                + ChronoDuration::from_std(lease).unwrap_or(ChronoDuration::minutes(30));

            // SKIP LOCKED keeps concurrent scheduler instances from
            // leasing the same source twice.
            let rows = sqlx::query(
                r#"
                WITH due AS (
                    SELECT id FROM sources
                    WHERE status = 'active'
                      AND (next_run_at IS NULL OR next_run_at <= $1)
                      AND (leased_until IS NULL OR leased_until < $1)
                    ORDER BY next_run_at ASC NULLS FIRST
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
                )
                UPDATE sources s
                SET leased_until = $3, updated_at = now()
                FROM due
                WHERE s.id = due.id
                RETURNING s.*
                "#,
            )
            .bind(now)
            .bind(limit as i64)
            .bind(lease_until)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

            rows.iter().map(source_from_row).collect()
        }

        async fn get(&self, id: Uuid) -> StoreResult<Option<Source>> {
            let row = sqlx::query("SELECT * FROM sources WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            row.as_ref().map(source_from_row).transpose()
        }

        async fn complete_run(&self, id: Uuid, update: SourceRunUpdate) -> StoreResult<()> {
            sqlx::query(
                r#"
                UPDATE sources SET
                    last_crawled_at = COALESCE($2, last_crawled_at),
                    last_crawl_status = COALESCE($3, last_crawl_status),
                    next_run_at = COALESCE($4, next_run_at),
                    consecutive_failures = COALESCE($5, consecutive_failures),
                    consecutive_nochange = COALESCE($6, consecutive_nochange),
                    etag = CASE WHEN $7 THEN $8 ELSE etag END,
                    last_modified = CASE WHEN $9 THEN $10 ELSE last_modified END,
                    last_content_hash = CASE WHEN $11 THEN $12 ELSE last_content_hash END,
                    leased_until = CASE WHEN $13 THEN NULL ELSE leased_until END,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(update.last_crawled_at)
            .bind(update.last_crawl_status)
            .bind(update.next_run_at)
            .bind(update.consecutive_failures)
            .bind(update.consecutive_nochange)
            .bind(update.etag.is_some())
            .bind(update.etag.flatten())
            .bind(update.last_modified.is_some())
            .bind(update.last_modified.flatten())
            .bind(update.last_content_hash.is_some())
            .bind(update.last_content_hash.flatten())
            .bind(update.clear_lease)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        }

        async fn pause(&self, id: Uuid) -> StoreResult<()> {
            sqlx::query("UPDATE sources SET status = 'paused', updated_at = now() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(())
        }

        async fn request_run(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE sources SET next_run_at = $2, updated_at = now()
                WHERE id = $1
                  AND status = 'active'
                  AND (leased_until IS NULL OR leased_until < $2)
                "#,
            )
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(result.rows_affected() > 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceType;
    use std::time::Duration;

    #[tokio::test]
    async fn leasing_excludes_paused_and_leased_sources() {
        let store = MemorySourceStore::new();
        let now = Utc::now();

        let due = Source::new("due", "https://a.org/jobs", SourceType::Html);
        let mut paused = Source::new("paused", "https://b.org/jobs", SourceType::Html);
        paused.status = SourceStatus::Paused;
        let mut leased = Source::new("leased", "https://c.org/jobs", SourceType::Html);
        leased.leased_until = Some(now + ChronoDuration::minutes(10));
        let mut future = Source::new("future", "https://d.org/jobs", SourceType::Html);
        future.next_run_at = Some(now + ChronoDuration::hours(4));

        store.insert(due.clone()).await;
        store.insert(paused).await;
        store.insert(leased).await;
        store.insert(future).await;

        let got = store.lease_due(now, 10, Duration::from_secs(1800)).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, due.id);

        // The winner is now leased; a second sweep takes nothing.
        let again = store.lease_due(now, 10, Duration::from_secs(1800)).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn request_run_respects_leases() {
        let store = MemorySourceStore::new();
        let now = Utc::now();
        let mut source = Source::new("s", "https://a.org/jobs", SourceType::Html);
        source.leased_until = Some(now + ChronoDuration::minutes(5));
        let id = source.id;
        store.insert(source).await;

        assert!(!store.request_run(id, now).await.unwrap());

        store
            .complete_run(id, SourceRunUpdate { clear_lease: true, ..Default::default() })
            .await
            .unwrap();
        assert!(store.request_run(id, now).await.unwrap());
        assert_eq!(store.get(id).await.unwrap().unwrap().next_run_at, Some(now));
    }
}
