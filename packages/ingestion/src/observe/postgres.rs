//! PostgreSQL observability store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::observe::{
    ExtractionLog, FailedInsert, FailedOp, NewExtractionLog, NewFailedInsert, ObservabilityStore,
    SourceCoverage,
};
use crate::rawstore::RawPageMeta;
use crate::types::RunStatus;

pub struct PostgresObservabilityStore {
    pool: PgPool,
}

impl PostgresObservabilityStore {
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raw_pages (
                id UUID PRIMARY KEY,
                source_id UUID NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                http_headers JSONB NOT NULL DEFAULT '{}',
                storage_path TEXT NOT NULL UNIQUE,
                content_length BIGINT NOT NULL,
                fetched_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_raw_pages_source ON raw_pages(source_id, fetched_at)")
            .execute(&self.pool)
            .await
            .ok();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS extraction_logs (
                id UUID PRIMARY KEY,
                source_id UUID NOT NULL,
                raw_page_id UUID,
                url TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT,
                extracted_fields JSONB NOT NULL DEFAULT '[]',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_extraction_logs_source ON extraction_logs(source_id, created_at DESC)")
            .execute(&self.pool)
            .await
            .ok();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS failed_inserts (
                id UUID PRIMARY KEY,
                source_id UUID NOT NULL,
                source_url TEXT NOT NULL,
                error TEXT NOT NULL,
                payload JSONB NOT NULL,
                raw_page_id UUID,
                attempt_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                operation TEXT NOT NULL,
                resolved_at TIMESTAMPTZ,
                resolution_notes TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_failed_inserts_source ON failed_inserts(source_id, attempt_at DESC)")
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_failed_inserts_operation ON failed_inserts(operation)")
            .execute(&self.pool)
            .await
            .ok();

        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn log_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<ExtractionLog> {
    let status_raw: String = row.try_get("status").map_err(db_err)?;
    let fields: serde_json::Value = row.try_get("extracted_fields").map_err(db_err)?;
    Ok(ExtractionLog {
        id: row.try_get("id").map_err(db_err)?,
        source_id: row.try_get("source_id").map_err(db_err)?,
        raw_page_id: row.try_get("raw_page_id").map_err(db_err)?,
        url: row.try_get("url").map_err(db_err)?,
        status: RunStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::Database(format!("unknown run status {}", status_raw)))?,
        reason: row.try_get("reason").map_err(db_err)?,
        extracted_fields: serde_json::from_value(fields).unwrap_or_default(),
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn failed_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<FailedInsert> {
    let op_raw: String = row.try_get("operation").map_err(db_err)?;
    Ok(FailedInsert {
        id: row.try_get("id").map_err(db_err)?,
        source_id: row.try_get("source_id").map_err(db_err)?,
        source_url: row.try_get("source_url").map_err(db_err)?,
        error: row.try_get("error").map_err(db_err)?,
        payload: row.try_get("payload").map_err(db_err)?,
        raw_page_id: row.try_get("raw_page_id").map_err(db_err)?,
        attempt_at: row.try_get("attempt_at").map_err(db_err)?,
        operation: FailedOp::parse(&op_raw)
            .ok_or_else(|| StoreError::Database(format!("unknown operation {}", op_raw)))?,
        resolved_at: row.try_get("resolved_at").map_err(db_err)?,
        resolution_notes: row.try_get("resolution_notes").map_err(db_err)?,
    })
}

#[async_trait]
impl ObservabilityStore for PostgresObservabilityStore {
    async fn record_raw_page(
        &self,
        meta: &RawPageMeta,
        storage_path: &str,
        content_length: usize,
    ) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let headers: HashMap<String, String> = meta.headers.clone();

        // Re-fetches of identical content hit the same storage path; the
        // sidecar stays unique on it and we return the existing row.
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM raw_pages WHERE storage_path = $1")
                .bind(storage_path)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        if let Some((id,)) = existing {
            return Ok(id);
        }

        sqlx::query(
            r#"
            INSERT INTO raw_pages (id, source_id, url, status, http_headers, storage_path, content_length, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (storage_path) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(meta.source_id)
        .bind(&meta.url)
        .bind(meta.status as i32)
        .bind(serde_json::to_value(&headers).unwrap_or_default())
        .bind(storage_path)
        .bind(content_length as i64)
        .bind(meta.fetched_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(id)
    }

    async fn record_log(&self, log: NewExtractionLog) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO extraction_logs (id, source_id, raw_page_id, url, status, reason, extracted_fields)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(log.source_id)
        .bind(log.raw_page_id)
        .bind(&log.url)
        .bind(log.status.as_str())
        .bind(&log.reason)
        .bind(serde_json::to_value(&log.extracted_fields).unwrap_or_default())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    async fn record_failed_insert(&self, failed: NewFailedInsert) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO failed_inserts (id, source_id, source_url, error, payload, raw_page_id, operation)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(failed.source_id)
        .bind(&failed.source_url)
        .bind(&failed.error)
        .bind(&failed.payload)
        .bind(failed.raw_page_id)
        .bind(failed.operation.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    async fn recent_logs(&self, source_id: Uuid, limit: usize) -> StoreResult<Vec<ExtractionLog>> {
        let rows = sqlx::query(
            "SELECT * FROM extraction_logs WHERE source_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(source_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(log_from_row).collect()
    }

    async fn validation_failures(
        &self,
        source_id: Option<Uuid>,
        limit: usize,
    ) -> StoreResult<Vec<FailedInsert>> {
        let rows = match source_id {
            Some(source_id) => sqlx::query(
                "SELECT * FROM failed_inserts WHERE operation = 'validation' AND source_id = $1 ORDER BY attempt_at DESC LIMIT $2",
            )
            .bind(source_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
            None => sqlx::query(
                "SELECT * FROM failed_inserts WHERE operation = 'validation' ORDER BY attempt_at DESC LIMIT $1",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
        };

        rows.iter().map(failed_from_row).collect()
    }

    async fn coverage(&self, window_hours: u32) -> StoreResult<Vec<SourceCoverage>> {
        let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::hours(window_hours as i64);

        let rows = sqlx::query(
            r#"
            SELECT
                l.source_id,
                COUNT(DISTINCT l.url) AS discovered_urls,
                COALESCE(j.inserted, 0) AS rows_inserted,
                COALESCE(j.updated, 0) AS rows_updated
            FROM extraction_logs l
            LEFT JOIN (
                SELECT source_id,
                       COUNT(*) FILTER (WHERE created_at >= $1) AS inserted,
                       COUNT(*) FILTER (WHERE updated_at >= $1 AND updated_at > created_at) AS updated
                FROM jobs
                GROUP BY source_id
            ) j ON j.source_id = l.source_id
            WHERE l.created_at >= $1
            GROUP BY l.source_id, j.inserted, j.updated
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let source_id: Uuid = row.try_get("source_id").map_err(db_err)?;
                let discovered: i64 = row.try_get("discovered_urls").map_err(db_err)?;
                let inserted: i64 = row.try_get("rows_inserted").map_err(db_err)?;
                let updated: i64 = row.try_get("rows_updated").map_err(db_err)?;
                Ok(SourceCoverage::compute(
                    source_id,
                    discovered.max(0) as u64,
                    inserted.max(0) as u64,
                    updated.max(0) as u64,
                ))
            })
            .collect()
    }

    async fn resolve_failed_insert(&self, id: Uuid, notes: &str) -> StoreResult<()> {
        sqlx::query("UPDATE failed_inserts SET resolved_at = now(), resolution_notes = $2 WHERE id = $1")
            .bind(id)
            .bind(notes)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
