//! PostgreSQL job store.
//!
//! Upserts ride `INSERT ... ON CONFLICT (source_id, canonical_hash)`
//! with a change-detection predicate: rows whose tracked columns all
//! match are reported `skipped` and their `updated_at` stays put.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult, UpsertError};
use crate::quality::QualityGrade;
use crate::types::{JobRecord, NewJob};
use crate::upsert::{JobStore, UpsertOutcome};

pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id UUID PRIMARY KEY,
                source_id UUID NOT NULL,
                canonical_hash TEXT NOT NULL,
                title TEXT NOT NULL,
                org_name TEXT,
                apply_url TEXT NOT NULL,
                location_raw TEXT,
                country TEXT,
                country_iso TEXT,
                city TEXT,
                latitude DOUBLE PRECISION,
                longitude DOUBLE PRECISION,
                is_remote BOOLEAN NOT NULL DEFAULT FALSE,
                geocoding_source TEXT,
                geocoded_at TIMESTAMPTZ,
                deadline DATE,
                salary_raw TEXT,
                description TEXT,
                employment_type TEXT,
                level_norm TEXT,
                mission_tags JSONB NOT NULL DEFAULT '[]',
                international_eligible BOOLEAN,
                posted_on DATE,
                quality_score DOUBLE PRECISION NOT NULL DEFAULT 0,
                quality_grade TEXT NOT NULL DEFAULT 'very_low',
                quality_factors JSONB NOT NULL DEFAULT '{}',
                quality_issues JSONB NOT NULL DEFAULT '[]',
                needs_review BOOLEAN NOT NULL DEFAULT FALSE,
                quality_scored_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                deleted_at TIMESTAMPTZ,
                deleted_by TEXT,
                deletion_reason TEXT,
                UNIQUE (source_id, canonical_hash)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source_id) WHERE deleted_at IS NULL")
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_deadline ON jobs(deadline) WHERE deleted_at IS NULL")
            .execute(&self.pool)
            .await
            .ok();

        Ok(())
    }

    async fn upsert_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        job: &NewJob,
    ) -> Result<UpsertOutcome, UpsertError> {
        let id = Uuid::new_v4();

        let row = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, source_id, canonical_hash, title, org_name, apply_url,
                location_raw, country, country_iso, city, latitude, longitude,
                is_remote, geocoding_source, geocoded_at, deadline, salary_raw,
                description, employment_type, level_norm, mission_tags,
                international_eligible, posted_on, quality_score, quality_grade,
                quality_factors, quality_issues, needs_review, quality_scored_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26,
                $27, $28, $29
            )
            ON CONFLICT (source_id, canonical_hash) DO UPDATE SET
                title = EXCLUDED.title,
                org_name = EXCLUDED.org_name,
                apply_url = EXCLUDED.apply_url,
                location_raw = EXCLUDED.location_raw,
                country = EXCLUDED.country,
                country_iso = EXCLUDED.country_iso,
                city = EXCLUDED.city,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                is_remote = EXCLUDED.is_remote,
                geocoding_source = EXCLUDED.geocoding_source,
                geocoded_at = EXCLUDED.geocoded_at,
                deadline = EXCLUDED.deadline,
                salary_raw = EXCLUDED.salary_raw,
                description = EXCLUDED.description,
                employment_type = EXCLUDED.employment_type,
                level_norm = EXCLUDED.level_norm,
                mission_tags = EXCLUDED.mission_tags,
                international_eligible = EXCLUDED.international_eligible,
                posted_on = EXCLUDED.posted_on,
                quality_score = EXCLUDED.quality_score,
                quality_grade = EXCLUDED.quality_grade,
                quality_factors = EXCLUDED.quality_factors,
                quality_issues = EXCLUDED.quality_issues,
                needs_review = EXCLUDED.needs_review,
                quality_scored_at = EXCLUDED.quality_scored_at,
                updated_at = now()
            WHERE (
                jobs.title, jobs.org_name, jobs.apply_url, jobs.location_raw,
                jobs.deadline, jobs.salary_raw, jobs.description,
                jobs.employment_type, jobs.country_iso, jobs.city
            ) IS DISTINCT FROM (
                EXCLUDED.title, EXCLUDED.org_name, EXCLUDED.apply_url,
                EXCLUDED.location_raw, EXCLUDED.deadline, EXCLUDED.salary_raw,
                EXCLUDED.description, EXCLUDED.employment_type,
                EXCLUDED.country_iso, EXCLUDED.city
            )
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(id)
        .bind(job.source_id)
        .bind(&job.canonical_hash)
        .bind(&job.title)
        .bind(&job.org_name)
        .bind(&job.apply_url)
        .bind(&job.location_raw)
        .bind(&job.country)
        .bind(&job.country_iso)
        .bind(&job.city)
        .bind(job.latitude)
        .bind(job.longitude)
        .bind(job.is_remote)
        .bind(&job.geocoding_source)
        .bind(job.geocoded_at)
        .bind(job.deadline)
        .bind(&job.salary_raw)
        .bind(&job.description)
        .bind(&job.employment_type)
        .bind(&job.level_norm)
        .bind(serde_json::to_value(&job.mission_tags).unwrap_or_default())
        .bind(job.international_eligible)
        .bind(job.posted_on)
        .bind(job.quality_score)
        .bind(job.quality_grade.as_str())
        .bind(&job.quality_factors)
        .bind(serde_json::to_value(&job.quality_issues).unwrap_or_default())
        .bind(job.needs_review)
        .bind(job.quality_scored_at)
        .fetch_optional(&mut **tx)
        .await
        .map_err(upsert_err)?;

        match row {
            Some(row) => {
                let id: Uuid = row.try_get("id").map_err(upsert_err)?;
                let inserted: bool = row.try_get("inserted").map_err(upsert_err)?;
                Ok(if inserted {
                    UpsertOutcome::Inserted(id)
                } else {
                    UpsertOutcome::Updated(id)
                })
            }
            None => {
                // Conflict hit but the change predicate filtered the
                // update: an unchanged row.
                let existing: (Uuid,) = sqlx::query_as(
                    "SELECT id FROM jobs WHERE source_id = $1 AND canonical_hash = $2",
                )
                .bind(job.source_id)
                .bind(&job.canonical_hash)
                .fetch_one(&mut **tx)
                .await
                .map_err(upsert_err)?;
                Ok(UpsertOutcome::Skipped(existing.0))
            }
        }
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn upsert_err(e: sqlx::Error) -> UpsertError {
    match &e {
        sqlx::Error::Database(db) if db.constraint().is_some() => {
            UpsertError::ConstraintViolation(e.to_string())
        }
        _ => UpsertError::Sql(e.to_string()),
    }
}

fn record_from_row(row: &PgRow) -> StoreResult<JobRecord> {
    let grade_raw: String = row.try_get("quality_grade").map_err(db_err)?;
    let grade = match grade_raw.as_str() {
        "high" => QualityGrade::High,
        "medium" => QualityGrade::Medium,
        "low" => QualityGrade::Low,
        _ => QualityGrade::VeryLow,
    };
    let mission_tags: serde_json::Value = row.try_get("mission_tags").map_err(db_err)?;
    let quality_issues: serde_json::Value = row.try_get("quality_issues").map_err(db_err)?;

    let job = NewJob {
        source_id: row.try_get("source_id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        org_name: row.try_get("org_name").map_err(db_err)?,
        apply_url: row.try_get("apply_url").map_err(db_err)?,
        location_raw: row.try_get("location_raw").map_err(db_err)?,
        country: row.try_get("country").map_err(db_err)?,
        country_iso: row.try_get("country_iso").map_err(db_err)?,
        city: row.try_get("city").map_err(db_err)?,
        latitude: row.try_get("latitude").map_err(db_err)?,
        longitude: row.try_get("longitude").map_err(db_err)?,
        is_remote: row.try_get("is_remote").map_err(db_err)?,
        geocoding_source: row.try_get("geocoding_source").map_err(db_err)?,
        geocoded_at: row.try_get("geocoded_at").map_err(db_err)?,
        deadline: row.try_get("deadline").map_err(db_err)?,
        deadline_raw: None,
        salary_raw: row.try_get("salary_raw").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        employment_type: row.try_get("employment_type").map_err(db_err)?,
        level_norm: row.try_get("level_norm").map_err(db_err)?,
        mission_tags: serde_json::from_value(mission_tags).unwrap_or_default(),
        international_eligible: row.try_get("international_eligible").map_err(db_err)?,
        posted_on: row.try_get("posted_on").map_err(db_err)?,
        quality_score: row.try_get("quality_score").map_err(db_err)?,
        quality_grade: grade,
        quality_factors: row.try_get("quality_factors").map_err(db_err)?,
        quality_issues: serde_json::from_value(quality_issues).unwrap_or_default(),
        needs_review: row.try_get("needs_review").map_err(db_err)?,
        quality_scored_at: row.try_get("quality_scored_at").map_err(db_err)?,
        canonical_hash: row.try_get("canonical_hash").map_err(db_err)?,
    };

    Ok(JobRecord {
        id: row.try_get("id").map_err(db_err)?,
        job,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
        deleted_at: row.try_get("deleted_at").map_err(db_err)?,
        deleted_by: row.try_get("deleted_by").map_err(db_err)?,
        deletion_reason: row.try_get("deletion_reason").map_err(db_err)?,
    })
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn upsert_batch(&self, jobs: &[NewJob]) -> Result<Vec<UpsertOutcome>, UpsertError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(upsert_err)?;

        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            match Self::upsert_in_tx(&mut tx, job).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(e);
                }
            }
        }

        tx.commit().await.map_err(upsert_err)?;
        Ok(outcomes)
    }

    async fn upsert_one(&self, job: &NewJob) -> Result<UpsertOutcome, UpsertError> {
        let mut tx = self.pool.begin().await.map_err(upsert_err)?;
        let outcome = Self::upsert_in_tx(&mut tx, job).await?;
        tx.commit().await.map_err(upsert_err)?;
        Ok(outcome)
    }

    async fn exists(&self, source_id: Uuid, canonical_hash: &str) -> Result<bool, UpsertError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM jobs WHERE source_id = $1 AND canonical_hash = $2")
                .bind(source_id)
                .bind(canonical_hash)
                .fetch_optional(&self.pool)
                .await
                .map_err(upsert_err)?;
        Ok(row.is_some())
    }

    async fn count_for_source(&self, source_id: Uuid) -> Result<u64, UpsertError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM jobs WHERE source_id = $1 AND deleted_at IS NULL",
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await
        .map_err(upsert_err)?;
        Ok(count.max(0) as u64)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<JobRecord>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn soft_delete(&self, id: Uuid, deleted_by: &str, reason: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE jobs SET deleted_at = now(), deleted_by = $2, deletion_reason = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(deleted_by)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> StoreResult<Option<JobRecord>> {
        let row = sqlx::query(
            "UPDATE jobs SET deleted_at = NULL, deleted_by = NULL, deletion_reason = NULL WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn hard_delete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
