//! Stored postings and the upsert payload.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::quality::QualityGrade;

/// A normalized, enriched, scored posting ready for upsert.
///
/// `deadline_raw` is carried for diagnostics only and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub source_id: Uuid,
    pub title: String,
    pub org_name: Option<String>,
    pub apply_url: String,
    pub location_raw: Option<String>,
    pub country: Option<String>,
    pub country_iso: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_remote: bool,
    pub geocoding_source: Option<String>,
    pub geocoded_at: Option<DateTime<Utc>>,
    pub deadline: Option<NaiveDate>,
    #[serde(skip)]
    pub deadline_raw: Option<String>,
    pub salary_raw: Option<String>,
    pub description: Option<String>,
    pub employment_type: Option<String>,
    pub level_norm: Option<String>,
    pub mission_tags: Vec<String>,
    pub international_eligible: Option<bool>,
    pub posted_on: Option<NaiveDate>,

    pub quality_score: f64,
    pub quality_grade: QualityGrade,
    pub quality_factors: Value,
    pub quality_issues: Vec<String>,
    pub needs_review: bool,
    pub quality_scored_at: Option<DateTime<Utc>>,

    pub canonical_hash: String,
}

impl NewJob {
    /// A minimal payload for tests; everything else defaulted.
    pub fn minimal(source_id: Uuid, title: impl Into<String>, apply_url: impl Into<String>) -> Self {
        let title = title.into();
        let apply_url = apply_url.into();
        let canonical_hash = crate::canonical::canonical_hash(&title, &apply_url);
        Self {
            source_id,
            title,
            org_name: None,
            apply_url,
            location_raw: None,
            country: None,
            country_iso: None,
            city: None,
            latitude: None,
            longitude: None,
            is_remote: false,
            geocoding_source: None,
            geocoded_at: None,
            deadline: None,
            deadline_raw: None,
            salary_raw: None,
            description: None,
            employment_type: None,
            level_norm: None,
            mission_tags: Vec::new(),
            international_eligible: None,
            posted_on: None,
            quality_score: 0.0,
            quality_grade: QualityGrade::VeryLow,
            quality_factors: Value::Null,
            quality_issues: Vec::new(),
            needs_review: false,
            quality_scored_at: None,
            canonical_hash,
        }
    }

    /// Document pushed to the search index for this posting.
    pub fn search_document(&self, id: Uuid) -> Value {
        serde_json::json!({
            "id": id,
            "source_id": self.source_id,
            "title": self.title,
            "org_name": self.org_name,
            "apply_url": self.apply_url,
            "location": self.location_raw,
            "country_iso": self.country_iso,
            "city": self.city,
            "is_remote": self.is_remote,
            "deadline": self.deadline,
            "employment_type": self.employment_type,
            "mission_tags": self.mission_tags,
            "quality_grade": self.quality_grade.as_str(),
        })
    }
}

/// A committed row, as read back from the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub job: NewJob,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub deletion_reason: Option<String>,
}

impl JobRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Columns compared to decide whether an upsert changed anything.
///
/// Two rows that agree on all of these are `skipped`, not `updated`.
pub fn tracked_columns(job: &NewJob) -> impl PartialEq + std::fmt::Debug {
    (
        job.title.clone(),
        job.org_name.clone(),
        job.apply_url.clone(),
        job.location_raw.clone(),
        job.deadline,
        job.salary_raw.clone(),
        job.description.clone(),
        job.employment_type.clone(),
        job.country_iso.clone(),
        job.city.clone(),
    )
}
