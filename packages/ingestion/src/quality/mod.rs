//! Quality scoring: weighted completeness plus validity checks.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::title::contains_metadata;
use crate::types::NewJob;

/// Bucketed projection of the quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    High,
    Medium,
    Low,
    VeryLow,
}

impl QualityGrade {
    /// Pure function of the score: >=0.85 high, >=0.70 medium,
    /// >=0.50 low, else very_low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            Self::High
        } else if score >= 0.70 {
            Self::Medium
        } else if score >= 0.50 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "very_low",
        }
    }
}

/// Enumerated issue kinds attached to a scored job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityIssue {
    Missing(&'static str),
    Short(&'static str),
    InvalidUrl,
    DeadlineInPast,
    TitleContainsMetadata,
    DuplicateInBatch,
}

impl QualityIssue {
    pub fn code(&self) -> String {
        match self {
            Self::Missing(field) => format!("missing:{}", field),
            Self::Short(field) => format!("short:{}", field),
            Self::InvalidUrl => "invalid_url".to_string(),
            Self::DeadlineInPast => "deadline_in_past".to_string(),
            Self::TitleContainsMetadata => "title_contains_metadata".to_string(),
            Self::DuplicateInBatch => "duplicate_in_batch".to_string(),
        }
    }
}

/// Scoring weights; they sum to 1.0.
const WEIGHT_TITLE: f64 = 0.20;
const WEIGHT_APPLY_URL: f64 = 0.20;
const WEIGHT_LOCATION: f64 = 0.15;
const WEIGHT_DEADLINE: f64 = 0.15;
const WEIGHT_DESCRIPTION: f64 = 0.10;
const WEIGHT_ORG_NAME: f64 = 0.10;
const WEIGHT_GEOCODING: f64 = 0.05;
const WEIGHT_COUNTRY: f64 = 0.05;

const TITLE_MIN: usize = 5;
const TITLE_MAX: usize = 500;
const DESCRIPTION_FULL_CREDIT: usize = 50;

/// Everything the scorer decided about one job.
#[derive(Debug, Clone)]
pub struct QualityReport {
    pub score: f64,
    pub grade: QualityGrade,
    pub factors: Value,
    pub issues: Vec<QualityIssue>,
    pub needs_review: bool,
}

/// Score a normalized job. `today` anchors the deadline-in-past check.
pub fn score_job(job: &NewJob, today: NaiveDate) -> QualityReport {
    let mut score = 0.0;
    let mut factors = serde_json::Map::new();
    let mut issues = Vec::new();

    let mut factor = |name: &str, earned: f64, factors: &mut serde_json::Map<String, Value>| {
        factors.insert(name.to_string(), serde_json::json!(earned));
    };

    // Title: present and within length bounds
    let title_len = job.title.trim().chars().count();
    if title_len == 0 {
        issues.push(QualityIssue::Missing("title"));
        factor("title", 0.0, &mut factors);
    } else if title_len < TITLE_MIN {
        issues.push(QualityIssue::Short("title"));
        factor("title", 0.0, &mut factors);
    } else if title_len > TITLE_MAX {
        factor("title", 0.0, &mut factors);
    } else {
        score += WEIGHT_TITLE;
        factor("title", WEIGHT_TITLE, &mut factors);
    }
    if contains_metadata(&job.title) {
        issues.push(QualityIssue::TitleContainsMetadata);
    }

    // Apply URL: http(s) only
    let url_valid = job.apply_url.starts_with("http://") || job.apply_url.starts_with("https://");
    if job.apply_url.trim().is_empty() {
        issues.push(QualityIssue::Missing("apply_url"));
        factor("apply_url", 0.0, &mut factors);
    } else if !url_valid {
        issues.push(QualityIssue::InvalidUrl);
        factor("apply_url", 0.0, &mut factors);
    } else {
        score += WEIGHT_APPLY_URL;
        factor("apply_url", WEIGHT_APPLY_URL, &mut factors);
    }

    // Location
    if job.location_raw.as_deref().map(str::trim).filter(|s| !s.is_empty()).is_some()
        || job.is_remote
    {
        score += WEIGHT_LOCATION;
        factor("location", WEIGHT_LOCATION, &mut factors);
    } else {
        issues.push(QualityIssue::Missing("location"));
        factor("location", 0.0, &mut factors);
    }

    // Deadline: parseable, and flagged when already past
    match job.deadline {
        Some(deadline) => {
            score += WEIGHT_DEADLINE;
            factor("deadline", WEIGHT_DEADLINE, &mut factors);
            if deadline < today {
                issues.push(QualityIssue::DeadlineInPast);
            }
        }
        None => {
            issues.push(QualityIssue::Missing("deadline"));
            factor("deadline", 0.0, &mut factors);
        }
    }

    // Description: half credit under the full-credit length
    match job.description.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(description) if description.chars().count() >= DESCRIPTION_FULL_CREDIT => {
            score += WEIGHT_DESCRIPTION;
            factor("description", WEIGHT_DESCRIPTION, &mut factors);
        }
        Some(_) => {
            score += WEIGHT_DESCRIPTION / 2.0;
            issues.push(QualityIssue::Short("description"));
            factor("description", WEIGHT_DESCRIPTION / 2.0, &mut factors);
        }
        None => {
            issues.push(QualityIssue::Missing("description"));
            factor("description", 0.0, &mut factors);
        }
    }

    // Organization
    if job.org_name.as_deref().map(str::trim).filter(|s| !s.is_empty()).is_some() {
        score += WEIGHT_ORG_NAME;
        factor("org_name", WEIGHT_ORG_NAME, &mut factors);
    } else {
        issues.push(QualityIssue::Missing("org_name"));
        factor("org_name", 0.0, &mut factors);
    }

    // Geo presence
    if job.latitude.is_some() && job.longitude.is_some() {
        score += WEIGHT_GEOCODING;
        factor("geocoding", WEIGHT_GEOCODING, &mut factors);
    } else {
        factor("geocoding", 0.0, &mut factors);
    }
    if job.country_iso.is_some() {
        score += WEIGHT_COUNTRY;
        factor("country", WEIGHT_COUNTRY, &mut factors);
    } else {
        factor("country", 0.0, &mut factors);
    }

    let score = score.clamp(0.0, 1.0);
    let grade = QualityGrade::from_score(score);
    let needs_review = matches!(grade, QualityGrade::Low | QualityGrade::VeryLow)
        || issues
            .iter()
            .any(|i| matches!(i, QualityIssue::InvalidUrl | QualityIssue::DeadlineInPast));

    QualityReport {
        score,
        grade,
        factors: Value::Object(factors),
        issues,
        needs_review,
    }
}

/// Apply a report to the job's stored quality fields.
pub fn apply_report(job: &mut NewJob, report: &QualityReport, scored_at: chrono::DateTime<chrono::Utc>) {
    job.quality_score = report.score;
    job.quality_grade = report.grade;
    job.quality_factors = report.factors.clone();
    job.quality_issues = report.issues.iter().map(|i| i.code()).collect();
    job.needs_review = report.needs_review;
    job.quality_scored_at = Some(scored_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    fn full_job() -> NewJob {
        let mut job = NewJob::minimal(Uuid::new_v4(), "Data Analyst", "https://acme.org/jobs/42");
        job.org_name = Some("ACME".into());
        job.location_raw = Some("Lagos, NG".into());
        job.country_iso = Some("NG".into());
        job.deadline = NaiveDate::from_ymd_opt(2025, 12, 31);
        job.description = Some("Analyze programme data and produce monthly dashboards for the country office.".into());
        job.latitude = Some(6.45);
        job.longitude = Some(3.39);
        job
    }

    #[test]
    fn complete_job_grades_high() {
        let report = score_job(&full_job(), today());
        assert!(report.score > 0.95);
        assert_eq!(report.grade, QualityGrade::High);
        assert!(!report.needs_review);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn grade_thresholds() {
        assert_eq!(QualityGrade::from_score(0.85), QualityGrade::High);
        assert_eq!(QualityGrade::from_score(0.84), QualityGrade::Medium);
        assert_eq!(QualityGrade::from_score(0.70), QualityGrade::Medium);
        assert_eq!(QualityGrade::from_score(0.69), QualityGrade::Low);
        assert_eq!(QualityGrade::from_score(0.50), QualityGrade::Low);
        assert_eq!(QualityGrade::from_score(0.49), QualityGrade::VeryLow);
    }

    #[test]
    fn short_description_earns_half_credit() {
        let mut job = full_job();
        job.description = Some("Short role blurb.".into());
        let report = score_job(&job, today());
        assert!(report.issues.contains(&QualityIssue::Short("description")));
        let full = score_job(&full_job(), today()).score;
        assert!((full - report.score - WEIGHT_DESCRIPTION / 2.0).abs() < 1e-9);
    }

    #[test]
    fn past_deadline_forces_review() {
        let mut job = full_job();
        job.deadline = NaiveDate::from_ymd_opt(2024, 1, 1);
        let report = score_job(&job, today());
        assert!(report.issues.contains(&QualityIssue::DeadlineInPast));
        assert!(report.needs_review);
    }

    #[test]
    fn bare_job_grades_very_low_and_needs_review() {
        let job = NewJob::minimal(Uuid::new_v4(), "Role here", "https://x.org/1");
        let report = score_job(&job, today());
        assert!(report.score <= 0.5);
        assert!(report.needs_review);
        assert!(report.issues.iter().any(|i| i.code() == "missing:deadline"));
    }

    #[test]
    fn weights_sum_to_one() {
        let total = WEIGHT_TITLE
            + WEIGHT_APPLY_URL
            + WEIGHT_LOCATION
            + WEIGHT_DEADLINE
            + WEIGHT_DESCRIPTION
            + WEIGHT_ORG_NAME
            + WEIGHT_GEOCODING
            + WEIGHT_COUNTRY;
        assert!((total - 1.0).abs() < 1e-9);
    }
}
