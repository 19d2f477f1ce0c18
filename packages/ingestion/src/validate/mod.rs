//! Pre-upsert validation.
//!
//! Hard errors block a job and land in `failed_inserts` with
//! `operation=validation`; warnings are logged and the job proceeds.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::error::HardError;
use crate::types::NewJob;

/// URL prefixes that can never be application links.
const URL_DENYLIST: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

const TITLE_MIN: usize = 5;
const TITLE_WARN: usize = 200;
const LOCATION_WARN: usize = 120;

/// A job the validator rejected, with the first hard error hit.
#[derive(Debug, Clone)]
pub struct InvalidJob {
    pub job: NewJob,
    pub error: HardError,
}

/// Non-blocking oddities, surfaced in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ValidationWarning {
    OverlongTitle(String),
    OverlongLocation(String),
    UnparseableDeadline(String),
    SuspiciousTitle(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub seen: usize,
    pub valid: usize,
    pub invalid: usize,
    pub warnings: usize,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub valid: Vec<NewJob>,
    pub invalid: Vec<InvalidJob>,
    pub warnings: Vec<ValidationWarning>,
    pub stats: ValidationStats,
}

/// Validate a batch in listing order. Within-batch duplicates (same
/// canonical hash) keep the first occurrence and reject the rest.
pub fn validate_batch(jobs: Vec<NewJob>) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen_hashes: HashSet<String> = HashSet::new();
    report.stats.seen = jobs.len();

    for job in jobs {
        match hard_error_for(&job, &seen_hashes) {
            Some(error) => {
                debug!(title = %job.title, error = %error, "job blocked by validation");
                report.invalid.push(InvalidJob { job, error });
            }
            None => {
                collect_warnings(&job, &mut report.warnings);
                seen_hashes.insert(job.canonical_hash.clone());
                report.valid.push(job);
            }
        }
    }

    report.stats.valid = report.valid.len();
    report.stats.invalid = report.invalid.len();
    report.stats.warnings = report.warnings.len();
    report
}

/// First hard error for a job, scanned in severity order.
fn hard_error_for(job: &NewJob, seen_hashes: &HashSet<String>) -> Option<HardError> {
    let title = job.title.trim();
    if title.is_empty() {
        return Some(HardError::MissingTitle);
    }
    if title.chars().count() < TITLE_MIN {
        return Some(HardError::ShortTitle);
    }

    let url = job.apply_url.trim();
    if url.is_empty() {
        return Some(HardError::MissingUrl);
    }
    if url == "#" || URL_DENYLIST.iter().any(|p| url.to_lowercase().starts_with(p)) {
        return Some(HardError::InvalidUrl(url.to_string()));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Some(HardError::InvalidUrl(url.to_string()));
    }

    if seen_hashes.contains(&job.canonical_hash) {
        return Some(HardError::DuplicateInBatch);
    }

    None
}

fn collect_warnings(job: &NewJob, warnings: &mut Vec<ValidationWarning>) {
    if job.title.chars().count() > TITLE_WARN {
        warnings.push(ValidationWarning::OverlongTitle(job.title.clone()));
    }
    if let Some(location) = &job.location_raw {
        if location.chars().count() > LOCATION_WARN {
            warnings.push(ValidationWarning::OverlongLocation(location.clone()));
        }
    }
    if job.deadline.is_none() {
        if let Some(raw) = &job.deadline_raw {
            warnings.push(ValidationWarning::UnparseableDeadline(raw.clone()));
        }
    }
    if crate::normalize::title::contains_metadata(&job.title) {
        warnings.push(ValidationWarning::SuspiciousTitle(job.title.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn job(title: &str, url: &str) -> NewJob {
        NewJob::minimal(Uuid::new_v4(), title, url)
    }

    #[test]
    fn missing_title_blocks_with_stable_message() {
        let report = validate_batch(vec![job("", "https://x/y")]);
        assert!(report.valid.is_empty());
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.invalid[0].error, HardError::MissingTitle);
        assert_eq!(
            report.invalid[0].error.to_string(),
            "Missing required field: title"
        );
    }

    #[test]
    fn short_title_blocks() {
        let report = validate_batch(vec![job("Dev", "https://x.org/y")]);
        assert_eq!(report.invalid[0].error, HardError::ShortTitle);
    }

    #[test]
    fn denylisted_urls_block() {
        for bad in ["#", "javascript:void(0)", "mailto:hr@x.org", "tel:+1", "data:text/plain,x", "ftp://x.org/f"] {
            let report = validate_batch(vec![job("Valid Title", bad)]);
            assert!(
                matches!(report.invalid[0].error, HardError::InvalidUrl(_)),
                "{} should be invalid",
                bad
            );
        }
    }

    #[test]
    fn duplicate_in_batch_keeps_the_first() {
        let a = job("Data Analyst", "https://acme.org/jobs/42");
        let b = job("Data Analyst", "https://acme.org/jobs/42");
        let report = validate_batch(vec![a, b]);

        assert_eq!(report.valid.len(), 1);
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.invalid[0].error, HardError::DuplicateInBatch);
        assert_eq!(report.invalid[0].error.to_string(), "duplicate_in_batch");
    }

    #[test]
    fn warnings_do_not_block() {
        let mut j = job("Perfectly Valid Title", "https://x.org/jobs/1");
        j.deadline_raw = Some("until filled".into());
        let report = validate_batch(vec![j]);

        assert_eq!(report.valid.len(), 1);
        assert_eq!(report.stats.warnings, 1);
        assert!(matches!(
            report.warnings[0],
            ValidationWarning::UnparseableDeadline(_)
        ));
    }

    #[test]
    fn stats_add_up() {
        let report = validate_batch(vec![
            job("Good Role One", "https://x.org/1"),
            job("", "https://x.org/2"),
            job("Good Role Two", "https://x.org/3"),
        ]);
        assert_eq!(report.stats.seen, 3);
        assert_eq!(report.stats.valid, 2);
        assert_eq!(report.stats.invalid, 1);
    }
}
