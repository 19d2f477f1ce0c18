//! Last-resort regex extraction: date patterns near deadline keywords
//! and URL hygiene filters.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{FieldName, FieldValue, JobCandidate, Provenance};

/// Date shapes seen on career pages, most specific first.
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // ISO and dashed/slashed numeric forms
        r"\b\d{4}-\d{2}-\d{2}\b",
        r"\b\d{1,2}[-/]\d{1,2}[-/]\d{4}\b",
        // 31 Dec 2025 / 31 December 2025
        r"(?i)\b\d{1,2}(?:st|nd|rd|th)?\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+\d{4}\b",
        // Dec 31, 2025 / December 31 2025
        r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Keywords whose vicinity is searched first for a deadline date.
static DEADLINE_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:deadline|closing date|apply by|applications? close[sd]?|closes on)[^.\n]{0,80}")
        .expect("static regex")
});

/// First date-looking substring in a text.
pub fn find_date(text: &str) -> Option<&str> {
    DATE_PATTERNS
        .iter()
        .filter_map(|p| p.find(text))
        .min_by_key(|m| m.start())
        .map(|m| m.as_str())
}

/// First date near a deadline keyword, falling back to any date.
pub fn find_deadline(text: &str) -> Option<(String, String)> {
    for context in DEADLINE_CONTEXT.find_iter(text) {
        if let Some(date) = find_date(context.as_str()) {
            return Some((date.to_string(), context.as_str().to_string()));
        }
    }
    find_date(text).map(|d| (d.to_string(), d.to_string()))
}

/// Fill still-missing fields from the raw page text.
pub fn fill_regex_fields(cand: &mut JobCandidate, page_text: &str) {
    if cand.is_missing(FieldName::Deadline) {
        if let Some((date, snippet)) = find_deadline(page_text) {
            cand.fill(
                FieldName::Deadline,
                FieldValue::new(date, Provenance::Regex).with_snippet(snippet),
            );
        }
    }

    if cand.is_missing(FieldName::PostedOn) {
        // Posted dates only with an explicit marker; a bare date is more
        // likely a deadline.
        static POSTED_CONTEXT: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)(?:posted|published)(?:\s+on)?[^.\n]{0,60}").expect("static regex")
        });
        for context in POSTED_CONTEXT.find_iter(page_text) {
            if let Some(date) = find_date(context.as_str()) {
                cand.fill(
                    FieldName::PostedOn,
                    FieldValue::new(date, Provenance::Regex).with_snippet(context.as_str()),
                );
                break;
            }
        }
    }
}

/// Drop candidate URLs that cannot be application links.
pub fn is_plausible_apply_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() || url == "#" {
        return false;
    }
    for scheme in ["javascript:", "mailto:", "tel:", "data:"] {
        if url.to_lowercase().starts_with(scheme) {
            return false;
        }
    }
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_common_date_shapes() {
        assert_eq!(find_date("closes 2025-12-31 at noon"), Some("2025-12-31"));
        assert_eq!(find_date("deadline: 31-12-2025"), Some("31-12-2025"));
        assert_eq!(find_date("by 31/12/2025"), Some("31/12/2025"));
        assert_eq!(find_date("apply by 31 Dec 2025 please"), Some("31 Dec 2025"));
        assert_eq!(find_date("apply by December 31, 2025"), Some("December 31, 2025"));
        assert_eq!(find_date("no dates here"), None);
    }

    #[test]
    fn deadline_context_beats_stray_dates() {
        let text = "Posted 01 Jan 2025. Application deadline: 15 Mar 2025.";
        let (date, snippet) = find_deadline(text).unwrap();
        assert_eq!(date, "15 Mar 2025");
        assert!(snippet.to_lowercase().contains("deadline"));
    }

    #[test]
    fn fill_respects_existing_fields() {
        let mut cand = JobCandidate::new("https://x.org/jobs/1");
        cand.fill(
            FieldName::Deadline,
            FieldValue::new("2025-06-30", Provenance::Jsonld),
        );
        fill_regex_fields(&mut cand, "Deadline: 31 Dec 2025");
        // jsonld value stands
        assert_eq!(cand.value(FieldName::Deadline), Some("2025-06-30"));
    }

    #[test]
    fn url_filter_rejects_pseudo_links() {
        assert!(!is_plausible_apply_url("#"));
        assert!(!is_plausible_apply_url("javascript:void(0)"));
        assert!(!is_plausible_apply_url("mailto:jobs@acme.org"));
        assert!(!is_plausible_apply_url("tel:+123456"));
        assert!(is_plausible_apply_url("https://acme.org/jobs/1"));
        assert!(!is_plausible_apply_url("ftp://acme.org/jobs"));
    }
}
