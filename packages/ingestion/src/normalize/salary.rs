//! Salary and employment-type tidy-up.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Normalize a salary string for storage. Kept raw by design; this only
/// collapses whitespace and drops obvious non-answers.
pub fn clean_salary(raw: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
    if collapsed.is_empty() {
        return None;
    }
    let lower = collapsed.to_lowercase();
    if ["n/a", "na", "tbd", "negotiable", "competitive", "-"].contains(&lower.as_str()) {
        return None;
    }
    Some(collapsed)
}

/// Canonical employment-type labels.
static EMPLOYMENT_TYPES: &[(&str, &[&str])] = &[
    ("full_time", &["full-time", "full time", "fulltime", "100%"]),
    ("part_time", &["part-time", "part time", "parttime"]),
    ("contract", &["contract", "fixed-term", "fixed term", "consultant", "consultancy"]),
    ("internship", &["intern", "internship", "trainee"]),
    ("volunteer", &["volunteer", "unpaid"]),
    ("temporary", &["temporary", "temp", "short-term", "short term"]),
];

/// Map a free-form employment type to a canonical label, keeping the
/// raw string when nothing matches.
pub fn normalize_employment_type(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    for (canonical, keywords) in EMPLOYMENT_TYPES {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return Some((*canonical).to_string());
        }
    }
    Some(lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_non_answers() {
        assert_eq!(clean_salary("N/A"), None);
        assert_eq!(clean_salary("Competitive"), None);
        assert_eq!(clean_salary(""), None);
        assert_eq!(
            clean_salary("USD  50,000 -  70,000 "),
            Some("USD 50,000 - 70,000".to_string())
        );
    }

    #[test]
    fn canonical_employment_types() {
        assert_eq!(normalize_employment_type("Full-Time"), Some("full_time".into()));
        assert_eq!(normalize_employment_type("Fixed term appointment"), Some("contract".into()));
        assert_eq!(normalize_employment_type("Internship"), Some("internship".into()));
        assert_eq!(normalize_employment_type("FULL TIME"), Some("full_time".into()));
        // Unknown types pass through lowercased
        assert_eq!(normalize_employment_type("Seasonal"), Some("seasonal".into()));
    }
}
