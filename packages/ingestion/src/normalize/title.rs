//! Title cleanup: strip deadline fragments and listing chrome.

use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing contaminants: "Apply by ...", deadline fragments, listing
/// suffixes after a separator.
static TRAILING_CONTAMINANTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\s*[-–|:(]\s*apply (?:by|before|until).*$",
        r"(?i)\s*[-–|:(]\s*(?:application )?deadline.*$",
        r"(?i)\s*[-–|:(]\s*closing date.*$",
        r"(?i)\s*[-–|]\s*(?:job details|vacancy details|careers?|jobs?)\s*$",
        r"(?i)\s*\(\s*(?:re-?advertised|extended)\s*\)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Clean an extracted title for storage.
pub fn clean_title(raw: &str) -> String {
    let mut title = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
    loop {
        let before = title.len();
        for pattern in TRAILING_CONTAMINANTS.iter() {
            title = pattern.replace(&title, "").trim().to_string();
        }
        if title.len() == before {
            break;
        }
    }
    title
}

/// Does the title still smell of embedded metadata? Feeds the
/// `title_contains_metadata` quality issue.
pub fn contains_metadata(title: &str) -> bool {
    static MARKERS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(?:apply by|deadline|closing date|\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})")
            .expect("static regex")
    });
    MARKERS.is_match(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_apply_by_fragments() {
        assert_eq!(
            clean_title("Data Analyst - Apply by 31 Dec 2025"),
            "Data Analyst"
        );
        assert_eq!(
            clean_title("Field Coordinator | Deadline: 2025-06-30"),
            "Field Coordinator"
        );
        assert_eq!(
            clean_title("WASH Officer (Closing Date 15 May 2025)"),
            "WASH Officer"
        );
    }

    #[test]
    fn strips_listing_chrome() {
        assert_eq!(clean_title("Programme Manager - Careers"), "Programme Manager");
        assert_eq!(clean_title("Nutrition Advisor (Re-advertised)"), "Nutrition Advisor");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(clean_title("  Senior   Economist \n"), "Senior Economist");
    }

    #[test]
    fn plain_titles_pass_through() {
        assert_eq!(clean_title("Monitoring & Evaluation Officer"), "Monitoring & Evaluation Officer");
    }

    #[test]
    fn metadata_detection() {
        assert!(contains_metadata("Analyst - apply by tomorrow"));
        assert!(contains_metadata("Analyst 2025-12-31"));
        assert!(!contains_metadata("Data Analyst"));
    }
}
