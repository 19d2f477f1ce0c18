//! Organization-name tidy-up.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Site-chrome suffixes that ride along when the employer comes from a
/// page title ("ACME | Careers").
static CHROME_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[|\-–]\s*(?:careers?|jobs?|vacancies|recruitment|work with us)\s*$")
        .expect("static regex")
});

pub fn clean_org_name(raw: &str) -> String {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ");
    CHROME_SUFFIX.replace(&collapsed, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_career_chrome() {
        assert_eq!(clean_org_name("ACME | Careers"), "ACME");
        assert_eq!(clean_org_name("Relief Works - Jobs"), "Relief Works");
    }

    #[test]
    fn keeps_plain_names() {
        assert_eq!(clean_org_name("  Médecins du Monde "), "Médecins du Monde");
    }
}
