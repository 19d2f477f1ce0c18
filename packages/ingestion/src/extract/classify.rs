//! Page classification: is this payload about job postings at all?
//!
//! The default classifier is rule-based over URL path and page text.
//! An ML scorer can be substituted at runtime behind the same trait.

/// Verdict for one payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub is_job: bool,
    /// Confidence in [0, 1]
    pub score: f64,
}

/// Pluggable page scorer.
pub trait PageClassifier: Send + Sync {
    fn classify(&self, url: &str, text: &str) -> Classification;
}

/// Keywords that mark job content, matched case-insensitively.
const POSITIVE_KEYWORDS: &[&str] = &[
    "job",
    "jobs",
    "career",
    "careers",
    "vacancy",
    "vacancies",
    "position",
    "opening",
    "recruit",
    "apply",
    "application deadline",
    "closing date",
    "duty station",
    "employment",
    "hiring",
];

/// Keywords that mark non-job chrome and navigation pages.
const NEGATIVE_KEYWORDS: &[&str] = &[
    "login",
    "sign in",
    "register",
    "category",
    "tag",
    "archive",
    "about us",
    "privacy",
    "cookie policy",
    "terms of service",
    "newsletter",
    "donate",
];

/// URL path hits count double: `/careers/` in the path is a much
/// stronger signal than the word appearing once in a footer.
const PATH_WEIGHT: u32 = 2;

/// Rule-based classifier, the production default.
#[derive(Debug, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl PageClassifier for KeywordClassifier {
    fn classify(&self, url: &str, text: &str) -> Classification {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_default();
        let haystack = text.to_lowercase();

        let mut positive = 0u32;
        let mut negative = 0u32;

        for kw in POSITIVE_KEYWORDS {
            if path.contains(kw) {
                positive += PATH_WEIGHT;
            }
            if haystack.contains(kw) {
                positive += 1;
            }
        }
        for kw in NEGATIVE_KEYWORDS {
            if path.contains(kw) {
                negative += PATH_WEIGHT;
            }
            if haystack.contains(kw) {
                negative += 1;
            }
        }

        if positive == 0 && negative == 0 {
            // No signal either way: let the cascade try, with low confidence.
            return Classification {
                is_job: true,
                score: 0.5,
            };
        }

        let score = positive as f64 / (positive + negative) as f64;
        Classification {
            is_job: score >= 0.5,
            score,
        }
    }
}

/// Confidence above which an `is_job = false` verdict ends extraction.
pub const NEGATIVE_CUTOFF: f64 = 0.25;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn career_pages_classify_positive() {
        let c = KeywordClassifier::new();
        let verdict = c.classify(
            "https://acme.org/careers",
            "Open positions. Apply before the closing date. Duty station: Nairobi.",
        );
        assert!(verdict.is_job);
        assert!(verdict.score > 0.7);
    }

    #[test]
    fn login_pages_classify_negative() {
        let c = KeywordClassifier::new();
        let verdict = c.classify(
            "https://acme.org/login",
            "Sign in to your account. Register here. Privacy. Cookie policy.",
        );
        assert!(!verdict.is_job);
        assert!(verdict.score < NEGATIVE_CUTOFF);
    }

    #[test]
    fn unknown_pages_get_benefit_of_the_doubt() {
        let c = KeywordClassifier::new();
        let verdict = c.classify("https://acme.org/xyz", "lorem ipsum dolor");
        assert!(verdict.is_job);
        assert_eq!(verdict.score, 0.5);
    }
}
