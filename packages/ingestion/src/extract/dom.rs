//! DOM selector extraction.
//!
//! A per-source selector map (from `parser_hint`) takes precedence;
//! otherwise a library of generic job-card selectors is tried in order.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::types::{FieldName, FieldValue, HtmlSelectors, JobCandidate, Provenance};

/// Generic job-card container selectors, most specific first.
const GENERIC_CONTAINERS: &[&str] = &[
    ".job-listing",
    ".job-card",
    ".job-item",
    ".vacancy",
    ".vacancy-item",
    ".position",
    ".opening",
    "li.job",
    "article.job",
    "div[class*='job-']",
];

/// Extract candidates using a configured selector map.
pub fn extract_with_selectors(
    document: &Html,
    base_url: &Url,
    selectors: &HtmlSelectors,
) -> Vec<JobCandidate> {
    let Some(list) = selectors.list.as_deref() else {
        return extract_single_with_selectors(document, base_url, selectors)
            .into_iter()
            .collect();
    };
    let Ok(list_selector) = Selector::parse(list) else {
        return Vec::new();
    };

    document
        .select(&list_selector)
        .filter_map(|container| candidate_from_container(container, base_url, selectors))
        .collect()
}

/// Selector map without a list selector: the whole page is one posting.
fn extract_single_with_selectors(
    document: &Html,
    base_url: &Url,
    selectors: &HtmlSelectors,
) -> Option<JobCandidate> {
    let root = document.root_element();
    candidate_from_scoped(root, base_url, selectors)
}

fn candidate_from_container(
    container: ElementRef<'_>,
    base_url: &Url,
    selectors: &HtmlSelectors,
) -> Option<JobCandidate> {
    candidate_from_scoped(container, base_url, selectors)
}

fn candidate_from_scoped(
    scope: ElementRef<'_>,
    base_url: &Url,
    selectors: &HtmlSelectors,
) -> Option<JobCandidate> {
    let mut cand = JobCandidate::new(base_url.as_str());

    let pairs = [
        (FieldName::Title, selectors.title.as_deref()),
        (FieldName::Location, selectors.location.as_deref()),
        (FieldName::Deadline, selectors.deadline.as_deref()),
        (FieldName::Description, selectors.description.as_deref()),
        (FieldName::Employer, selectors.employer.as_deref()),
    ];
    for (field, sel) in pairs {
        if let Some(text) = sel.and_then(|s| scoped_text(scope, s)) {
            cand.fill(field, FieldValue::new(text, Provenance::Dom));
        }
    }

    // apply_url: configured selector first, else the first anchor in scope
    let href = selectors
        .url
        .as_deref()
        .and_then(|s| scoped_href(scope, s))
        .or_else(|| scoped_href(scope, "a[href]"));
    if let Some(href) = href {
        if let Some(resolved) = resolve_href(base_url, &href) {
            cand.fill(FieldName::ApplicationUrl, FieldValue::new(resolved, Provenance::Dom));
        }
    }

    // Title fallback: anchor text
    if cand.is_missing(FieldName::Title) {
        if let Some(text) = scoped_text(scope, "a[href]") {
            cand.fill(FieldName::Title, FieldValue::new(text, Provenance::Dom));
        }
    }

    cand.is_viable().then_some(cand)
}

/// Extract candidates from generic job-card containers.
pub fn extract_generic_cards(document: &Html, base_url: &Url) -> Vec<JobCandidate> {
    for container in GENERIC_CONTAINERS {
        let Ok(selector) = Selector::parse(container) else {
            continue;
        };
        let candidates: Vec<JobCandidate> = document
            .select(&selector)
            .filter_map(|el| generic_candidate(el, base_url))
            .collect();
        // One card is usually page chrome matching by accident; a real
        // listing has several.
        if candidates.len() >= 2 {
            return candidates;
        }
    }
    Vec::new()
}

fn generic_candidate(card: ElementRef<'_>, base_url: &Url) -> Option<JobCandidate> {
    let mut cand = JobCandidate::new(base_url.as_str());

    // Title: heading first, else anchor text
    let title = scoped_text(card, "h1, h2, h3, h4")
        .or_else(|| scoped_text(card, "a[href]"))?;
    cand.fill(FieldName::Title, FieldValue::new(title, Provenance::Dom));

    if let Some(href) = scoped_href(card, "a[href]") {
        if let Some(resolved) = resolve_href(base_url, &href) {
            cand.fill(FieldName::ApplicationUrl, FieldValue::new(resolved, Provenance::Dom));
        }
    }

    for (field, sel) in [
        (FieldName::Location, "[class*='location'], .duty-station"),
        (FieldName::Deadline, "[class*='deadline'], [class*='closing'], time"),
        (FieldName::Employer, "[class*='company'], [class*='organization'], [class*='employer']"),
    ] {
        if let Some(text) = scoped_text(card, sel) {
            cand.fill(field, FieldValue::new(text, Provenance::Dom));
        }
    }

    cand.is_viable().then_some(cand)
}

fn scoped_text(scope: ElementRef<'_>, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    scope
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

fn scoped_href(scope: ElementRef<'_>, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    scope
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(|s| s.to_string())
}

/// Resolve a href against the page URL, dropping anchors and pseudo-links.
pub(crate) fn resolve_href(base_url: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Collapse an element's text nodes into one trimmed string.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_selector_map_extracts_cards() {
        let document = Html::parse_document(
            r#"<html><body>
                <div class="row"><span class="t">Analyst</span><span class="l">Nairobi, Kenya</span><a href="/jobs/1">view</a></div>
                <div class="row"><span class="t">Officer</span><span class="l">Geneva, Switzerland</span><a href="/jobs/2">view</a></div>
            </body></html>"#,
        );
        let base = Url::parse("https://acme.org/careers").unwrap();
        let selectors = HtmlSelectors {
            list: Some(".row".into()),
            title: Some(".t".into()),
            location: Some(".l".into()),
            ..Default::default()
        };

        let candidates = extract_with_selectors(&document, &base, &selectors);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].value(FieldName::Title), Some("Analyst"));
        assert_eq!(candidates[0].value(FieldName::Location), Some("Nairobi, Kenya"));
        assert_eq!(
            candidates[0].value(FieldName::ApplicationUrl),
            Some("https://acme.org/jobs/1")
        );
    }

    #[test]
    fn generic_cards_need_at_least_two_matches() {
        let document = Html::parse_document(
            r#"<html><body>
                <div class="job-card"><h3>Only One</h3><a href="/jobs/1">apply</a></div>
            </body></html>"#,
        );
        let base = Url::parse("https://acme.org/careers").unwrap();
        assert!(extract_generic_cards(&document, &base).is_empty());

        let document = Html::parse_document(
            r#"<html><body>
                <div class="job-card"><h3>Role A</h3><a href="/jobs/1">apply</a><span class="location">Bamako, Mali</span></div>
                <div class="job-card"><h3>Role B</h3><a href="/jobs/2">apply</a></div>
            </body></html>"#,
        );
        let candidates = extract_generic_cards(&document, &base);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].value(FieldName::Title), Some("Role A"));
        assert_eq!(candidates[0].value(FieldName::Location), Some("Bamako, Mali"));
    }

    #[test]
    fn pseudo_links_are_dropped() {
        let base = Url::parse("https://acme.org/").unwrap();
        assert!(resolve_href(&base, "#apply").is_none());
        assert!(resolve_href(&base, "javascript:void(0)").is_none());
        assert!(resolve_href(&base, "mailto:hr@acme.org").is_none());
        assert_eq!(
            resolve_href(&base, "/jobs/1").as_deref(),
            Some("https://acme.org/jobs/1")
        );
    }
}
