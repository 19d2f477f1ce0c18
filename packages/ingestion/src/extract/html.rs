//! HTML page orchestration for the static cascade stages.
//!
//! All DOM work happens synchronously inside this module: `scraper::Html`
//! is not `Send` and must never live across an await point.

use scraper::{Html, Selector};
use url::Url;

use crate::config::PIPELINE_VERSION;
use crate::extract::classify::{PageClassifier, NEGATIVE_CUTOFF};
use crate::extract::{dom, jsonld, labels, meta, regexes};
use crate::types::{
    ExtractionResult, FieldName, FieldValue, HtmlHint, JobCandidate, Provenance, Stage, StageError,
};

/// Run stages 1-6 over an HTML payload. Returns the result plus the
/// collapsed page text (for the async AI stage).
pub fn extract_html(
    classifier: &dyn PageClassifier,
    url: &str,
    body: &str,
    hint: Option<&HtmlHint>,
) -> (ExtractionResult, String) {
    let document = Html::parse_document(body);
    let page_text = collapse_text(&document);
    let mut result = ExtractionResult::new(url, PIPELINE_VERSION);

    // Stage 1: classifier. A confident negative ends extraction.
    let verdict = classifier.classify(url, &page_text);
    result.is_job = verdict.is_job;
    result.classifier_score = verdict.score;
    if !verdict.is_job && verdict.score <= NEGATIVE_CUTOFF {
        return (result, page_text);
    }

    let base_url = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => {
            result.record_error(StageError::new(
                Stage::Dom,
                "parse.malformed_html",
                format!("unparseable page URL {}: {}", url, e),
            ));
            return (result, page_text);
        }
    };

    // Stage 2: JSON-LD.
    match jsonld::extract_jsonld(&document, url) {
        Ok(candidates) => result.candidates = candidates,
        Err(e) => result.record_error(StageError::new(Stage::JsonLd, e.kind.as_str(), e.message)),
    }

    // Stage 4a: configured selector map.
    if result.candidates.is_empty() {
        if let Some(hint) = hint.filter(|h| h.has_selectors()) {
            result.candidates = dom::extract_with_selectors(&document, &base_url, &hint.selectors);
        }
    }

    // Stage 4b: generic job cards.
    if result.candidates.is_empty() {
        result.candidates = dom::extract_generic_cards(&document, &base_url);
    }

    // Stage 5a: header-mapped tables.
    if result.candidates.is_empty() {
        result.candidates = labels::extract_table_jobs(&document, &base_url);
    }

    // Single-posting page: build one candidate from page-level signals.
    if result.candidates.is_empty() && result.is_job {
        if let Some(cand) = single_page_candidate(&document, url) {
            result.candidates.push(cand);
        }
    }

    // Page-level gap fills only make sense when the page describes one
    // posting; a list page's og:title belongs to the list.
    if result.candidates.len() == 1 {
        let cand = &mut result.candidates[0];
        for (field, value) in meta::extract_meta(&document) {
            cand.fill(field, value);
        }
        for (field, value) in labels::extract_labeled_fields(&document) {
            cand.fill(field, value);
        }
        regexes::fill_regex_fields(cand, &page_text);
    }

    // URL hygiene: drop apply URLs that cannot be links.
    for cand in &mut result.candidates {
        if let Some(apply) = cand.value(FieldName::ApplicationUrl) {
            if !regexes::is_plausible_apply_url(apply) {
                cand.fields.shift_remove(&FieldName::ApplicationUrl);
            }
        }
    }

    (result, page_text)
}

/// One candidate for a page that *is* a posting: title from heading or
/// document title, description from meta, apply link from the page URL.
fn single_page_candidate(document: &Html, url: &str) -> Option<JobCandidate> {
    let mut cand = JobCandidate::new(url);

    let title = first_text(document, "h1")
        .or_else(|| first_text(document, "title"))
        .or_else(|| first_text(document, "h2"))?;
    cand.fill(FieldName::Title, FieldValue::new(title, Provenance::Dom));

    // Applying happens on this page unless a better link shows up later.
    cand.fill(
        FieldName::ApplicationUrl,
        FieldValue::new(url, Provenance::Heuristic),
    );

    Some(cand)
}

/// Fields minable from a fetched detail page (one-hop enrichment):
/// JSON-LD first, then labels, then regex dates.
pub fn extract_detail_fields(body: &str, url: &str) -> Vec<(FieldName, FieldValue)> {
    let document = Html::parse_document(body);
    let mut out: Vec<(FieldName, FieldValue)> = Vec::new();

    if let Ok(candidates) = jsonld::extract_jsonld(&document, url) {
        if let Some(cand) = candidates.into_iter().next() {
            for (field, value) in cand.fields {
                out.push((field, value));
            }
        }
    }

    for (field, value) in labels::extract_labeled_fields(&document) {
        if out.iter().all(|(f, _)| *f != field) {
            out.push((field, value));
        }
    }

    if out.iter().all(|(f, _)| *f != FieldName::Deadline) {
        let text = collapse_text(&document);
        if let Some((date, snippet)) = regexes::find_deadline(&text) {
            out.push((
                FieldName::Deadline,
                FieldValue::new(date, Provenance::Regex).with_snippet(snippet),
            ));
        }
    }

    out
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(dom::element_text)
        .filter(|s| !s.is_empty())
}

/// Collapse the document body to whitespace-normalized text lines.
fn collapse_text(document: &Html) -> String {
    let body_selector = Selector::parse("body").expect("static selector");
    let root = document
        .select(&body_selector)
        .next()
        .map(|b| b.text().collect::<Vec<_>>())
        .unwrap_or_else(|| document.root_element().text().collect());

    root.join(" ")
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::classify::KeywordClassifier;

    #[test]
    fn jsonld_page_yields_structured_candidate() {
        let body = r#"<html><head>
            <script type="application/ld+json">{"@type":"JobPosting","title":"Data Analyst","hiringOrganization":{"name":"ACME"},"jobLocation":{"address":{"addressLocality":"Lagos","addressCountry":"NG"}},"validThrough":"2025-12-31","url":"https://acme.org/jobs/42"}</script>
        </head><body><h1>Data Analyst vacancy</h1><p>Apply now.</p></body></html>"#;

        let (result, _) = extract_html(
            &KeywordClassifier::new(),
            "https://acme.org/careers/42",
            body,
            None,
        );

        assert!(result.is_job);
        assert_eq!(result.candidates.len(), 1);
        let cand = &result.candidates[0];
        assert_eq!(cand.value(FieldName::Title), Some("Data Analyst"));
        assert_eq!(cand.get(FieldName::Title).unwrap().source, Provenance::Jsonld);
        assert_eq!(cand.value(FieldName::Location), Some("Lagos, NG"));
    }

    #[test]
    fn confident_negative_classification_short_circuits() {
        let body = r#"<html><body>
            <p>Sign in to your account. Register. Privacy. Cookie policy. Terms of service.</p>
        </body></html>"#;

        let (result, _) = extract_html(
            &KeywordClassifier::new(),
            "https://acme.org/login",
            body,
            None,
        );

        assert!(!result.is_job);
        assert!(result.candidates.is_empty());
    }

    #[test]
    fn single_posting_page_gets_one_candidate_with_label_fills() {
        let body = r#"<html><head><title>Protection Officer - ACME Careers</title></head><body>
            <h1>Protection Officer</h1>
            <ul>
                <li>Duty Station: Cox's Bazar, Bangladesh</li>
                <li>Application Deadline: 2025-09-01</li>
            </ul>
            <p>Apply for this vacancy before the closing date.</p>
        </body></html>"#;

        let (result, _) = extract_html(
            &KeywordClassifier::new(),
            "https://acme.org/jobs/protection-officer",
            body,
            None,
        );

        assert_eq!(result.candidates.len(), 1);
        let cand = &result.candidates[0];
        assert_eq!(cand.value(FieldName::Title), Some("Protection Officer"));
        assert_eq!(cand.value(FieldName::Location), Some("Cox's Bazar, Bangladesh"));
        assert_eq!(cand.value(FieldName::Deadline), Some("2025-09-01"));
        assert_eq!(
            cand.value(FieldName::ApplicationUrl),
            Some("https://acme.org/jobs/protection-officer")
        );
    }

    #[test]
    fn detail_fields_come_from_labels_and_dates() {
        let body = r#"<html><body>
            <h1>Some Role</h1>
            <p>Location: Beirut, Lebanon</p>
            <p>Applications close on 15 Oct 2025.</p>
        </body></html>"#;

        let fields = extract_detail_fields(body, "https://acme.org/jobs/9");
        assert!(fields
            .iter()
            .any(|(f, v)| *f == FieldName::Location && v.value == "Beirut, Lebanon"));
        assert!(fields.iter().any(|(f, _)| *f == FieldName::Deadline));
    }
}
