//! JSON-LD `JobPosting` extraction.
//!
//! Walks every `application/ld+json` block, tolerating `@graph`
//! wrappers, top-level arrays, and `ItemList`/`itemListElement` nesting.

use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{ParseError, ParseErrorKind};
use crate::types::{FieldName, FieldValue, JobCandidate, Provenance};

/// Extract all JobPosting candidates from a parsed document.
///
/// Returns `Err` only when every ld+json block is unparseable; a single
/// bad block among good ones is skipped.
pub fn extract_jsonld(document: &Html, page_url: &str) -> Result<Vec<JobCandidate>, ParseError> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#)
        .expect("static selector");

    let mut postings: Vec<Value> = Vec::new();
    let mut blocks = 0usize;
    let mut failures = 0usize;

    for script in document.select(&selector) {
        blocks += 1;
        let raw: String = script.text().collect();
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => collect_postings(&value, &mut postings),
            Err(_) => failures += 1,
        }
    }

    if blocks > 0 && failures == blocks {
        return Err(ParseError::new(
            ParseErrorKind::MalformedLdJson,
            format!("all {} ld+json blocks unparseable on {}", blocks, page_url),
        ));
    }

    Ok(postings
        .iter()
        .filter_map(|p| candidate_from_posting(p, page_url))
        .collect())
}

/// Recursively gather JobPosting objects.
fn collect_postings(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_postings(item, out);
            }
        }
        Value::Object(map) => {
            if is_job_posting(map.get("@type")) {
                out.push(value.clone());
                return;
            }
            if let Some(graph) = map.get("@graph") {
                collect_postings(graph, out);
            }
            if let Some(elements) = map.get("itemListElement") {
                collect_postings(elements, out);
            }
            // ListItem wraps the payload in "item"
            if let Some(item) = map.get("item") {
                collect_postings(item, out);
            }
        }
        _ => {}
    }
}

fn is_job_posting(type_value: Option<&Value>) -> bool {
    match type_value {
        Some(Value::String(s)) => s == "JobPosting",
        Some(Value::Array(items)) => items
            .iter()
            .any(|v| v.as_str().is_some_and(|s| s == "JobPosting")),
        _ => false,
    }
}

fn candidate_from_posting(posting: &Value, page_url: &str) -> Option<JobCandidate> {
    let mut cand = JobCandidate::new(page_url);

    let mut fill_str = |cand: &mut JobCandidate, field: FieldName, value: Option<&str>| {
        if let Some(v) = value {
            cand.fill(field, FieldValue::new(v, Provenance::Jsonld));
        }
    };

    fill_str(&mut cand, FieldName::Title, str_at(posting, &["title"]));
    fill_str(
        &mut cand,
        FieldName::Employer,
        str_at(posting, &["hiringOrganization", "name"]),
    );

    if let Some(location) = location_string(posting.get("jobLocation")) {
        cand.fill(FieldName::Location, FieldValue::new(location, Provenance::Jsonld));
    }

    if let Some(valid_through) = str_at(posting, &["validThrough"]) {
        // Take the date part of datetime stamps.
        let date = valid_through.split('T').next().unwrap_or(valid_through);
        cand.fill(
            FieldName::Deadline,
            FieldValue::new(date, Provenance::Jsonld).with_snippet(valid_through),
        );
    }

    if let Some(posted) = str_at(posting, &["datePosted"]) {
        let date = posted.split('T').next().unwrap_or(posted);
        cand.fill(FieldName::PostedOn, FieldValue::new(date, Provenance::Jsonld));
    }

    fill_str(&mut cand, FieldName::Description, str_at(posting, &["description"]));

    if let Some(salary) = salary_string(posting.get("baseSalary")) {
        cand.fill(FieldName::Salary, FieldValue::new(salary, Provenance::Jsonld));
    }

    if let Some(et) = employment_type_string(posting.get("employmentType")) {
        cand.fill(FieldName::EmploymentType, FieldValue::new(et, Provenance::Jsonld));
    }

    fill_str(&mut cand, FieldName::ApplicationUrl, str_at(posting, &["url"]));

    cand.is_viable().then_some(cand)
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Render a jobLocation into "City, CC" / "City, Region, Country" form.
///
/// jobLocation may be a Place, an array of Places, or a bare string.
fn location_string(location: Option<&Value>) -> Option<String> {
    let location = location?;
    match location {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Array(items) => items.iter().find_map(|v| location_string(Some(v))),
        Value::Object(_) => {
            let address = location.get("address").unwrap_or(location);
            if let Some(s) = address.as_str() {
                return Some(s.trim().to_string());
            }
            let parts: Vec<&str> = ["addressLocality", "addressRegion", "addressCountry"]
                .iter()
                .filter_map(|k| str_at(address, &[k]))
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

/// Render baseSalary (MonetaryAmount or bare number/string) to text.
fn salary_string(salary: Option<&Value>) -> Option<String> {
    let salary = salary?;
    match salary {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Object(_) => {
            let currency = str_at(salary, &["currency"]).unwrap_or("");
            let value = salary.get("value")?;
            let amount = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.trim().to_string(),
                Value::Object(_) => {
                    let min = value.get("minValue").and_then(Value::as_f64);
                    let max = value.get("maxValue").and_then(Value::as_f64);
                    match (min, max) {
                        (Some(min), Some(max)) => format!("{}-{}", min, max),
                        (Some(v), None) | (None, Some(v)) => v.to_string(),
                        (None, None) => value.get("value").and_then(Value::as_f64)?.to_string(),
                    }
                }
                _ => return None,
            };
            Some(format!("{} {}", currency, amount).trim().to_string())
        }
        _ => None,
    }
}

fn employment_type_string(et: Option<&Value>) -> Option<String> {
    match et? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Array(items) => {
            let joined: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!joined.is_empty()).then(|| joined.join(", "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(ld: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><head><script type="application/ld+json">{}</script></head><body></body></html>"#,
            ld
        ))
    }

    #[test]
    fn extracts_a_simple_posting() {
        let document = doc(
            r#"{"@type":"JobPosting","title":"Data Analyst",
                "hiringOrganization":{"name":"ACME"},
                "jobLocation":{"address":{"addressLocality":"Lagos","addressCountry":"NG"}},
                "validThrough":"2025-12-31",
                "url":"https://acme.org/jobs/42"}"#,
        );

        let candidates = extract_jsonld(&document, "https://acme.org/careers").unwrap();
        assert_eq!(candidates.len(), 1);
        let cand = &candidates[0];
        assert_eq!(cand.value(FieldName::Title), Some("Data Analyst"));
        assert_eq!(cand.value(FieldName::Employer), Some("ACME"));
        assert_eq!(cand.value(FieldName::Location), Some("Lagos, NG"));
        assert_eq!(cand.value(FieldName::Deadline), Some("2025-12-31"));
        assert_eq!(cand.value(FieldName::ApplicationUrl), Some("https://acme.org/jobs/42"));
        assert_eq!(cand.get(FieldName::Title).unwrap().source, Provenance::Jsonld);
        assert_eq!(cand.get(FieldName::Title).unwrap().confidence, 0.90);
    }

    #[test]
    fn walks_graph_and_item_lists() {
        let document = doc(
            r#"{"@graph":[
                {"@type":"WebPage","name":"ignored"},
                {"@type":"ItemList","itemListElement":[
                    {"@type":"ListItem","item":{"@type":"JobPosting","title":"Officer A","url":"https://x.org/a"}},
                    {"@type":"ListItem","item":{"@type":"JobPosting","title":"Officer B","url":"https://x.org/b"}}
                ]}
            ]}"#,
        );

        let candidates = extract_jsonld(&document, "https://x.org/jobs").unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].value(FieldName::Title), Some("Officer A"));
        assert_eq!(candidates[1].value(FieldName::Title), Some("Officer B"));
    }

    #[test]
    fn datetime_deadlines_keep_the_date_part() {
        let document = doc(
            r#"{"@type":"JobPosting","title":"Role","validThrough":"2025-10-01T23:59:00Z","url":"https://x.org/r"}"#,
        );
        let candidates = extract_jsonld(&document, "https://x.org").unwrap();
        assert_eq!(candidates[0].value(FieldName::Deadline), Some("2025-10-01"));
    }

    #[test]
    fn renders_monetary_amount_ranges() {
        let document = doc(
            r#"{"@type":"JobPosting","title":"Role","url":"https://x.org/r",
                "baseSalary":{"currency":"USD","value":{"minValue":50000,"maxValue":70000}}}"#,
        );
        let candidates = extract_jsonld(&document, "https://x.org").unwrap();
        assert_eq!(candidates[0].value(FieldName::Salary), Some("USD 50000-70000"));
    }

    #[test]
    fn all_blocks_bad_is_an_error() {
        let document = doc("{not json at all");
        let err = extract_jsonld(&document, "https://x.org").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedLdJson);
    }

    #[test]
    fn non_posting_types_yield_nothing() {
        let document = doc(r#"{"@type":"Organization","name":"ACME"}"#);
        let candidates = extract_jsonld(&document, "https://x.org").unwrap();
        assert!(candidates.is_empty());
    }
}
