//! JSON record extraction for api sources.
//!
//! The source's `v:1` hint maps dot-paths inside each record onto job
//! fields. Mapped values are treated like configured DOM selectors.

use serde_json::Value;

use crate::config::PIPELINE_VERSION;
use crate::error::{ParseError, ParseErrorKind};
use crate::types::{
    ApiParserHint, ExtractionResult, FieldName, FieldValue, JobCandidate, Provenance,
};

/// Keys tried when the hint does not name the records array.
const RECORDS_KEYS: &[&str] = &["data", "items", "results", "jobs", "postings", "records"];

pub fn extract_api(
    body: &str,
    endpoint_url: &str,
    hint: &ApiParserHint,
) -> Result<ExtractionResult, ParseError> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| ParseError::new(ParseErrorKind::MalformedJson, e.to_string()))?;

    let records = locate_records(&root, hint).ok_or_else(|| {
        ParseError::new(
            ParseErrorKind::SchemaMismatch,
            "no records array found in API response",
        )
    })?;

    let mut result = ExtractionResult::new(endpoint_url, PIPELINE_VERSION);
    result.classifier_score = 0.9; // a configured endpoint serves jobs

    for record in records {
        let mut cand = JobCandidate::new(endpoint_url);

        let mappings = [
            (FieldName::Title, hint.map.title.as_deref()),
            (FieldName::ApplicationUrl, hint.map.apply_url.as_deref()),
            (FieldName::Location, hint.map.location.as_deref()),
            (FieldName::Deadline, hint.map.deadline.as_deref()),
            (FieldName::Employer, hint.map.employer.as_deref()),
            (FieldName::Description, hint.map.description.as_deref()),
            (FieldName::Salary, hint.map.salary.as_deref()),
            (FieldName::EmploymentType, hint.map.employment_type.as_deref()),
            (FieldName::PostedOn, hint.map.posted_on.as_deref()),
        ];

        for (field, path) in mappings {
            let Some(path) = path else { continue };
            if let Some(text) = value_at_path(record, path) {
                cand.fill(field, FieldValue::new(text, Provenance::Dom));
            }
        }

        if cand.is_viable() {
            result.candidates.push(cand);
        }
    }

    Ok(result)
}

/// Find the array of records: explicit path, well-known keys, a bare
/// top-level array, or the first array value in the root object.
fn locate_records<'a>(root: &'a Value, hint: &ApiParserHint) -> Option<&'a Vec<Value>> {
    if let Some(path) = &hint.records_path {
        return walk_path(root, path)?.as_array();
    }

    if let Some(array) = root.as_array() {
        return Some(array);
    }

    let object = root.as_object()?;
    for key in RECORDS_KEYS {
        if let Some(array) = object.get(*key).and_then(Value::as_array) {
            return Some(array);
        }
    }
    object.values().find_map(Value::as_array)
}

fn walk_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match segment.parse::<usize>() {
            Ok(index) => current.get(index)?,
            Err(_) => current.get(segment)?,
        };
    }
    Some(current)
}

/// Render a leaf value as field text. Arrays join with ", ".
fn value_at_path(record: &Value, path: &str) -> Option<String> {
    let value = walk_path(record, path)?;
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint() -> ApiParserHint {
        ApiParserHint::parse(
            r#"{
                "v": 1,
                "base_url": "https://boards.example.org",
                "path": "/v1/jobs",
                "map": {
                    "title": "name",
                    "apply_url": "links.apply",
                    "location": "office.city",
                    "deadline": "closes_at"
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn maps_nested_paths_per_record() {
        let body = r#"{
            "data": [
                {"name": "MEAL Officer", "links": {"apply": "https://b.org/a/1"}, "office": {"city": "Nairobi"}, "closes_at": "2025-10-10"},
                {"name": "Driver", "links": {"apply": "https://b.org/a/2"}, "office": {"city": "Goma"}}
            ]
        }"#;

        let result = extract_api(body, "https://boards.example.org/v1/jobs", &hint()).unwrap();
        assert_eq!(result.candidates.len(), 2);

        let first = &result.candidates[0];
        assert_eq!(first.value(FieldName::Title), Some("MEAL Officer"));
        assert_eq!(first.value(FieldName::ApplicationUrl), Some("https://b.org/a/1"));
        assert_eq!(first.value(FieldName::Location), Some("Nairobi"));
        assert_eq!(first.value(FieldName::Deadline), Some("2025-10-10"));
        assert_eq!(first.get(FieldName::Title).unwrap().source, Provenance::Dom);
    }

    #[test]
    fn bare_array_roots_work() {
        let body = r#"[{"name": "Officer", "links": {"apply": "https://b.org/a/9"}}]"#;
        let result = extract_api(body, "https://b.org/v1/jobs", &hint()).unwrap();
        assert_eq!(result.candidates.len(), 1);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = extract_api("{oops", "https://b.org/v1/jobs", &hint()).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedJson);
    }

    #[test]
    fn missing_records_array_is_schema_mismatch() {
        let err = extract_api(r#"{"status": "ok"}"#, "https://b.org/v1/jobs", &hint()).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::SchemaMismatch);
    }
}
