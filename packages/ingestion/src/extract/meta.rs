//! OpenGraph / meta-tag fallback for title and description.

use scraper::{Html, Selector};

use crate::types::{FieldName, FieldValue, Provenance};

/// Page-level meta values. Applied only to single-posting pages; a list
/// page's og:title describes the list, not any one job.
pub fn extract_meta(document: &Html) -> Vec<(FieldName, FieldValue)> {
    let mut out = Vec::new();

    if let Some(title) = meta_content(document, "og:title") {
        out.push((
            FieldName::Title,
            FieldValue::new(title, Provenance::Meta),
        ));
    }
    if let Some(description) = meta_content(document, "og:description") {
        out.push((
            FieldName::Description,
            FieldValue::new(description, Provenance::Meta),
        ));
    }

    out
}

fn meta_content(document: &Html, property: &str) -> Option<String> {
    let selector =
        Selector::parse(&format!(r#"meta[property="{}"]"#, property)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_og_tags() {
        let document = Html::parse_document(
            r#"<html><head>
                <meta property="og:title" content="Field Coordinator - ACME" />
                <meta property="og:description" content="Coordinate field operations in the region." />
            </head><body></body></html>"#,
        );

        let fields = extract_meta(&document);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, FieldName::Title);
        assert_eq!(fields[0].1.value, "Field Coordinator - ACME");
        assert_eq!(fields[0].1.source, Provenance::Meta);
    }

    #[test]
    fn missing_tags_yield_nothing() {
        let document = Html::parse_document("<html><head></head><body></body></html>");
        assert!(extract_meta(&document).is_empty());
    }
}
