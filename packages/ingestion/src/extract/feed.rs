//! Feed-item extraction for RSS/Atom sources.
//!
//! Feed entries carry structured metadata, so title/link/summary land
//! with meta-level confidence; location and deadline are mined out of
//! the entry text with the same heuristics the HTML path uses.

use feed_rs::parser;

use crate::config::PIPELINE_VERSION;
use crate::error::{ParseError, ParseErrorKind};
use crate::extract::regexes;
use crate::types::{ExtractionResult, FieldName, FieldValue, JobCandidate, Provenance, Stage, StageError};

/// Parse a feed body into candidates, one per entry.
pub fn extract_feed(body: &str, feed_url: &str) -> Result<ExtractionResult, ParseError> {
    let feed = parser::parse(body.as_bytes())
        .map_err(|e| ParseError::new(ParseErrorKind::SchemaMismatch, format!("feed parse: {}", e)))?;

    let mut result = ExtractionResult::new(feed_url, PIPELINE_VERSION);
    result.classifier_score = 0.9; // a configured feed endpoint is a job feed
    let entry_count = feed.entries.len();

    for entry in feed.entries {
        let mut cand = JobCandidate::new(feed_url);

        if let Some(title) = entry.title.as_ref().map(|t| t.content.trim()).filter(|t| !t.is_empty()) {
            cand.fill(FieldName::Title, FieldValue::new(title, Provenance::Meta));
        }

        if let Some(link) = entry.links.first().map(|l| l.href.trim()).filter(|l| !l.is_empty()) {
            cand.fill(FieldName::ApplicationUrl, FieldValue::new(link, Provenance::Meta));
        }

        let summary = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .or_else(|| {
                entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.clone())
            });
        if let Some(summary) = &summary {
            let text = strip_tags(summary);
            if !text.is_empty() {
                cand.fill(FieldName::Description, FieldValue::new(&text, Provenance::Meta));
            }
        }

        if let Some(published) = entry.published.or(entry.updated) {
            cand.fill(
                FieldName::PostedOn,
                FieldValue::new(published.format("%Y-%m-%d").to_string(), Provenance::Meta),
            );
        }

        // Mine the entry text for labeled fields and dates.
        let text = summary.as_deref().map(strip_tags).unwrap_or_default();
        fill_from_entry_text(&mut cand, &text);

        if cand.is_viable() {
            result.candidates.push(cand);
        }
    }

    if result.candidates.is_empty() && entry_count > 0 {
        result.record_error(StageError::new(
            Stage::Dom,
            "parse.schema_mismatch",
            "feed entries carried no usable title or link",
        ));
    }

    Ok(result)
}

/// "Location: X" style lines inside the entry body, then regex dates.
fn fill_from_entry_text(cand: &mut JobCandidate, text: &str) {
    for line in text.lines() {
        let line = line.trim();
        if let Some((label, value)) = line.split_once(':') {
            let label = label.trim().to_lowercase();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if label.contains("location") || label.contains("duty station") {
                cand.fill(
                    FieldName::Location,
                    FieldValue::new(value, Provenance::Heuristic).with_snippet(line),
                );
            } else if label.contains("deadline") || label.contains("closing") {
                cand.fill(
                    FieldName::Deadline,
                    FieldValue::new(value, Provenance::Heuristic).with_snippet(line),
                );
            } else if label.contains("organization") || label.contains("employer") {
                cand.fill(
                    FieldName::Employer,
                    FieldValue::new(value, Provenance::Heuristic).with_snippet(line),
                );
            }
        }
    }

    regexes::fill_regex_fields(cand, text);
}

/// Minimal tag stripper for feed bodies that embed HTML.
fn strip_tags(html: &str) -> String {
    use once_cell::sync::Lazy;
    use regex::Regex;
    static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
    static BREAK: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)<(?:br|/p|/li|/div|/tr)\s*/?>").expect("static regex"));

    let with_breaks = BREAK.replace_all(html, "\n");
    let text = TAG.replace_all(&with_breaks, " ");
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>ACME Vacancies</title>
  <link>https://acme.org/jobs</link>
  <item>
    <title>Supply Chain Officer</title>
    <link>https://acme.org/jobs/101</link>
    <description>&lt;p&gt;Location: Amman, Jordan&lt;/p&gt;&lt;p&gt;Closing date: 2025-11-15&lt;/p&gt;&lt;p&gt;Manage the regional supply chain.&lt;/p&gt;</description>
    <pubDate>Mon, 07 Jul 2025 09:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Roving Finance Manager</title>
    <link>https://acme.org/jobs/102</link>
    <description>Deadline: 30 Nov 2025</description>
  </item>
</channel></rss>"#;

    #[test]
    fn rss_items_become_candidates() {
        let result = extract_feed(RSS, "https://acme.org/jobs.rss").unwrap();
        assert_eq!(result.candidates.len(), 2);

        let first = &result.candidates[0];
        assert_eq!(first.value(FieldName::Title), Some("Supply Chain Officer"));
        assert_eq!(
            first.value(FieldName::ApplicationUrl),
            Some("https://acme.org/jobs/101")
        );
        assert_eq!(first.value(FieldName::Location), Some("Amman, Jordan"));
        assert_eq!(first.value(FieldName::Deadline), Some("2025-11-15"));
        assert_eq!(first.value(FieldName::PostedOn), Some("2025-07-07"));
        assert_eq!(first.get(FieldName::Title).unwrap().source, Provenance::Meta);

        let second = &result.candidates[1];
        assert_eq!(second.value(FieldName::Deadline), Some("30 Nov 2025"));
    }

    #[test]
    fn malformed_feed_is_a_parse_error() {
        let err = extract_feed("this is not xml", "https://x.org/feed").unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::MalformedJson | ParseErrorKind::SchemaMismatch
        ));
    }
}
