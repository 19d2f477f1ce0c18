//! Label heuristics: "Location: X" rows and header-mapped tables.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::extract::dom::{element_text, resolve_href};
use crate::types::{FieldName, FieldValue, JobCandidate, Provenance};

/// Label keywords mapped to fields. Matching is fuzzy: a header or label
/// matches when it contains any keyword, case-insensitively.
const LABEL_KEYWORDS: &[(FieldName, &[&str])] = &[
    (
        FieldName::Location,
        &["duty station", "location", "place of work", "city", "country"],
    ),
    (
        FieldName::Deadline,
        &[
            "application deadline",
            "closing date",
            "deadline",
            "apply by",
            "closes",
        ],
    ),
    (FieldName::Title, &["title", "position", "job", "role", "vacancy"]),
    (FieldName::Employer, &["organization", "organisation", "employer", "company"]),
    (FieldName::Salary, &["salary", "remuneration", "compensation", "grade"]),
    (
        FieldName::EmploymentType,
        &["contract type", "employment type", "type of contract", "appointment type"],
    ),
    (FieldName::PostedOn, &["posted", "published", "date of issue"]),
];

/// How many leading rows to scan for a header when there is no `<thead>`.
const HEADER_SCAN_ROWS: usize = 10;

static LABELED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z /()]{2,40})\s*[:：]\s*(.{1,200})$").expect("static regex"));

/// Field a label string maps to, if any. Longer keywords are checked
/// first so "application deadline" beats "application".
fn field_for_label(label: &str) -> Option<FieldName> {
    let label = label.to_lowercase();
    let mut best: Option<(usize, FieldName)> = None;
    for (field, keywords) in LABEL_KEYWORDS {
        for kw in *keywords {
            if label.contains(kw) {
                let len = kw.len();
                if best.map(|(l, _)| len > l).unwrap_or(true) {
                    best = Some((len, *field));
                }
            }
        }
    }
    best.map(|(_, f)| f)
}

/// Scan a single-posting page for labeled rows: definition lists, list
/// items, table rows, and bare "Label: value" text lines.
pub fn extract_labeled_fields(document: &Html) -> Vec<(FieldName, FieldValue)> {
    let mut out: Vec<(FieldName, FieldValue)> = Vec::new();
    let mut push = |field: FieldName, value: String, snippet: String| {
        if out.iter().all(|(f, _)| *f != field) && !value.trim().is_empty() {
            out.push((
                field,
                FieldValue::new(value, Provenance::Heuristic).with_snippet(snippet),
            ));
        }
    };

    // <dt>/<dd> pairs
    if let Ok(dt_selector) = Selector::parse("dt") {
        for dt in document.select(&dt_selector) {
            let label = element_text(dt);
            let Some(field) = field_for_label(&label) else {
                continue;
            };
            let dd = dt
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "dd");
            if let Some(dd) = dd {
                let value = element_text(dd);
                push(field, value.clone(), format!("{}: {}", label, value));
            }
        }
    }

    // Two-cell table rows
    if let Ok(tr_selector) = Selector::parse("tr") {
        let td_selector = Selector::parse("th, td").expect("static selector");
        for tr in document.select(&tr_selector) {
            let cells: Vec<String> = tr.select(&td_selector).map(element_text).collect();
            if cells.len() == 2 {
                if let Some(field) = field_for_label(&cells[0]) {
                    push(field, cells[1].clone(), cells.join(": "));
                }
            }
        }
    }

    // "Label: value" lines in list items and paragraphs
    if let Ok(li_selector) = Selector::parse("li, p, div") {
        for el in document.select(&li_selector) {
            let text = element_text(el);
            if text.len() > 250 {
                continue;
            }
            let Some(caps) = LABELED_LINE.captures(&text) else {
                continue;
            };
            let label = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let value = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            if let Some(field) = field_for_label(label) {
                push(field, value.to_string(), text.clone());
            }
        }
    }

    out
}

/// Extract one candidate per data row from tables whose header row maps
/// onto job fields.
///
/// Header detection searches `<thead>` first, then the first ten rows.
pub fn extract_table_jobs(document: &Html, base_url: &Url) -> Vec<JobCandidate> {
    let table_selector = Selector::parse("table").expect("static selector");
    let tr_selector = Selector::parse("tr").expect("static selector");
    let cell_selector = Selector::parse("th, td").expect("static selector");

    let mut candidates = Vec::new();

    for table in document.select(&table_selector) {
        let rows: Vec<ElementRef> = table.select(&tr_selector).collect();
        if rows.len() < 2 {
            continue;
        }

        let Some((header_index, columns)) = detect_header(&rows, &cell_selector) else {
            continue;
        };

        // A job table needs at least a title column.
        if !columns.contains(&Some(FieldName::Title)) {
            continue;
        }

        for row in rows.iter().skip(header_index + 1) {
            if let Some(cand) = candidate_from_row(row, &cell_selector, &columns, base_url) {
                candidates.push(cand);
            }
        }

        if !candidates.is_empty() {
            break;
        }
    }

    candidates
}

/// Find the header row and map each column to a field.
fn detect_header(
    rows: &[ElementRef],
    cell_selector: &Selector,
) -> Option<(usize, Vec<Option<FieldName>>)> {
    for (index, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let in_thead = row
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| el.value().name() == "thead");

        let cells: Vec<String> = row.select(cell_selector).map(element_text).collect();
        if cells.len() < 2 {
            continue;
        }

        let columns: Vec<Option<FieldName>> =
            cells.iter().map(|c| field_for_label(c)).collect();
        let mapped = columns.iter().flatten().count();

        // A thead row wins outright; otherwise require most columns to map.
        if in_thead && mapped >= 1 {
            return Some((index, columns));
        }
        if mapped * 2 >= cells.len() && mapped >= 2 {
            return Some((index, columns));
        }
    }
    None
}

fn candidate_from_row(
    row: &ElementRef,
    cell_selector: &Selector,
    columns: &[Option<FieldName>],
    base_url: &Url,
) -> Option<JobCandidate> {
    let cells: Vec<ElementRef> = row.select(cell_selector).collect();
    if cells.is_empty() {
        return None;
    }

    let mut cand = JobCandidate::new(base_url.as_str());

    for (cell, field) in cells.iter().zip(columns.iter()) {
        let Some(field) = field else { continue };
        let text = element_text(*cell);
        if text.is_empty() {
            continue;
        }
        cand.fill(*field, FieldValue::new(text, Provenance::Heuristic));
    }

    // The application link usually hangs off the title cell; fall back to
    // the posting's own page when the row carries no link at all.
    let a_selector = Selector::parse("a[href]").expect("static selector");
    let href = cells
        .iter()
        .find_map(|cell| cell.select(&a_selector).next())
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_href(base_url, href));
    match href {
        Some(href) => {
            cand.fill(FieldName::ApplicationUrl, FieldValue::new(href, Provenance::Heuristic));
        }
        None => {
            cand.fill(
                FieldName::ApplicationUrl,
                FieldValue::new(base_url.as_str(), Provenance::Heuristic),
            );
        }
    }

    cand.value(FieldName::Title).is_some().then_some(cand)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_rows_are_lifted() {
        let document = Html::parse_document(
            r#"<html><body>
                <ul>
                    <li>Duty Station: Juba, South Sudan</li>
                    <li>Application Deadline: 15 Aug 2025</li>
                    <li>Contract Type: Fixed-term</li>
                </ul>
            </body></html>"#,
        );

        let fields = extract_labeled_fields(&document);
        let get = |f: FieldName| {
            fields
                .iter()
                .find(|(name, _)| *name == f)
                .map(|(_, v)| v.value.as_str())
        };
        assert_eq!(get(FieldName::Location), Some("Juba, South Sudan"));
        assert_eq!(get(FieldName::Deadline), Some("15 Aug 2025"));
        assert_eq!(get(FieldName::EmploymentType), Some("Fixed-term"));
    }

    #[test]
    fn definition_lists_are_lifted() {
        let document = Html::parse_document(
            r#"<html><body><dl>
                <dt>Location</dt><dd>Geneva, Switzerland</dd>
                <dt>Closing Date</dt><dd>2025-09-30</dd>
            </dl></body></html>"#,
        );

        let fields = extract_labeled_fields(&document);
        assert!(fields
            .iter()
            .any(|(f, v)| *f == FieldName::Location && v.value == "Geneva, Switzerland"));
        assert!(fields
            .iter()
            .any(|(f, v)| *f == FieldName::Deadline && v.value == "2025-09-30"));
    }

    #[test]
    fn thead_table_maps_columns() {
        let document = Html::parse_document(
            r#"<html><body><table>
                <thead><tr><th>Title</th><th>Duty Station</th><th>Application Deadline</th></tr></thead>
                <tbody>
                    <tr><td>Program Officer</td><td>Paris, France</td><td>31-12-2025</td></tr>
                </tbody>
            </table></body></html>"#,
        );
        let base = Url::parse("https://unesco.example.org/jobs").unwrap();

        let candidates = extract_table_jobs(&document, &base);
        assert_eq!(candidates.len(), 1);
        let cand = &candidates[0];
        assert_eq!(cand.value(FieldName::Title), Some("Program Officer"));
        assert_eq!(cand.value(FieldName::Location), Some("Paris, France"));
        assert_eq!(cand.value(FieldName::Deadline), Some("31-12-2025"));
        assert_eq!(cand.get(FieldName::Location).unwrap().source, Provenance::Heuristic);
        // No link in the row: the page itself is the application URL
        assert_eq!(
            cand.value(FieldName::ApplicationUrl),
            Some("https://unesco.example.org/jobs")
        );
    }

    #[test]
    fn headerless_table_found_in_first_rows() {
        let document = Html::parse_document(
            r#"<html><body><table>
                <tr><td>Position</td><td>Location</td></tr>
                <tr><td><a href="/jobs/9">Logistics Lead</a></td><td>Dakar, Senegal</td></tr>
            </table></body></html>"#,
        );
        let base = Url::parse("https://acme.org/careers").unwrap();

        let candidates = extract_table_jobs(&document, &base);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value(FieldName::Title), Some("Logistics Lead"));
        assert_eq!(
            candidates[0].value(FieldName::ApplicationUrl),
            Some("https://acme.org/jobs/9")
        );
    }

    #[test]
    fn tables_without_job_columns_are_ignored() {
        let document = Html::parse_document(
            r#"<html><body><table>
                <tr><th>Year</th><th>Budget</th></tr>
                <tr><td>2024</td><td>$1M</td></tr>
            </table></body></html>"#,
        );
        let base = Url::parse("https://acme.org/about").unwrap();
        assert!(extract_table_jobs(&document, &base).is_empty());
    }
}
