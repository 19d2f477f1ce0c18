//! Locale-tolerant date parsing to ISO dates.
//!
//! Day-first is assumed for ambiguous numeric forms (31-12-2025 style
//! dominates the sources this pipeline crawls); unambiguous forms parse
//! as written.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("static regex"));

static MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Parse a date string to a `NaiveDate`. Returns `None` for anything
/// ambiguous enough to need the AI normalizer (e.g. no year).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = ORDINAL.replace_all(raw.trim(), "$1");
    let cleaned = cleaned
        .trim()
        .trim_end_matches('.')
        .replace(',', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        return None;
    }

    // Datetime stamps: take the date part.
    let date_part = cleaned.split(['T', ' ']).next().unwrap_or(&cleaned);

    // ISO and numeric forms
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date);
        }
    }
    for format in ["%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date);
        }
    }

    // Month-name forms over the whole cleaned string
    parse_with_month_name(&cleaned)
}

/// "31 Dec 2025", "Dec 31 2025", "31 December 2025".
fn parse_with_month_name(text: &str) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }

    let month_at = tokens.iter().position(|t| month_number(t).is_some())?;
    let month = month_number(tokens[month_at])?;

    let year = tokens.iter().find_map(|t| {
        t.parse::<i32>()
            .ok()
            .filter(|y| (1990..=2100).contains(y))
    })?;
    let day = tokens.iter().enumerate().find_map(|(i, t)| {
        if i == month_at {
            return None;
        }
        t.parse::<u32>().ok().filter(|d| (1..=31).contains(d))
    })?;

    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(token: &str) -> Option<u32> {
    let token = token.trim_end_matches('.');
    if token.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .find(|(name, _)| name.starts_with(token) || token.starts_with(name))
        .map(|(_, n)| *n)
}

/// Dates the heuristics cannot settle (no year, bare month) go to the
/// AI normalizer.
pub fn is_ambiguous(raw: &str) -> bool {
    parse_date(raw).is_none() && !raw.trim().is_empty()
}
