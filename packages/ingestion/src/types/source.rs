//! Configured ingestion sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{ParseError, ParseErrorKind};

/// How a source's entry point is fetched and parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Html,
    Rss,
    Api,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Rss => "rss",
            Self::Api => "api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "html" => Some(Self::Html),
            "rss" => Some(Self::Rss),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Paused,
    Deleted,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// A configured source. Config fields are owned by the admin layer;
/// scheduling fields are mutated only by the scheduler under its lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub careers_url: String,
    pub source_type: SourceType,
    pub status: SourceStatus,
    pub crawl_frequency_days: i32,

    /// Free-form for html/rss; strict JSON with `v:1` schema for api
    pub parser_hint: Option<String>,

    /// Render through the headless browser before extraction
    pub render_js: bool,

    /// Allow one-hop detail fetches for candidates missing location/deadline
    pub detail_fetch_enabled: bool,

    /// Skip robots.txt for this host (whitelisted by the operator)
    pub ignore_robots: bool,

    // Scheduling state
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub last_crawl_status: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
    pub consecutive_nochange: i32,
    pub leased_until: Option<DateTime<Utc>>,

    // Conditional-fetch state from the previous run
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_content_hash: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Source {
    /// A new active source with sensible defaults, for tests and seeding.
    pub fn new(name: impl Into<String>, careers_url: impl Into<String>, source_type: SourceType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            careers_url: careers_url.into(),
            source_type,
            status: SourceStatus::Active,
            crawl_frequency_days: 1,
            parser_hint: None,
            render_js: false,
            detail_fetch_enabled: false,
            ignore_robots: false,
            last_crawled_at: None,
            last_crawl_status: None,
            next_run_at: None,
            consecutive_failures: 0,
            consecutive_nochange: 0,
            leased_until: None,
            etag: None,
            last_modified: None,
            last_content_hash: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn with_parser_hint(mut self, hint: impl Into<String>) -> Self {
        self.parser_hint = Some(hint.into());
        self
    }

    /// Host of the careers URL, for domain-level concurrency and robots.
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.careers_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }

    /// Parse the strict api hint. Errors for api sources block runs.
    pub fn api_hint(&self) -> Result<ApiParserHint, ParseError> {
        let raw = self.parser_hint.as_deref().ok_or_else(|| {
            ParseError::new(ParseErrorKind::SchemaMismatch, "api source has no parser_hint")
        })?;
        ApiParserHint::parse(raw)
    }

    /// Parse the optional html hint (selector map). Malformed hints are
    /// ignored for html sources; the generic cascade still runs.
    pub fn html_hint(&self) -> Option<HtmlHint> {
        self.parser_hint
            .as_deref()
            .and_then(|raw| serde_json::from_str::<HtmlHint>(raw).ok())
    }
}

/// Authentication block of the `v:1` api hint.
///
/// `value` may use `SECRET:NAME` indirection, resolved at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ApiAuth {
    /// `Authorization: Bearer <value>`
    Bearer { value: String },
    /// Arbitrary header
    Header { name: String, value: String },
    /// Query-string parameter
    Query { name: String, value: String },
    None,
}

impl Default for ApiAuth {
    fn default() -> Self {
        Self::None
    }
}

/// Field mapping of the `v:1` api hint: dot-paths into each record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiFieldMap {
    pub title: Option<String>,
    pub apply_url: Option<String>,
    pub location: Option<String>,
    pub deadline: Option<String>,
    #[serde(default)]
    pub employer: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub posted_on: Option<String>,
}

/// Strict `v:1` parser hint for api sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiParserHint {
    pub v: u32,
    pub base_url: String,
    pub path: String,
    #[serde(default)]
    pub auth: ApiAuth,
    pub map: ApiFieldMap,
    /// Dot-path to the records array; autodetected when absent
    #[serde(default)]
    pub records_path: Option<String>,
}

impl ApiParserHint {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let hint: ApiParserHint = serde_json::from_str(raw)
            .map_err(|e| ParseError::new(ParseErrorKind::MalformedJson, e.to_string()))?;
        if hint.v != 1 {
            return Err(ParseError::new(
                ParseErrorKind::SchemaMismatch,
                format!("unsupported api hint version {}", hint.v),
            ));
        }
        Ok(hint)
    }

    /// Full request URL before auth decoration.
    pub fn request_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    /// `SECRET:NAME` references used anywhere in the hint.
    pub fn secret_refs(&self) -> Vec<String> {
        let mut refs = Vec::new();
        let mut push = |value: &str| {
            if let Some(name) = value.strip_prefix("SECRET:") {
                refs.push(name.to_string());
            }
        };
        match &self.auth {
            ApiAuth::Bearer { value } => push(value),
            ApiAuth::Header { value, .. } => push(value),
            ApiAuth::Query { value, .. } => push(value),
            ApiAuth::None => {}
        }
        refs
    }
}

/// Optional selector map for html sources.
///
/// All selectors are CSS, scoped to `list` when it is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HtmlHint {
    #[serde(default)]
    pub selectors: HtmlSelectors,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HtmlSelectors {
    /// Container matched once per job card
    pub list: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub location: Option<String>,
    pub deadline: Option<String>,
    pub description: Option<String>,
    pub employer: Option<String>,
}

impl HtmlHint {
    pub fn has_selectors(&self) -> bool {
        self.selectors.list.is_some() || self.selectors.title.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_hint_round_trip() {
        let raw = r#"{
            "v": 1,
            "base_url": "https://boards.example.org",
            "path": "/v1/jobs",
            "auth": {"type": "bearer", "value": "SECRET:BOARD_TOKEN"},
            "map": {"title": "name", "apply_url": "links.apply", "location": "office.city", "deadline": "closes_at"}
        }"#;
        let hint = ApiParserHint::parse(raw).unwrap();
        assert_eq!(hint.request_url(), "https://boards.example.org/v1/jobs");
        assert_eq!(hint.secret_refs(), vec!["BOARD_TOKEN".to_string()]);
        assert_eq!(hint.map.title.as_deref(), Some("name"));
    }

    #[test]
    fn api_hint_rejects_wrong_version() {
        let raw = r#"{"v": 2, "base_url": "x", "path": "y", "map": {}}"#;
        let err = ApiParserHint::parse(raw).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::SchemaMismatch);
    }

    #[test]
    fn html_hint_is_lenient() {
        let source = Source::new("u", "https://example.org/careers", SourceType::Html)
            .with_parser_hint("look at the second table");
        assert!(source.html_hint().is_none());

        let source = source.with_parser_hint(r#"{"selectors": {"list": ".job-card", "title": "h3"}}"#);
        let hint = source.html_hint().unwrap();
        assert!(hint.has_selectors());
        assert_eq!(hint.selectors.list.as_deref(), Some(".job-card"));
    }

    #[test]
    fn host_is_lowercased() {
        let source = Source::new("u", "https://Careers.Example.ORG/jobs", SourceType::Html);
        assert_eq!(source.host().as_deref(), Some("careers.example.org"));
    }
}
