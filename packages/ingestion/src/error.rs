//! Typed errors for the ingestion pipeline.
//!
//! Every error carries a stable, machine-readable kind string
//! (`fetch.timeout`, `validate.missing_title`, ...) so that ledgers and
//! logs stay greppable across releases. Uses `thiserror` for library
//! errors (not `anyhow`).

use thiserror::Error;

/// What went wrong while fetching a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// DNS resolution failed
    Dns,
    /// TCP connection failed
    Tcp,
    /// TLS handshake failed
    Tls,
    /// Request exceeded its deadline
    Timeout,
    /// Server returned a 4xx status
    Http4xx(u16),
    /// Server returned a 5xx status
    Http5xx(u16),
    /// robots.txt disallows the URL
    RobotsDenied,
    /// Body exceeded the configured size cap
    PayloadTooLarge,
    /// Headless render failed
    RenderFailure,
}

impl FetchErrorKind {
    /// Stable kind string for ledgers and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dns => "fetch.dns",
            Self::Tcp => "fetch.tcp",
            Self::Tls => "fetch.tls",
            Self::Timeout => "fetch.timeout",
            Self::Http4xx(_) => "fetch.http_4xx",
            Self::Http5xx(_) => "fetch.http_5xx",
            Self::RobotsDenied => "fetch.robots_denied",
            Self::PayloadTooLarge => "fetch.payload_too_large",
            Self::RenderFailure => "fetch.render_failure",
        }
    }

    /// Whether the scheduler should retry the source later with backoff,
    /// or treat the failure as permanent. 4xx is permanent except for
    /// 408 (request timeout) and 429 (rate limited).
    pub fn retriable(&self) -> bool {
        match self {
            Self::Http4xx(status) => matches!(status, 408 | 429),
            Self::RobotsDenied => false,
            _ => true,
        }
    }
}

/// A fetch failure. Aborts the run when no body was produced.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn retriable(&self) -> bool {
        self.kind.retriable()
    }

    /// Classify a reqwest error into a fetch error kind.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = err.to_string();
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_connect() {
            let lower = message.to_lowercase();
            if lower.contains("dns") || lower.contains("resolve") {
                FetchErrorKind::Dns
            } else if lower.contains("tls") || lower.contains("certificate") || lower.contains("ssl")
            {
                FetchErrorKind::Tls
            } else {
                FetchErrorKind::Tcp
            }
        } else if message.to_lowercase().contains("certificate") {
            FetchErrorKind::Tls
        } else {
            FetchErrorKind::Tcp
        };
        Self::new(kind, message)
    }
}

/// Parse failures degrade to the next cascade stage; they never abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    MalformedJson,
    MalformedHtml,
    MalformedLdJson,
    SchemaMismatch,
}

impl ParseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedJson => "parse.malformed_json",
            Self::MalformedHtml => "parse.malformed_html",
            Self::MalformedLdJson => "parse.malformed_ld_json",
            Self::SchemaMismatch => "parse.schema_mismatch",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Normalization failures leave the field missing.
#[derive(Debug, Clone, Error)]
pub enum NormalizeError {
    #[error("normalize.unparseable_date: {0}")]
    UnparseableDate(String),

    #[error("normalize.unresolved_location: {0}")]
    UnresolvedLocation(String),
}

/// Geocoding failures are non-fatal; the job keeps its raw location.
#[derive(Debug, Clone, Error)]
pub enum GeocodeError {
    #[error("geocode.rate_limited")]
    RateLimited,

    #[error("geocode.no_result: {0}")]
    NoResult(String),

    #[error("geocode.provider_error: {0}")]
    Provider(String),
}

/// AI capability failures are treated as "no improvement".
#[derive(Debug, Clone, Error)]
pub enum AiError {
    #[error("ai.budget_exhausted")]
    BudgetExhausted,

    #[error("ai.provider_error: {0}")]
    Provider(String),

    #[error("ai.invalid_json_response: {0}")]
    InvalidJsonResponse(String),
}

/// Hard validation errors block a single job and land in `failed_inserts`.
///
/// The `Display` strings are the exact `validation_error` payload values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardError {
    #[error("Missing required field: title")]
    MissingTitle,

    #[error("Missing required field: apply_url")]
    MissingUrl,

    #[error("Title too short (minimum 5 characters)")]
    ShortTitle,

    #[error("Invalid application URL: {0}")]
    InvalidUrl(String),

    #[error("duplicate_in_batch")]
    DuplicateInBatch,
}

impl HardError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingTitle => "validate.missing_title",
            Self::MissingUrl => "validate.missing_url",
            Self::ShortTitle => "validate.short_title",
            Self::InvalidUrl(_) => "validate.invalid_url",
            Self::DuplicateInBatch => "validate.duplicate_in_batch",
        }
    }
}

/// Upsert failures are per-batch; the engine retries at batch size 1.
#[derive(Debug, Clone, Error)]
pub enum UpsertError {
    #[error("upsert.sql_error: {0}")]
    Sql(String),

    #[error("upsert.constraint_violation: {0}")]
    ConstraintViolation(String),
}

/// Search sink failures never block pipeline progress.
#[derive(Debug, Clone, Error)]
#[error("sink.search_unavailable: {0}")]
pub struct SinkError(pub String);

/// Storage failures (raw-page store, relational stores).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("corrupt blob at {path}: expected sha {expected}")]
    HashMismatch { path: String, expected: String },
}

/// Top-level failure of a single source run.
///
/// Only fetch errors that produce no body and lease/cancellation events
/// abort a run; everything else degrades stage by stage.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("run cancelled")]
    Cancelled,

    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error("lease lost")]
    LeaseLost,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RunError {
    /// Whether the scheduler should back off and retry the source.
    pub fn retriable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.retriable(),
            Self::Cancelled | Self::LeaseLost => false,
            Self::DeadlineExceeded => true,
            Self::Store(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.kind.as_str(),
            Self::Cancelled => "run.cancelled",
            Self::DeadlineExceeded => "run.deadline_exceeded",
            Self::LeaseLost => "run.lease_lost",
            Self::Store(_) => "run.storage",
        }
    }
}

/// Result alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_4xx_retriable_only_for_408_and_429() {
        assert!(!FetchErrorKind::Http4xx(404).retriable());
        assert!(!FetchErrorKind::Http4xx(403).retriable());
        assert!(FetchErrorKind::Http4xx(408).retriable());
        assert!(FetchErrorKind::Http4xx(429).retriable());
        assert!(FetchErrorKind::Http5xx(503).retriable());
        assert!(!FetchErrorKind::RobotsDenied.retriable());
    }

    #[test]
    fn hard_error_messages_are_stable() {
        assert_eq!(
            HardError::MissingTitle.to_string(),
            "Missing required field: title"
        );
        assert_eq!(HardError::DuplicateInBatch.to_string(), "duplicate_in_batch");
        assert_eq!(HardError::MissingTitle.kind(), "validate.missing_title");
    }

    #[test]
    fn kind_strings_are_namespaced() {
        assert_eq!(FetchErrorKind::Timeout.as_str(), "fetch.timeout");
        assert_eq!(ParseErrorKind::MalformedLdJson.as_str(), "parse.malformed_ld_json");
        assert_eq!(AiError::BudgetExhausted.to_string(), "ai.budget_exhausted");
    }
}
