//! # Job-Listing Ingestion Pipeline
//!
//! A multi-source ingestion pipeline for job postings: configured
//! sources (HTML career pages, RSS feeds, JSON/REST endpoints) are
//! fetched on a schedule, pushed through a cascading extractor,
//! normalized, enriched, quality-scored, deduplicated, and upserted to
//! a relational store and an auxiliary search index.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler (tick, leases, backoff, circuit breaker)
//!     │
//!     └─► Pipeline.run_source()
//!             ├─► Fetcher (html | rss | api | browser render)
//!             ├─► RawPageStore (content-addressed snapshots)
//!             ├─► Cascade (classifier → jsonld → meta → dom
//!             │            → labels → regex → AI fallback)
//!             ├─► Normalizer (dates, locations, titles, AI escalation)
//!             ├─► Enricher (remote detection, geocoding)
//!             ├─► Quality scorer
//!             ├─► Validator (hard errors → failed_inserts ledger)
//!             ├─► UpsertEngine (canonical hash, batched transactions)
//!             └─► SearchSink (at-least-once, retried, non-blocking)
//!
//! Every stage writes to the observability substrate:
//! raw_pages / extraction_logs / failed_inserts / coverage.
//! ```
//!
//! ## Design notes
//!
//! - External services (AI completion, geocoding, secrets, alerting)
//!   are injected [`capabilities::Capabilities`]; process-wide state is
//!   limited to the AI response cache and the geocoder token bucket.
//! - The extractor returns stage verdicts instead of throwing; a run
//!   surfaces one [`types::RunReport`].
//! - Fusion is fill-only-missing with per-stage confidences, so a later
//!   stage can never lower an earlier field's confidence.
//! - Postgres backends are behind the `postgres` feature; every store
//!   has an in-memory twin for tests.

pub mod admin;
pub mod canonical;
pub mod capabilities;
pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod observe;
pub mod pipeline;
pub mod quality;
pub mod rawstore;
pub mod schedule;
pub mod secrets;
pub mod sink;
pub mod testing;
pub mod types;
pub mod upsert;
pub mod validate;

// Core types at the crate root
pub use capabilities::{Alert, Alerts, Capabilities, Completer, GeoPoint, Geocoder, TracingAlerts};
pub use config::{PipelineConfig, PIPELINE_VERSION};
pub use error::{
    AiError, FetchError, FetchErrorKind, GeocodeError, HardError, ParseError, ParseErrorKind,
    RunError, SinkError, StoreError, UpsertError,
};
pub use pipeline::{Pipeline, RunOutput};
pub use types::{
    ExtractionResult, FieldName, FieldValue, JobCandidate, JobRecord, NewJob, Provenance,
    RunCounts, RunReport, RunStatus, Source, SourceStatus, SourceType,
};

// Pipeline building blocks
pub use admin::AdminService;
pub use canonical::{canonical_hash, canonicalize_url};
pub use extract::{Cascade, ExtractorRegistry, KeywordClassifier, PageClassifier, SiteExtractor};
pub use fetch::{Conditional, FetchOutcome, Fetcher};
pub use normalize::Normalizer;
pub use quality::{score_job, QualityGrade, QualityReport};
pub use rawstore::{FsRawStore, MemoryRawStore, RawPageStore};
pub use schedule::{
    DomainLimits, MemorySourceStore, RunBudget, Scheduler, SourceStore, TickBudget,
};
pub use sink::{HttpSearchSink, MemorySink, RetryingSink, SearchDocument, SearchSink, SinkHandle};
pub use upsert::{JobStore, MemoryJobStore, UpsertEngine, UpsertOutcome};
pub use validate::{validate_batch, ValidationReport};

// Observability
pub use observe::{
    CoverageLevel, ExtractionLog, FailedInsert, FailedOp, MemoryObservabilityStore,
    ObservabilityStore, SourceCoverage,
};

// Secrets
pub use secrets::{EnvSecrets, SecretResolver, StaticSecrets};

// Postgres backends (feature-gated)
#[cfg(feature = "postgres")]
pub use observe::PostgresObservabilityStore;
#[cfg(feature = "postgres")]
pub use schedule::PostgresSourceStore;
#[cfg(feature = "postgres")]
pub use upsert::PostgresJobStore;
