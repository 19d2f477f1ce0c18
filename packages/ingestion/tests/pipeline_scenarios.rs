//! End-to-end pipeline scenarios over the in-memory stores.
//!
//! No network, no database: fetches are scripted through `MockFetcher`
//! and persistence goes to the memory backends.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ingestion::capabilities::Capabilities;
use ingestion::config::{AiBudgetConfig, PipelineConfig};
use ingestion::observe::{FailedOp, MemoryObservabilityStore, ObservabilityStore};
use ingestion::rawstore::{key_hash, MemoryRawStore, RawPageStore};
use ingestion::schedule::{MemorySourceStore, RunBudget, Scheduler, SourceStore, TickBudget};
use ingestion::sink::{MemorySink, RetryingSink, SinkHandle};
use ingestion::testing::{outcome_not_modified, outcome_with_body, MockCompleter, MockFetcher, RecordingAlerts};
use ingestion::types::{
    ExtractionResult, FieldName, FieldValue, JobCandidate, Provenance, RunStatus, Source,
    SourceStatus, SourceType,
};
use ingestion::upsert::{JobStore, MemoryJobStore};
use ingestion::{canonical_hash, Alert, FetchErrorKind, Pipeline, QualityGrade, SiteExtractor};

struct Harness {
    pipeline: Pipeline,
    raw_store: Arc<MemoryRawStore>,
    jobs: Arc<MemoryJobStore>,
    observe: Arc<MemoryObservabilityStore>,
    sink: Arc<MemorySink>,
}

fn harness(fetcher: MockFetcher, capabilities: Capabilities) -> Harness {
    harness_with_cfg(fetcher, capabilities, PipelineConfig::default())
}

fn harness_with_cfg(
    fetcher: MockFetcher,
    capabilities: Capabilities,
    cfg: PipelineConfig,
) -> Harness {
    let raw_store = Arc::new(MemoryRawStore::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let observe = Arc::new(MemoryObservabilityStore::new());
    let sink = Arc::new(MemorySink::new());
    let handle = SinkHandle::new(Arc::new(RetryingSink::new(
        Arc::clone(&sink),
        &cfg.sink,
    )));

    let pipeline = Pipeline::new(
        cfg,
        &capabilities,
        Arc::clone(&raw_store) as Arc<dyn RawPageStore>,
        Arc::clone(&jobs) as Arc<dyn JobStore>,
        Arc::clone(&observe) as Arc<dyn ObservabilityStore>,
        handle,
    )
    .with_fetcher(Arc::new(fetcher));

    Harness {
        pipeline,
        raw_store,
        jobs,
        observe,
        sink,
    }
}

fn unlimited_budget() -> RunBudget {
    RunBudget::unlimited()
}

fn html_source() -> Source {
    Source::new("acme careers", "https://acme.org/careers", SourceType::Html)
}

// ---------------------------------------------------------------------
// S1: JSON-LD happy path
// ---------------------------------------------------------------------

const S1_HTML: &str = r#"<html><head>
<script type="application/ld+json">
{"@type":"JobPosting","title":"Data Analyst",
 "hiringOrganization":{"name":"ACME"},
 "jobLocation":{"address":{"addressLocality":"Lagos","addressCountry":"NG"}},
 "validThrough":"2030-12-31",
 "description":"Analyze programme data and produce monthly dashboards for the ACME country office team.",
 "url":"https://acme.org/jobs/42"}
</script></head>
<body><h1>Careers at ACME</h1><p>Current vacancy listing, apply online.</p></body></html>"#;

#[tokio::test]
async fn s1_jsonld_happy_path() {
    let h = harness(MockFetcher::serving(S1_HTML), Capabilities::minimal());
    let source = html_source();

    let output = h
        .pipeline
        .run_source(&source, &unlimited_budget(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.report.status, RunStatus::Ok);
    assert_eq!(output.report.counts.inserted, 1);

    let rows = h.jobs.all().await;
    assert_eq!(rows.len(), 1);
    let job = &rows[0].job;
    assert_eq!(job.title, "Data Analyst");
    assert_eq!(job.org_name.as_deref(), Some("ACME"));
    assert_eq!(job.location_raw.as_deref(), Some("Lagos, NG"));
    assert_eq!(job.country_iso.as_deref(), Some("NG"));
    assert_eq!(job.apply_url, "https://acme.org/jobs/42");
    assert_eq!(
        job.deadline,
        chrono::NaiveDate::from_ymd_opt(2030, 12, 31)
    );
    assert_eq!(job.quality_grade, QualityGrade::High);
    assert!(!job.needs_review);

    // Invariant 1: stored canonical hash matches the definition
    assert_eq!(
        job.canonical_hash,
        canonical_hash(&job.title, &job.apply_url)
    );

    // The committed row reached the search sink
    assert_eq!(h.sink.len().await, 1);

    // Raw-page round-trip: stored bytes hash to the key's embedded hash
    let pages = h.observe.raw_pages().await;
    assert_eq!(pages.len(), 1);
    let body = h.raw_store.get(&pages[0].storage_path).await.unwrap();
    assert_eq!(
        key_hash(&pages[0].storage_path).unwrap(),
        ingestion::canonical::sha256_hex(&body)
    );

    // Invariant 3: exactly one extraction log, tied to the raw page
    let logs = h.observe.logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].raw_page_id, Some(pages[0].id));
    assert_eq!(logs[0].status, RunStatus::Ok);
    assert!(logs[0].extracted_fields.contains(&"title".to_string()));
}

// ---------------------------------------------------------------------
// S2: table with UNESCO-style headers
// ---------------------------------------------------------------------

const S2_HTML: &str = r#"<html><body>
<h1>Vacancies</h1>
<p>Open positions at the organization. Apply before the application deadline.</p>
<table>
  <thead><tr><th>Title</th><th>Duty Station</th><th>Application Deadline</th></tr></thead>
  <tbody>
    <tr><td>Program Officer</td><td>Paris, France</td><td>31-12-2025</td></tr>
  </tbody>
</table>
</body></html>"#;

#[tokio::test]
async fn s2_table_with_duty_station_headers() {
    let h = harness(MockFetcher::serving(S2_HTML), Capabilities::minimal());
    let source = html_source();

    let output = h
        .pipeline
        .run_source(&source, &unlimited_budget(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.report.status, RunStatus::Ok);
    assert_eq!(output.report.counts.inserted, 1);

    let rows = h.jobs.all().await;
    let job = &rows[0].job;
    assert_eq!(job.title, "Program Officer");
    assert_eq!(job.location_raw.as_deref(), Some("Paris, France"));
    assert_eq!(job.country_iso.as_deref(), Some("FR"));
    assert_eq!(
        job.deadline,
        chrono::NaiveDate::from_ymd_opt(2025, 12, 31)
    );

    let logs = h.observe.logs().await;
    assert_eq!(logs[0].status, RunStatus::Ok);
}

// ---------------------------------------------------------------------
// S3 / S4: validation failures via a site plugin fixture
// ---------------------------------------------------------------------

/// Emits whatever candidates the test scripted, bypassing DOM work.
struct FixtureExtractor {
    candidates: Vec<Vec<(FieldName, String)>>,
}

impl SiteExtractor for FixtureExtractor {
    fn name(&self) -> &str {
        "fixture"
    }

    fn matches(&self, _source: &Source) -> bool {
        true
    }

    fn extract(&self, url: &str, _body: &str) -> Option<ExtractionResult> {
        let mut result = ExtractionResult::new(url, ingestion::PIPELINE_VERSION);
        for fields in &self.candidates {
            let mut cand = JobCandidate::new(url);
            for (field, value) in fields {
                cand.fill(*field, FieldValue::new(value.clone(), Provenance::Dom));
            }
            result.candidates.push(cand);
        }
        Some(result)
    }
}

fn plugin_harness(candidates: Vec<Vec<(FieldName, String)>>) -> Harness {
    let registry =
        ingestion::ExtractorRegistry::new().with(Arc::new(FixtureExtractor { candidates }));
    let Harness {
        pipeline,
        raw_store,
        jobs,
        observe,
        sink,
    } = harness(MockFetcher::serving("<html></html>"), Capabilities::minimal());
    Harness {
        pipeline: pipeline.with_registry(registry),
        raw_store,
        jobs,
        observe,
        sink,
    }
}

#[tokio::test]
async fn s3_missing_title_lands_in_failed_inserts() {
    let h = plugin_harness(vec![vec![(
        FieldName::ApplicationUrl,
        "https://x.org/y".to_string(),
    )]]);
    let source = html_source();

    let output = h
        .pipeline
        .run_source(&source, &unlimited_budget(), &CancellationToken::new())
        .await
        .unwrap();

    // Candidates existed but none survived validation
    assert_eq!(output.report.status, RunStatus::Partial);
    assert_eq!(output.report.counts.inserted, 0);
    assert_eq!(output.report.counts.failed, 1);
    assert!(h.jobs.all().await.is_empty());

    let failed = h.observe.failed_inserts().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].operation, FailedOp::Validation);
    // Invariant 4: the payload names the hard error
    assert_eq!(
        failed[0]
            .payload
            .get("validation_error")
            .and_then(|v| v.as_str()),
        Some("Missing required field: title")
    );
}

#[tokio::test]
async fn s4_duplicate_within_batch() {
    let candidate = vec![
        (FieldName::Title, "Data Analyst".to_string()),
        (FieldName::ApplicationUrl, "https://acme.org/jobs/42".to_string()),
    ];
    let h = plugin_harness(vec![candidate.clone(), candidate]);
    let source = html_source();

    let output = h
        .pipeline
        .run_source(&source, &unlimited_budget(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.report.status, RunStatus::Ok);
    assert_eq!(output.report.counts.inserted, 1);
    assert_eq!(output.report.counts.failed, 1);
    assert_eq!(h.jobs.all().await.len(), 1);

    let failed = h.observe.failed_inserts().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].operation, FailedOp::Validation);
    assert_eq!(
        failed[0]
            .payload
            .get("validation_error")
            .and_then(|v| v.as_str()),
        Some("duplicate_in_batch")
    );
}

// ---------------------------------------------------------------------
// S5: not-modified short circuit
// ---------------------------------------------------------------------

#[tokio::test]
async fn s5_not_modified_short_circuit() {
    let fetcher = MockFetcher::serving(S1_HTML).then(Ok(outcome_not_modified("\"v1\"")));
    let h = harness(fetcher, Capabilities::minimal());
    let mut source = html_source();

    let first = h
        .pipeline
        .run_source(&source, &unlimited_budget(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.report.counts.inserted, 1);
    let raw_pages_after_first = h.observe.raw_pages().await.len();

    // Scheduler would persist the conditional state between runs
    source.etag = Some("\"v1\"".to_string());
    source.last_content_hash = first.content_hash.clone();

    let second = h
        .pipeline
        .run_source(&source, &unlimited_budget(), &CancellationToken::new())
        .await
        .unwrap();

    // Invariant 7: idempotent second run
    assert_eq!(second.report.status, RunStatus::Ok);
    assert!(second.report.not_modified);
    assert_eq!(second.report.counts.inserted, 0);
    assert_eq!(second.report.counts.updated, 0);
    assert_eq!(second.report.counts.skipped, 1);

    // No new raw page, but a second extraction log
    assert_eq!(h.observe.raw_pages().await.len(), raw_pages_after_first);
    assert_eq!(h.observe.logs().await.len(), 2);
    assert_eq!(h.observe.logs().await[1].status, RunStatus::Ok);
}

#[tokio::test]
async fn s5b_unchanged_content_hash_short_circuits() {
    // Same body twice without etag support
    let fetcher = MockFetcher::serving(S1_HTML).then(Ok(outcome_with_body(S1_HTML)));
    let h = harness(fetcher, Capabilities::minimal());
    let mut source = html_source();

    let first = h
        .pipeline
        .run_source(&source, &unlimited_budget(), &CancellationToken::new())
        .await
        .unwrap();
    source.last_content_hash = first.content_hash.clone();

    let second = h
        .pipeline
        .run_source(&source, &unlimited_budget(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.report.counts.inserted, 0);
    assert_eq!(second.report.counts.skipped, 1);
    assert!(second.report.not_modified);
}

// ---------------------------------------------------------------------
// S6: circuit breaker
// ---------------------------------------------------------------------

#[tokio::test]
async fn s6_circuit_breaker_pauses_after_ten_failures() {
    let h = harness(
        MockFetcher::failing(FetchErrorKind::Http5xx(503)),
        Capabilities::minimal(),
    );

    let sources = Arc::new(MemorySourceStore::new());
    let source = html_source();
    let source_id = source.id;
    sources.insert(source).await;

    let alerts = RecordingAlerts::new();
    let cfg = PipelineConfig::default();
    let scheduler = Scheduler::new(
        Arc::clone(&sources) as Arc<dyn SourceStore>,
        Arc::new(h.pipeline),
        cfg.schedule.clone(),
        cfg.ai.clone(),
        alerts.clone(),
        CancellationToken::new(),
    );

    let mut now = Utc::now();
    for round in 1..=10 {
        let summary = Arc::clone(&scheduler).tick(now).await;
        assert_eq!(summary.dispatched, 1, "round {} should dispatch", round);
        assert_eq!(summary.failed, 1);
        // Jump past the worst-case backoff (24h + jitter)
        now = now + ChronoDuration::hours(27);
    }

    let source = sources.get(source_id).await.unwrap().unwrap();
    assert_eq!(source.status, SourceStatus::Paused);
    assert_eq!(source.consecutive_failures, 10);

    let raised = alerts.take();
    assert!(raised
        .iter()
        .any(|a| matches!(a, Alert::SourcePaused { source_id: id, failures: 10 } if *id == source_id)));

    // Paused sources are never selected again
    let summary = Arc::clone(&scheduler).tick(now + ChronoDuration::days(30)).await;
    assert_eq!(summary.dispatched, 0);
}

// ---------------------------------------------------------------------
// Invariant 6: scheduler monotonicity over a successful run
// ---------------------------------------------------------------------

#[tokio::test]
async fn scheduler_advances_next_run_past_last_crawl() {
    let h = harness(MockFetcher::serving(S1_HTML), Capabilities::minimal());

    let sources = Arc::new(MemorySourceStore::new());
    let source = html_source();
    let source_id = source.id;
    sources.insert(source).await;

    let cfg = PipelineConfig::default();
    let scheduler = Scheduler::new(
        Arc::clone(&sources) as Arc<dyn SourceStore>,
        Arc::new(h.pipeline),
        cfg.schedule.clone(),
        cfg.ai.clone(),
        RecordingAlerts::new(),
        CancellationToken::new(),
    );

    let summary = scheduler.tick(Utc::now()).await;
    assert_eq!(summary.succeeded, 1);

    let source = sources.get(source_id).await.unwrap().unwrap();
    assert_eq!(source.last_crawl_status.as_deref(), Some("OK"));
    assert!(source.next_run_at.unwrap() > source.last_crawled_at.unwrap());
    assert!(source.leased_until.is_none());
    assert_eq!(source.consecutive_failures, 0);
}

// ---------------------------------------------------------------------
// Invariant 8: AI budget ceiling per tick
// ---------------------------------------------------------------------

const BUDGET_HTML: &str = r#"<html><body>
<p>Current vacancies, apply by the closing date.</p>
<table>
  <thead><tr><th>Title</th><th>Duty Station</th></tr></thead>
  <tr><td>Officer Alpha</td><td>Bamako / Remote</td></tr>
  <tr><td>Officer Beta</td><td>Goma / Remote</td></tr>
  <tr><td>Officer Gamma</td><td>Juba / Remote</td></tr>
  <tr><td>Officer Delta</td><td>Dakar / Remote</td></tr>
  <tr><td>Officer Epsilon</td><td>Amman / Remote</td></tr>
</table>
</body></html>"#;

#[tokio::test]
async fn ai_calls_respect_the_tick_ceiling() {
    let completer = Arc::new(MockCompleter::with_response(
        r#"{"title":null,"employer":null,"location":null,"deadline":null,"description":null,"application_url":null,"salary":null,"employment_type":null,"posted_on":null}"#,
    ));
    let capabilities = Capabilities::minimal().with_completer(completer.clone());
    let mut cfg = PipelineConfig::default();
    cfg.ai = AiBudgetConfig {
        per_tick: 2,
        per_run: 100,
        cache_size: 64,
    };
    let h = harness_with_cfg(MockFetcher::serving(BUDGET_HTML), capabilities, cfg);

    let tick = TickBudget::new(2);
    let budget = RunBudget::new(
        Arc::clone(&tick),
        &AiBudgetConfig {
            per_tick: 2,
            per_run: 100,
            cache_size: 64,
        },
    );

    let source = html_source();
    let output = h
        .pipeline
        .run_source(&source, &budget, &CancellationToken::new())
        .await
        .unwrap();

    // Five candidates wanted AI help; only the ceiling's worth of calls
    // went out.
    assert_eq!(output.report.counts.found, 5);
    assert_eq!(completer.calls(), 2);
    assert_eq!(tick.remaining(), 0);
}
