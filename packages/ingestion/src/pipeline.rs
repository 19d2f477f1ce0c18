//! Per-source run orchestration.
//!
//! ```text
//! fetch → raw-page store → extractor cascade → normalize → enrich
//!       → quality score → validate → dedupe/upsert → search sink
//! ```
//!
//! Every stage writes to the observability substrate; each run produces
//! exactly one `extraction_logs` row (raw_page_id NULL when the fetch
//! produced no body). Only a body-less fetch failure aborts a run.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capabilities::Capabilities;
use crate::config::PipelineConfig;
use crate::enrich::Enricher;
use crate::error::RunError;
use crate::extract::{AiExtractor, Cascade, DetailEnricher, ExtractorRegistry, KeywordClassifier, PageClassifier};
use crate::fetch::{
    fetch_with_retries, ApiFetcher, BrowserFetcher, Conditional, FeedFetcher, FetchOutcome,
    Fetcher, HtmlFetcher, RobotsCache,
};
use crate::normalize::Normalizer;
use crate::observe::{NewExtractionLog, NewFailedInsert, ObservabilityStore};
use crate::quality::{apply_report, score_job};
use crate::rawstore::{PayloadExt, RawPageMeta, RawPageStore};
use crate::schedule::budget::RunBudget;
use crate::schedule::domains::DomainLimits;
use crate::sink::SinkHandle;
use crate::types::{
    ExtractionResult, NewJob, RunCounts, RunReport, RunStatus, Source, SourceType,
};
use crate::upsert::{JobStore, UpsertEngine};
use crate::validate::validate_batch;

/// A run report plus the conditional-fetch state the scheduler persists
/// for the next run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: RunReport,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_hash: Option<String>,
}

impl RunOutput {
    fn plain(report: RunReport) -> Self {
        Self {
            report,
            etag: None,
            last_modified: None,
            content_hash: None,
        }
    }
}

pub struct Pipeline {
    cfg: PipelineConfig,
    html_fetcher: Arc<HtmlFetcher>,
    feed_fetcher: Arc<FeedFetcher>,
    api_fetcher: Arc<ApiFetcher>,
    browser_fetcher: Option<Arc<BrowserFetcher>>,
    raw_store: Arc<dyn RawPageStore>,
    cascade: Cascade,
    normalizer: Normalizer,
    enricher: Enricher,
    jobs: Arc<dyn JobStore>,
    observe: Arc<dyn ObservabilityStore>,
    engine: UpsertEngine,
    domains: Arc<DomainLimits>,
    /// When set, all sources fetch through this adapter (tests, replay
    /// from stored raw pages).
    fetcher_override: Option<Arc<dyn Fetcher>>,
}

impl Pipeline {
    pub fn new(
        cfg: PipelineConfig,
        capabilities: &Capabilities,
        raw_store: Arc<dyn RawPageStore>,
        jobs: Arc<dyn JobStore>,
        observe: Arc<dyn ObservabilityStore>,
        sink: SinkHandle,
    ) -> Self {
        let robots = Arc::new(RobotsCache::new(
            crate::fetch::build_client(&cfg.fetch, cfg.fetch.html_timeout),
            cfg.fetch.user_agent.clone(),
        ));
        let html_fetcher = Arc::new(HtmlFetcher::new(&cfg.fetch, Arc::clone(&robots)));
        let feed_fetcher = Arc::new(FeedFetcher::new(&cfg.fetch));
        let api_fetcher = Arc::new(ApiFetcher::new(&cfg.fetch, Arc::clone(&capabilities.secrets)));

        let classifier: Arc<dyn PageClassifier> = Arc::new(KeywordClassifier::new());
        let mut cascade = Cascade::new(classifier);
        if let Some(completer) = &capabilities.completer {
            cascade = cascade.with_ai(AiExtractor::new(Arc::clone(completer), cfg.ai.cache_size));
        }

        let normalizer = Normalizer::new(capabilities.completer.clone(), cfg.ai.cache_size);
        let enricher = Enricher::new(capabilities.geocoder.clone(), &cfg.enrich);
        let engine = UpsertEngine::new(
            Arc::clone(&jobs),
            Arc::clone(&observe),
            sink,
            cfg.upsert.batch_size,
        );
        let domains = Arc::new(DomainLimits::new(cfg.schedule.per_domain));

        Self {
            cfg,
            html_fetcher,
            feed_fetcher,
            api_fetcher,
            browser_fetcher: None,
            raw_store,
            cascade,
            normalizer,
            enricher,
            jobs,
            observe,
            engine,
            domains,
            fetcher_override: None,
        }
    }

    /// Route every fetch through one adapter. Used by tests and by
    /// replay tooling that serves stored raw pages.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher_override = Some(fetcher);
        self
    }

    /// Enable the headless renderer for sources flagged `render_js`.
    pub fn with_browser(mut self, endpoint: impl Into<String>) -> Self {
        let robots = Arc::new(RobotsCache::new(
            crate::fetch::build_client(&self.cfg.fetch, self.cfg.fetch.render_timeout),
            self.cfg.fetch.user_agent.clone(),
        ));
        self.browser_fetcher = Some(Arc::new(
            BrowserFetcher::new(&self.cfg.fetch, endpoint, robots)
                .with_screenshot_store(Arc::clone(&self.raw_store)),
        ));
        self
    }

    /// Swap the page classifier (e.g. an ML scorer).
    pub fn with_classifier(mut self, classifier: Arc<dyn PageClassifier>) -> Self {
        self.cascade.set_classifier(classifier);
        self
    }

    /// Install site-specific extractor plugins.
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.cascade.set_registry(registry);
        self
    }

    fn fetcher_for(&self, source: &Source) -> Arc<dyn Fetcher> {
        if let Some(fetcher) = &self.fetcher_override {
            return Arc::clone(fetcher);
        }
        if source.render_js {
            if let Some(browser) = &self.browser_fetcher {
                return Arc::clone(browser) as Arc<dyn Fetcher>;
            }
            warn!(source = %source.name, "render_js set but no browser endpoint configured");
        }
        match source.source_type {
            SourceType::Html => Arc::clone(&self.html_fetcher) as Arc<dyn Fetcher>,
            SourceType::Rss => Arc::clone(&self.feed_fetcher) as Arc<dyn Fetcher>,
            SourceType::Api => Arc::clone(&self.api_fetcher) as Arc<dyn Fetcher>,
        }
    }

    /// Fetch-only probe for the admin `test` operation. One attempt, no
    /// raw-page write, no extraction.
    pub async fn probe(&self, source: &Source) -> Result<FetchOutcome, crate::error::FetchError> {
        let fetcher = self.fetcher_for(source);
        fetcher.fetch(source, &Conditional::default()).await
    }

    /// Fetch + extract + normalize without any upsert, for the admin
    /// `simulate_extract` operation. Runs with a zero AI budget.
    pub async fn simulate(
        &self,
        source: &Source,
    ) -> Result<(ExtractionResult, Vec<NewJob>), RunError> {
        let fetcher = self.fetcher_for(source);
        let outcome = fetch_with_retries(fetcher.as_ref(), source, &Conditional::default(), &self.cfg.fetch)
            .await?;
        let body = outcome.body.unwrap_or_default();

        let budget = RunBudget::exhausted();
        let cancel = CancellationToken::new();
        let extraction = self
            .cascade
            .extract(source, &outcome.final_url, &body, &budget, None, &cancel)
            .await;

        let today = Utc::now().date_naive();
        let mut jobs = Vec::new();
        for cand in &extraction.candidates {
            let (mut job, _issues) = self.normalizer.normalize(source.id, cand, &budget).await;
            let quality = score_job(&job, today);
            apply_report(&mut job, &quality, Utc::now());
            jobs.push(job);
        }

        Ok((extraction, jobs))
    }

    /// One full source run.
    pub async fn run_source(
        &self,
        source: &Source,
        budget: &RunBudget,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError> {
        let started = Instant::now();
        let fetcher = self.fetcher_for(source);
        let cond = Conditional::from_source(source);

        // Entry fetch under the domain cap.
        let outcome = {
            let host = source.host().unwrap_or_else(|| "unknown".to_string());
            let _permit = self.domains.acquire(&host).await;
            fetch_with_retries(fetcher.as_ref(), source, &cond, &self.cfg.fetch).await
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                // Invariant: one log row per run, NULL raw_page_id.
                self.write_log(
                    source,
                    None,
                    &source.careers_url,
                    RunStatus::Empty,
                    Some(error.kind.as_str().to_string()),
                    Vec::new(),
                )
                .await;
                return Err(error.into());
            }
        };

        // 304 short-circuit: nothing changed upstream.
        if outcome.not_modified {
            return Ok(self
                .short_circuit(source, &outcome, "not modified", started, None)
                .await);
        }

        let body = outcome.body.clone().unwrap_or_default();
        let content_hash = crate::canonical::sha256_hex(body.as_bytes());

        // Content-hash short-circuit: same bytes as the previous run.
        if source.last_content_hash.as_deref() == Some(content_hash.as_str()) {
            return Ok(self
                .short_circuit(source, &outcome, "content unchanged", started, Some(content_hash))
                .await);
        }

        // Raw-page snapshot. Failure to archive is never fatal.
        let meta = RawPageMeta {
            source_id: source.id,
            url: outcome.final_url.clone(),
            status: outcome.status,
            headers: outcome.headers.clone(),
            fetched_at: Utc::now(),
            ext: match source.source_type {
                SourceType::Html => PayloadExt::Html,
                SourceType::Rss => PayloadExt::Xml,
                SourceType::Api => PayloadExt::Json,
            },
        };
        let raw_page_id = match self.raw_store.put(body.as_bytes(), &meta).await {
            Ok(storage_path) => {
                match self
                    .observe
                    .record_raw_page(&meta, &storage_path, body.len())
                    .await
                {
                    Ok(id) => Some(id),
                    Err(e) => {
                        // Blob is orphan-scavengeable; the run continues.
                        warn!(source = %source.name, error = %e, "raw-page sidecar write failed");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(source = %source.name, error = %e, "raw-page store write failed");
                None
            }
        };

        if cancel.is_cancelled() {
            return self
                .finalize_cancelled(source, &outcome, raw_page_id, RunCounts::default(), started)
                .await;
        }

        // Extraction.
        let detail = source.detail_fetch_enabled.then(|| {
            DetailEnricher::new(
                Arc::clone(&self.html_fetcher),
                Arc::clone(&self.domains),
                self.cfg.detail.max_per_run,
            )
        });
        let extraction = self
            .cascade
            .extract(source, &outcome.final_url, &body, budget, detail.as_ref(), cancel)
            .await;

        for stage_error in &extraction.stage_errors {
            debug!(
                source = %source.name,
                stage = stage_error.stage.as_str(),
                kind = %stage_error.kind,
                "extraction stage degraded"
            );
        }

        if extraction.candidates.is_empty() {
            let reason = if !extraction.is_job {
                "classifier rejected page".to_string()
            } else {
                "no candidates extracted".to_string()
            };
            self.write_log(
                source,
                raw_page_id,
                &outcome.final_url,
                RunStatus::Empty,
                Some(reason.clone()),
                Vec::new(),
            )
            .await;
            let report = RunReport::new(source.id, RunStatus::Empty, RunCounts::default())
                .with_message(reason)
                .with_duration_ms(started.elapsed().as_millis() as u64);
            return Ok(RunOutput {
                report: RunReport {
                    raw_page_id,
                    ..report
                },
                etag: outcome.etag,
                last_modified: outcome.last_modified,
                content_hash: Some(content_hash),
            });
        }

        // Normalize, enrich, score.
        let today = Utc::now().date_naive();
        let mut jobs: Vec<NewJob> = Vec::with_capacity(extraction.candidates.len());
        let mut cancelled = false;
        for cand in &extraction.candidates {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let (mut job, issues) = self.normalizer.normalize(source.id, cand, budget).await;
            for issue in &issues {
                debug!(source = %source.name, url = %cand.url, ?issue, "normalization issue");
            }
            self.enricher.enrich(&mut job).await;
            let quality = score_job(&job, today);
            apply_report(&mut job, &quality, Utc::now());
            jobs.push(job);
        }

        // Validate; blocked jobs land in the ledger.
        let validation = validate_batch(jobs);
        for invalid in &validation.invalid {
            let entry =
                NewFailedInsert::validation(source.id, &invalid.job, &invalid.error, raw_page_id);
            if let Err(e) = self.observe.record_failed_insert(entry).await {
                warn!(source = %source.name, error = %e, "failed to write validation ledger row");
            }
        }
        for warning in &validation.warnings {
            debug!(source = %source.name, ?warning, "validation warning");
        }

        // Upsert and sink.
        let found = extraction.candidates.len();
        let had_valid = !validation.valid.is_empty();
        let mut counts = self.engine.run(source.id, validation.valid, raw_page_id).await;
        counts.found = found;
        counts.failed += validation.invalid.len();

        let status = if cancelled {
            if counts.committed() > 0 {
                RunStatus::Partial
            } else {
                RunStatus::Empty
            }
        } else if had_valid && counts.committed() + counts.skipped == 0 && counts.failed > 0 {
            RunStatus::DbFail
        } else if !had_valid {
            RunStatus::Partial
        } else {
            RunStatus::Ok
        };

        let reason = if cancelled {
            Some("cancelled at stage boundary".to_string())
        } else {
            None
        };
        self.write_log(
            source,
            raw_page_id,
            &outcome.final_url,
            status,
            reason,
            extraction.extracted_field_names(),
        )
        .await;

        let message = format!(
            "{} found, {} inserted, {} updated, {} skipped, {} failed",
            counts.found, counts.inserted, counts.updated, counts.skipped, counts.failed
        );
        let report = RunReport {
            raw_page_id,
            ..RunReport::new(source.id, status, counts)
                .with_message(message)
                .with_duration_ms(started.elapsed().as_millis() as u64)
        };

        Ok(RunOutput {
            report,
            etag: outcome.etag,
            last_modified: outcome.last_modified,
            content_hash: Some(content_hash),
        })
    }

    /// 304 / unchanged-content path: no extraction, prior rows count as
    /// skipped, conditional state is refreshed.
    async fn short_circuit(
        &self,
        source: &Source,
        outcome: &FetchOutcome,
        reason: &str,
        started: Instant,
        content_hash: Option<String>,
    ) -> RunOutput {
        let prior = self.jobs.count_for_source(source.id).await.unwrap_or(0) as usize;
        let counts = RunCounts {
            skipped: prior,
            ..RunCounts::default()
        };

        self.write_log(
            source,
            None,
            &outcome.final_url,
            RunStatus::Ok,
            Some(reason.to_string()),
            Vec::new(),
        )
        .await;

        let report = RunReport {
            not_modified: true,
            ..RunReport::new(source.id, RunStatus::Ok, counts)
                .with_message(reason)
                .with_duration_ms(started.elapsed().as_millis() as u64)
        };

        RunOutput {
            report,
            etag: outcome.etag.clone(),
            last_modified: outcome.last_modified.clone(),
            content_hash,
        }
    }

    async fn finalize_cancelled(
        &self,
        source: &Source,
        outcome: &FetchOutcome,
        raw_page_id: Option<uuid::Uuid>,
        counts: RunCounts,
        started: Instant,
    ) -> Result<RunOutput, RunError> {
        let status = if counts.committed() > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Empty
        };
        self.write_log(
            source,
            raw_page_id,
            &outcome.final_url,
            status,
            Some("cancelled at stage boundary".to_string()),
            Vec::new(),
        )
        .await;
        let report = RunReport {
            raw_page_id,
            ..RunReport::new(source.id, status, counts)
                .with_message("cancelled")
                .with_duration_ms(started.elapsed().as_millis() as u64)
        };
        Ok(RunOutput::plain(report))
    }

    async fn write_log(
        &self,
        source: &Source,
        raw_page_id: Option<uuid::Uuid>,
        url: &str,
        status: RunStatus,
        reason: Option<String>,
        extracted_fields: Vec<String>,
    ) {
        let log = NewExtractionLog {
            source_id: source.id,
            raw_page_id,
            url: url.to_string(),
            status,
            reason,
            extracted_fields,
        };
        if let Err(e) = self.observe.record_log(log).await {
            warn!(source = %source.name, error = %e, "failed to write extraction log");
        }
    }
}
