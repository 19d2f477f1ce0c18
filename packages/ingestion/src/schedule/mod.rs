//! The scheduler: selects due sources, dispatches concurrent runs, and
//! applies post-run bookkeeping.
//!
//! ```text
//! tick (60s)
//!   ├─► lease_due(now, max_due)          -- SKIP LOCKED + leased_until
//!   └─► per source: acquire worker slot
//!           └─► pipeline.run_source()    -- cancelled at the deadline
//!                   └─► complete_run()   -- backoff / nochange / pause
//! ```
//!
//! Failure policy: retriable fetch errors back off exponentially with
//! jitter; permanent ones back off the same way; at
//! `pause_after` consecutive failures the circuit breaker pauses the
//! source and raises an alert.

pub mod budget;
pub mod domains;
pub mod sources;

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capabilities::{Alert, Alerts};
use crate::config::{AiBudgetConfig, ScheduleConfig};
use crate::error::RunError;
use crate::pipeline::{Pipeline, RunOutput};
use crate::types::{RunReport, RunStatus, Source};

pub use budget::{RunBudget, TickBudget};
pub use domains::DomainLimits;
pub use sources::{MemorySourceStore, SourceRunUpdate, SourceStore};
#[cfg(feature = "postgres")]
pub use sources::PostgresSourceStore;

/// Backoff after the nth consecutive failure: `base * 2^n`, capped.
pub fn failure_backoff(cfg: &ScheduleConfig, failures: i32) -> std::time::Duration {
    let exponent = failures.clamp(0, 20) as u32;
    let delay = cfg
        .base_backoff
        .saturating_mul(2u32.saturating_pow(exponent));
    delay.min(cfg.max_backoff)
}

/// Apply ±`jitter` fractional noise to a delay.
pub fn apply_jitter(delay: std::time::Duration, jitter: f64) -> std::time::Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    delay.mul_f64(factor.max(0.0))
}

/// Interval until the next run after a completed (non-error) run.
/// Quiet sources (>= `nochange_scale_after` unchanged runs) stretch to
/// twice their frequency, capped at `frequency_cap_days`.
pub fn success_interval(cfg: &ScheduleConfig, frequency_days: i32, nochange: i32) -> ChronoDuration {
    let mut days = frequency_days.max(1) as i64;
    if nochange >= cfg.nochange_scale_after {
        days *= 2;
    }
    ChronoDuration::days(days.min(cfg.frequency_cap_days))
}

/// Bookkeeping for a run that produced a report.
pub fn bookkeeping_for_report(
    source: &Source,
    report: &RunReport,
    output: &RunOutput,
    cfg: &ScheduleConfig,
    now: DateTime<Utc>,
) -> SourceRunUpdate {
    let mut update = SourceRunUpdate {
        last_crawled_at: Some(now),
        last_crawl_status: Some(report.status.as_str().to_string()),
        clear_lease: true,
        ..Default::default()
    };

    match report.status {
        RunStatus::Ok => {
            update.consecutive_failures = Some(0);
            let nochange = if report.changed_anything() {
                0
            } else {
                source.consecutive_nochange + 1
            };
            update.consecutive_nochange = Some(nochange);
            update.next_run_at =
                Some(now + success_interval(cfg, source.crawl_frequency_days, nochange));
        }
        RunStatus::Partial | RunStatus::Empty | RunStatus::DbFail => {
            // No backoff, no failure accounting: reschedule normally.
            update.next_run_at =
                Some(now + ChronoDuration::days(source.crawl_frequency_days.max(1) as i64));
        }
    }

    // Conditional-fetch state for the next run.
    if output.etag.is_some() {
        update.etag = Some(output.etag.clone());
    }
    if output.last_modified.is_some() {
        update.last_modified = Some(output.last_modified.clone());
    }
    if output.content_hash.is_some() {
        update.last_content_hash = Some(output.content_hash.clone());
    }

    update
}

/// Bookkeeping for a run that failed outright. Returns the update plus
/// whether the circuit breaker should pause the source.
pub fn bookkeeping_for_error(
    source: &Source,
    error: &RunError,
    cfg: &ScheduleConfig,
    now: DateTime<Utc>,
) -> (SourceRunUpdate, bool) {
    // Shutdown cancellation and lease loss are not source failures:
    // release the lease and leave the schedule untouched.
    if matches!(error, RunError::Cancelled | RunError::LeaseLost) {
        let update = SourceRunUpdate {
            last_crawl_status: Some(error.kind().to_string()),
            clear_lease: true,
            ..Default::default()
        };
        return (update, false);
    }

    let failures = source.consecutive_failures + 1;
    let delay = apply_jitter(failure_backoff(cfg, failures), cfg.jitter);

    let update = SourceRunUpdate {
        last_crawled_at: Some(now),
        last_crawl_status: Some(error.kind().to_string()),
        next_run_at: Some(now + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::hours(1))),
        consecutive_failures: Some(failures),
        clear_lease: true,
        ..Default::default()
    };

    (update, failures >= cfg.pause_after)
}

/// Outcome of one tick, for logs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickSummary {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Scheduler {
    sources: Arc<dyn SourceStore>,
    pipeline: Arc<Pipeline>,
    cfg: ScheduleConfig,
    ai_cfg: AiBudgetConfig,
    alerts: Arc<dyn Alerts>,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        pipeline: Arc<Pipeline>,
        cfg: ScheduleConfig,
        ai_cfg: AiBudgetConfig,
        alerts: Arc<dyn Alerts>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let workers = Arc::new(Semaphore::new(cfg.global_workers.max(1)));
        Arc::new(Self {
            sources,
            pipeline,
            cfg,
            ai_cfg,
            alerts,
            workers,
            cancel,
        })
    }

    /// The scheduler loop. Returns when the cancellation token fires.
    pub async fn run(self: Arc<Self>) {
        info!(
            tick_secs = self.cfg.tick.as_secs(),
            max_due = self.cfg.max_due,
            workers = self.cfg.global_workers,
            "scheduler started"
        );
        let mut interval = tokio::time::interval(self.cfg.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = interval.tick() => {
                    let summary = Arc::clone(&self).tick(Utc::now()).await;
                    if summary.dispatched > 0 {
                        info!(
                            dispatched = summary.dispatched,
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            "tick complete"
                        );
                    }
                }
            }
        }
    }

    /// One scheduling pass: lease due sources and run them to completion.
    pub async fn tick(self: Arc<Self>, now: DateTime<Utc>) -> TickSummary {
        let due = match self
            .sources
            .lease_due(now, self.cfg.max_due, self.cfg.lease_duration())
            .await
        {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to select due sources");
                return TickSummary::default();
            }
        };

        if due.is_empty() {
            return TickSummary::default();
        }

        let tick_budget = TickBudget::new(self.ai_cfg.per_tick);
        let mut summary = TickSummary {
            dispatched: due.len(),
            ..TickSummary::default()
        };

        let mut handles = Vec::with_capacity(due.len());
        for source in due {
            let scheduler = Arc::clone(&self);
            let budget = RunBudget::new(Arc::clone(&tick_budget), &self.ai_cfg);
            handles.push(tokio::spawn(async move {
                let _permit = scheduler
                    .workers
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("worker semaphore is never closed");
                scheduler.run_one(source, budget).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    error!(error = %e, "source worker panicked");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Run one source end to end and write its bookkeeping. Returns
    /// whether the run produced a report (vs a hard failure).
    async fn run_one(&self, source: Source, budget: RunBudget) -> bool {
        let run_cancel = self.cancel.child_token();

        // The run deadline fires the cooperative cancel flag; the
        // pipeline observes it at stage boundaries and finalizes.
        let deadline_guard = {
            let token = run_cancel.clone();
            let deadline = self.cfg.run_deadline;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                token.cancel();
            })
        };

        let result = self.pipeline.run_source(&source, &budget, &run_cancel).await;
        deadline_guard.abort();

        let now = Utc::now();
        match result {
            Ok(output) => {
                let update = bookkeeping_for_report(&source, &output.report, &output, &self.cfg, now);
                if let Err(e) = self.sources.complete_run(source.id, update).await {
                    error!(source = %source.name, error = %e, "failed to write run bookkeeping");
                }
                info!(
                    source = %source.name,
                    status = output.report.status.as_str(),
                    inserted = output.report.counts.inserted,
                    updated = output.report.counts.updated,
                    skipped = output.report.counts.skipped,
                    failed = output.report.counts.failed,
                    duration_ms = output.report.duration_ms,
                    "run complete"
                );
                true
            }
            Err(error) => {
                let (update, should_pause) = bookkeeping_for_error(&source, &error, &self.cfg, now);
                let failures = update.consecutive_failures.unwrap_or(0);
                if let Err(e) = self.sources.complete_run(source.id, update).await {
                    error!(source = %source.name, error = %e, "failed to write run bookkeeping");
                }
                warn!(
                    source = %source.name,
                    kind = error.kind(),
                    failures,
                    "run failed"
                );
                if should_pause {
                    if let Err(e) = self.sources.pause(source.id).await {
                        error!(source = %source.name, error = %e, "failed to pause source");
                    } else {
                        self.alerts.emit(Alert::SourcePaused {
                            source_id: source.id,
                            failures,
                        });
                    }
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::types::{RunCounts, SourceType};
    use uuid::Uuid;

    fn cfg() -> ScheduleConfig {
        ScheduleConfig::default()
    }

    fn report(status: RunStatus, counts: RunCounts) -> (RunReport, RunOutput) {
        let report = RunReport::new(Uuid::new_v4(), status, counts);
        let output = RunOutput {
            report: report.clone(),
            etag: None,
            last_modified: None,
            content_hash: None,
        };
        (report, output)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = cfg();
        assert_eq!(failure_backoff(&cfg, 1), cfg.base_backoff * 2);
        assert_eq!(failure_backoff(&cfg, 2), cfg.base_backoff * 4);
        assert_eq!(failure_backoff(&cfg, 30), cfg.max_backoff);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = std::time::Duration::from_secs(1000);
        for _ in 0..100 {
            let jittered = apply_jitter(base, 0.10);
            assert!(jittered >= std::time::Duration::from_secs(900));
            assert!(jittered <= std::time::Duration::from_secs(1100));
        }
    }

    #[test]
    fn quiet_sources_stretch_to_double_frequency_capped() {
        let cfg = cfg();
        assert_eq!(success_interval(&cfg, 2, 0), ChronoDuration::days(2));
        assert_eq!(success_interval(&cfg, 2, 3), ChronoDuration::days(4));
        assert_eq!(success_interval(&cfg, 10, 5), ChronoDuration::days(14));
    }

    #[test]
    fn ok_run_resets_failures_and_advances_next_run() {
        let cfg = cfg();
        let now = Utc::now();
        let mut source = Source::new("s", "https://a.org/jobs", SourceType::Html);
        source.consecutive_failures = 4;
        source.crawl_frequency_days = 2;

        let counts = RunCounts { found: 3, inserted: 3, ..RunCounts::default() };
        let (rep, out) = report(RunStatus::Ok, counts);
        let update = bookkeeping_for_report(&source, &rep, &out, &cfg, now);

        assert_eq!(update.consecutive_failures, Some(0));
        assert_eq!(update.consecutive_nochange, Some(0));
        assert_eq!(update.next_run_at, Some(now + ChronoDuration::days(2)));
        assert!(update.clear_lease);
        // Scheduler monotonicity: next_run_at > last_crawled_at
        assert!(update.next_run_at.unwrap() > update.last_crawled_at.unwrap());
    }

    #[test]
    fn nochange_runs_accumulate_and_stretch() {
        let cfg = cfg();
        let now = Utc::now();
        let mut source = Source::new("s", "https://a.org/jobs", SourceType::Html);
        source.crawl_frequency_days = 3;
        source.consecutive_nochange = 2;

        let counts = RunCounts { found: 5, skipped: 5, ..RunCounts::default() };
        let (rep, out) = report(RunStatus::Ok, counts);
        let update = bookkeeping_for_report(&source, &rep, &out, &cfg, now);

        // Third quiet run in a row: frequency doubles
        assert_eq!(update.consecutive_nochange, Some(3));
        assert_eq!(update.next_run_at, Some(now + ChronoDuration::days(6)));
    }

    #[test]
    fn partial_and_empty_reschedule_without_backoff() {
        let cfg = cfg();
        let now = Utc::now();
        let mut source = Source::new("s", "https://a.org/jobs", SourceType::Html);
        source.consecutive_failures = 2;

        for status in [RunStatus::Partial, RunStatus::Empty] {
            let (rep, out) = report(status, RunCounts::default());
            let update = bookkeeping_for_report(&source, &rep, &out, &cfg, now);
            // Failures untouched: PARTIAL does not count toward the breaker
            assert_eq!(update.consecutive_failures, None);
            assert_eq!(update.next_run_at, Some(now + ChronoDuration::days(1)));
        }
    }

    #[test]
    fn failures_back_off_and_trip_the_breaker() {
        let cfg = cfg();
        let now = Utc::now();
        let mut source = Source::new("s", "https://a.org/jobs", SourceType::Html);
        source.consecutive_failures = 8;

        let error = RunError::Fetch(crate::error::FetchError::new(
            crate::error::FetchErrorKind::Http5xx(503),
            "HTTP 503",
        ));

        let (update, pause) = bookkeeping_for_error(&source, &error, &cfg, now);
        assert_eq!(update.consecutive_failures, Some(9));
        assert!(!pause);
        assert!(update.next_run_at.unwrap() > now);

        source.consecutive_failures = 9;
        let (update, pause) = bookkeeping_for_error(&source, &error, &cfg, now);
        assert_eq!(update.consecutive_failures, Some(10));
        assert!(pause, "tenth consecutive failure trips the breaker");
    }
}
