//! Pipeline configuration.
//!
//! Everything an operator can tune lives here, with the documented
//! defaults. The server binary populates this from the environment.

use std::time::Duration;

/// Version stamp written into every extraction result.
pub const PIPELINE_VERSION: &str = "1.3.0";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub schedule: ScheduleConfig,
    pub ai: AiBudgetConfig,
    pub enrich: EnrichConfig,
    pub detail: DetailConfig,
    pub upsert: UpsertConfig,
    pub sink: SinkConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            schedule: ScheduleConfig::default(),
            ai: AiBudgetConfig::default(),
            enrich: EnrichConfig::default(),
            detail: DetailConfig::default(),
            upsert: UpsertConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

/// Fetch deadlines, size caps, and retry policy.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub html_timeout: Duration,
    pub feed_timeout: Duration,
    pub api_timeout: Duration,
    pub render_timeout: Duration,

    pub html_max_bytes: usize,
    pub feed_max_bytes: usize,
    pub api_max_bytes: usize,

    /// Per-request retries for retriable fetch errors
    pub retries: u32,
    /// Backoff before each retry, indexed by attempt
    pub retry_backoff: Vec<Duration>,

    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            html_timeout: Duration::from_secs(30),
            feed_timeout: Duration::from_secs(15),
            api_timeout: Duration::from_secs(20),
            render_timeout: Duration::from_secs(30),
            html_max_bytes: 5 * 1024 * 1024,
            feed_max_bytes: 2 * 1024 * 1024,
            api_max_bytes: 10 * 1024 * 1024,
            retries: 2,
            retry_backoff: vec![Duration::from_secs(1), Duration::from_secs(4)],
            user_agent: "JobIngestBot/1.0 (+https://github.com/reliefworks/ingestion)".to_string(),
        }
    }
}

/// Scheduler loop tuning.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Wake interval of the scheduler loop
    pub tick: Duration,
    /// Sources dispatched per tick at most
    pub max_due: usize,
    /// Global in-flight source runs
    pub global_workers: usize,
    /// In-flight requests per host
    pub per_domain: usize,
    /// Hard deadline for one run
    pub run_deadline: Duration,
    /// Lease duration is 2x the run deadline
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// +-fraction of jitter applied to backoff delays
    pub jitter: f64,
    /// Auto-pause a source after this many consecutive failures
    pub pause_after: i32,
    /// Scale crawl frequency after this many no-change runs
    pub nochange_scale_after: i32,
    /// Never reschedule further out than this many days
    pub frequency_cap_days: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            max_due: 10,
            global_workers: 8,
            per_domain: 1,
            run_deadline: Duration::from_secs(15 * 60),
            base_backoff: Duration::from_secs(10 * 60),
            max_backoff: Duration::from_secs(24 * 60 * 60),
            jitter: 0.10,
            pause_after: 10,
            nochange_scale_after: 3,
            frequency_cap_days: 14,
        }
    }
}

impl ScheduleConfig {
    pub fn lease_duration(&self) -> Duration {
        self.run_deadline * 2
    }
}

/// AI-fallback spend controls.
#[derive(Debug, Clone)]
pub struct AiBudgetConfig {
    /// Ceiling on AI calls across all sources in one scheduler tick
    pub per_tick: u32,
    /// Ceiling on AI calls within one source run
    pub per_run: u32,
    /// LRU entries in the prompt-keyed response cache
    pub cache_size: usize,
}

impl Default for AiBudgetConfig {
    fn default() -> Self {
        Self {
            per_tick: 200,
            per_run: 25,
            cache_size: 1024,
        }
    }
}

/// Geocoding enrichment tuning.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Token-bucket rate for the geocoder, requests per second
    pub geocode_rps: u32,
    /// How long an acquire may suspend before returning rate_limited
    pub acquire_timeout: Duration,
    /// LRU entries keyed by normalized location string
    pub cache_size: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            geocode_rps: 1,
            acquire_timeout: Duration::from_secs(5),
            cache_size: 2048,
        }
    }
}

/// One-hop detail-fetch enrichment.
#[derive(Debug, Clone)]
pub struct DetailConfig {
    /// Detail fetches per source run at most
    pub max_per_run: usize,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self { max_per_run: 50 }
    }
}

#[derive(Debug, Clone)]
pub struct UpsertConfig {
    /// Jobs per transaction
    pub batch_size: usize,
}

impl Default for UpsertConfig {
    fn default() -> Self {
        Self { batch_size: 500 }
    }
}

/// Search-sink retry policy.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operator_documentation() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.fetch.html_timeout, Duration::from_secs(30));
        assert_eq!(cfg.fetch.feed_timeout, Duration::from_secs(15));
        assert_eq!(cfg.fetch.api_timeout, Duration::from_secs(20));
        assert_eq!(cfg.fetch.retries, 2);
        assert_eq!(cfg.schedule.tick, Duration::from_secs(60));
        assert_eq!(cfg.schedule.run_deadline, Duration::from_secs(900));
        assert_eq!(cfg.schedule.lease_duration(), Duration::from_secs(1800));
        assert_eq!(cfg.ai.per_tick, 200);
        assert_eq!(cfg.detail.max_per_run, 50);
        assert_eq!(cfg.upsert.batch_size, 500);
    }
}
