//! Environment configuration for the daemon.

use anyhow::{Context, Result};
use std::time::Duration;

use ingestion::PipelineConfig;

/// Everything the daemon reads from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    /// Root directory of the filesystem raw-page store
    pub raw_store_root: String,
    /// browserless-style render service, enables `render_js` sources
    pub browser_endpoint: Option<String>,
    /// Search index endpoint; sink is disabled when absent
    pub search_url: Option<String>,
    pub search_api_key: Option<String>,
    pub search_index: String,
    /// Contact-bearing user agent for the geocoder
    pub geocoder_user_agent: String,
    pub geocoder_base_url: Option<String>,
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

        let mut pipeline = PipelineConfig::default();
        if let Some(tick) = env_secs("SCHEDULER_TICK_SECS") {
            pipeline.schedule.tick = tick;
        }
        if let Some(deadline) = env_secs("RUN_DEADLINE_SECS") {
            pipeline.schedule.run_deadline = deadline;
        }
        if let Some(workers) = env_parse::<usize>("GLOBAL_WORKERS") {
            pipeline.schedule.global_workers = workers;
        }
        if let Some(max_due) = env_parse::<usize>("MAX_DUE_PER_TICK") {
            pipeline.schedule.max_due = max_due;
        }
        if let Some(per_tick) = env_parse::<u32>("AI_BUDGET_PER_TICK") {
            pipeline.ai.per_tick = per_tick;
        }
        if let Some(rps) = env_parse::<u32>("GEOCODE_RPS") {
            pipeline.enrich.geocode_rps = rps;
        }

        Ok(Self {
            database_url,
            raw_store_root: std::env::var("RAW_STORE_ROOT")
                .unwrap_or_else(|_| "./data/raw-pages".to_string()),
            browser_endpoint: std::env::var("BROWSER_ENDPOINT").ok(),
            search_url: std::env::var("SEARCH_URL").ok(),
            search_api_key: std::env::var("SEARCH_API_KEY").ok(),
            search_index: std::env::var("SEARCH_INDEX").unwrap_or_else(|_| "jobs".to_string()),
            geocoder_user_agent: std::env::var("GEOCODER_USER_AGENT")
                .unwrap_or_else(|_| "job-ingestd/1.0".to_string()),
            geocoder_base_url: std::env::var("GEOCODER_BASE_URL").ok(),
            pipeline,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}
