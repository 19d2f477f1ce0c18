//! Ingestion daemon.
//!
//! Wires configuration, stores, and capabilities together, then runs
//! the scheduler loop until ctrl-c.

mod adapters;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::AiClient;
use geocoder_client::GeocoderClient;
use ingestion::{
    Capabilities, FsRawStore, HttpSearchSink, Pipeline, PostgresJobStore,
    PostgresObservabilityStore, PostgresSourceStore, RetryingSink, Scheduler, SinkHandle,
    TracingAlerts,
};

use adapters::{AiCompleter, NominatimGeocoder};
use config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    // Stores (each creates its own tables on first run)
    let sources = Arc::new(PostgresSourceStore::from_pool(pool.clone()).await?);
    let jobs = Arc::new(PostgresJobStore::from_pool(pool.clone()).await?);
    let observe = Arc::new(PostgresObservabilityStore::from_pool(pool.clone()).await?);
    let raw_store = Arc::new(FsRawStore::new(&config.raw_store_root));

    // Capabilities
    let mut capabilities = Capabilities::minimal().with_alerts(Arc::new(TracingAlerts));
    match AiClient::from_env() {
        Ok(client) => {
            info!(model = client.model(), "AI fallback enabled");
            capabilities = capabilities.with_completer(Arc::new(AiCompleter::new(client)));
        }
        Err(_) => info!("AI_API_KEY not set, AI fallback disabled"),
    }
    let mut geocoder_client = GeocoderClient::new(config.geocoder_user_agent.clone());
    if let Some(base_url) = &config.geocoder_base_url {
        geocoder_client = geocoder_client.with_base_url(base_url);
    }
    capabilities = capabilities.with_geocoder(Arc::new(NominatimGeocoder::new(geocoder_client)));

    // Search sink
    let sink = match &config.search_url {
        Some(url) => {
            let mut sink = HttpSearchSink::new(url, &config.search_index);
            if let Some(key) = &config.search_api_key {
                sink = sink.with_api_key(key);
            }
            info!(url = %url, index = %config.search_index, "search sink enabled");
            SinkHandle::new(Arc::new(RetryingSink::new(sink, &config.pipeline.sink)))
        }
        None => {
            info!("SEARCH_URL not set, search sink disabled");
            SinkHandle::disabled()
        }
    };

    // Pipeline
    let mut pipeline = Pipeline::new(
        config.pipeline.clone(),
        &capabilities,
        raw_store,
        jobs,
        observe,
        sink,
    );
    if let Some(endpoint) = &config.browser_endpoint {
        info!(endpoint = %endpoint, "headless renderer enabled");
        pipeline = pipeline.with_browser(endpoint);
    }

    // Scheduler
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(
        sources,
        Arc::new(pipeline),
        config.pipeline.schedule.clone(),
        config.pipeline.ai.clone(),
        capabilities.alerts.clone(),
        cancel.clone(),
    );

    let scheduler_task = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    cancel.cancel();
    scheduler_task.await.ok();

    Ok(())
}
