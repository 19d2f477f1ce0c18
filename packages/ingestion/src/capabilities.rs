//! Injected capability interfaces.
//!
//! The pipeline never talks to providers directly; everything external
//! (AI completion, geocoding, secrets, alerting) arrives through this
//! bundle, constructed once at startup. Process-wide state is limited to
//! the AI response cache and the geocoder token bucket, both owned by
//! the components that use them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AiError, GeocodeError};
use crate::secrets::{EnvSecrets, SecretResolver};

/// Chat-completion capability used by the AI fallback extractor and the
/// AI normalizer. Implementations return the raw model text; strict JSON
/// parsing happens at the call site.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError>;
}

/// One forward-geocoding hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    pub country_iso: Option<String>,
    pub city: Option<String>,
}

/// Forward geocoding capability. Rate limiting lives in the enricher,
/// not in implementations.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<GeoPoint, GeocodeError>;
}

/// Operational alerts raised by the scheduler and sinks.
#[derive(Debug, Clone)]
pub enum Alert {
    /// A source crossed the consecutive-failure threshold and was paused
    SourcePaused { source_id: Uuid, failures: i32 },
    /// The search sink exhausted its retries
    SinkDegraded { consecutive_failures: u64 },
}

pub trait Alerts: Send + Sync {
    fn emit(&self, alert: Alert);
}

/// Default alert sink: structured log lines.
#[derive(Debug, Default)]
pub struct TracingAlerts;

impl Alerts for TracingAlerts {
    fn emit(&self, alert: Alert) {
        match alert {
            Alert::SourcePaused { source_id, failures } => {
                tracing::error!(source_id = %source_id, failures, "source auto-paused by circuit breaker");
            }
            Alert::SinkDegraded { consecutive_failures } => {
                tracing::error!(consecutive_failures, "search sink degraded");
            }
        }
    }
}

/// Everything external, bundled for injection.
#[derive(Clone)]
pub struct Capabilities {
    /// Absent when no AI provider is configured; the AI stages no-op.
    pub completer: Option<Arc<dyn Completer>>,
    /// Absent when geocoding is disabled; enrichment degrades to the
    /// remote-keyword heuristic.
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub secrets: Arc<dyn SecretResolver>,
    pub alerts: Arc<dyn Alerts>,
}

impl Capabilities {
    /// Env-backed secrets, log alerts, no AI, no geocoder.
    pub fn minimal() -> Self {
        Self {
            completer: None,
            geocoder: None,
            secrets: Arc::new(EnvSecrets),
            alerts: Arc::new(TracingAlerts),
        }
    }

    pub fn with_completer(mut self, completer: Arc<dyn Completer>) -> Self {
        self.completer = Some(completer);
        self
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretResolver>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn Alerts>) -> Self {
        self.alerts = alerts;
        self
    }
}
