//! Test doubles for the pipeline's capability and fetch seams.
//!
//! These are plain hand-written mocks; pair them with the in-memory
//! stores (`MemoryRawStore`, `MemoryJobStore`, `MemoryObservabilityStore`,
//! `MemorySourceStore`, `MemorySink`) for full end-to-end tests without
//! a network or a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::capabilities::{Completer, GeoPoint, Geocoder};
use crate::error::{AiError, FetchError, FetchErrorKind, GeocodeError};
use crate::fetch::{Conditional, FetchOutcome, Fetcher};
use crate::types::Source;

/// A fetcher that replays scripted outcomes.
///
/// Outcomes are consumed in order per call; the last one repeats.
pub struct MockFetcher {
    script: Mutex<Vec<Result<FetchOutcome, FetchError>>>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A fetcher that always serves one body with HTTP 200.
    pub fn serving(body: &str) -> Self {
        let fetcher = Self::new();
        fetcher
            .script
            .try_lock()
            .expect("fresh mutex")
            .push(Ok(outcome_with_body(body)));
        fetcher
    }

    /// A fetcher that always fails with the given kind.
    pub fn failing(kind: FetchErrorKind) -> Self {
        let fetcher = Self::new();
        fetcher
            .script
            .try_lock()
            .expect("fresh mutex")
            .push(Err(FetchError::new(kind, "scripted failure")));
        fetcher
    }

    /// Append a scripted outcome.
    pub fn then(self, outcome: Result<FetchOutcome, FetchError>) -> Self {
        self.script.try_lock().expect("setup is single-threaded").push(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, _source: &Source, _cond: &Conditional) -> Result<FetchOutcome, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().await;
        let index = call.min(script.len().saturating_sub(1));
        script
            .get(index)
            .cloned()
            .unwrap_or_else(|| Ok(outcome_with_body("")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Build a plain 200 outcome for a body.
pub fn outcome_with_body(body: &str) -> FetchOutcome {
    FetchOutcome {
        status: 200,
        body: Some(body.to_string()),
        content_type: Some("text/html".to_string()),
        etag: None,
        last_modified: None,
        final_url: "https://example.org/careers".to_string(),
        elapsed: Duration::from_millis(5),
        not_modified: false,
        headers: HashMap::new(),
    }
}

/// Build a 304 outcome carrying the conditional state back.
pub fn outcome_not_modified(etag: &str) -> FetchOutcome {
    FetchOutcome {
        status: 304,
        body: None,
        content_type: None,
        etag: Some(etag.to_string()),
        last_modified: None,
        final_url: "https://example.org/careers".to_string(),
        elapsed: Duration::from_millis(2),
        not_modified: true,
        headers: HashMap::new(),
    }
}

/// A completer that returns a fixed response and counts calls.
pub struct MockCompleter {
    response: Result<String, AiError>,
    calls: AtomicUsize,
}

impl MockCompleter {
    pub fn with_response(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: AiError) -> Self {
        Self {
            response: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

/// A geocoder backed by a fixed table, keyed by normalized query.
#[derive(Default)]
pub struct MockGeocoder {
    places: HashMap<String, GeoPoint>,
    calls: AtomicUsize,
}

impl MockGeocoder {
    pub fn with_place(mut self, query: &str, point: GeoPoint) -> Self {
        self.places.insert(query.to_lowercase(), point);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, query: &str) -> Result<GeoPoint, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.places
            .get(&query.to_lowercase())
            .cloned()
            .ok_or_else(|| GeocodeError::NoResult(query.to_string()))
    }
}

/// Collects alerts for assertions.
#[derive(Default)]
pub struct RecordingAlerts {
    alerts: std::sync::Mutex<Vec<crate::capabilities::Alert>>,
}

impl RecordingAlerts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<crate::capabilities::Alert> {
        std::mem::take(&mut *self.alerts.lock().expect("alerts mutex"))
    }
}

impl crate::capabilities::Alerts for RecordingAlerts {
    fn emit(&self, alert: crate::capabilities::Alert) {
        self.alerts.lock().expect("alerts mutex").push(alert);
    }
}
