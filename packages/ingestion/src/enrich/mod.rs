//! Geocoding enrichment.
//!
//! Remote detection runs first and needs no provider. Everything else
//! goes through the geocoder capability behind a shared token bucket
//! (provider-declared rate, default 1 rps) and an LRU cache keyed by the
//! normalized location string. Failure is always non-fatal.

use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use governor::{Quota, RateLimiter};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::capabilities::{GeoPoint, Geocoder};
use crate::config::EnrichConfig;
use crate::error::GeocodeError;
use crate::types::NewJob;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Keywords that mark a posting as remote.
static REMOTE_KEYWORDS: &[&str] = &[
    "remote",
    "work from home",
    "anywhere",
    "home-based",
    "home based",
    "telecommute",
];

pub struct Enricher {
    geocoder: Option<Arc<dyn Geocoder>>,
    limiter: Arc<DirectRateLimiter>,
    cache: Mutex<LruCache<String, Option<GeoPoint>>>,
    acquire_timeout: Duration,
}

impl Enricher {
    pub fn new(geocoder: Option<Arc<dyn Geocoder>>, cfg: &EnrichConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(cfg.geocode_rps.max(1)).expect("max(1) is nonzero"),
        );
        Self {
            geocoder,
            limiter: Arc::new(RateLimiter::direct(quota)),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(cfg.cache_size.max(1)).expect("max(1) is nonzero"),
            )),
            acquire_timeout: cfg.acquire_timeout,
        }
    }

    /// Enrich one job in place. Never fails the run.
    pub async fn enrich(&self, job: &mut NewJob) {
        let Some(location) = job.location_raw.clone() else {
            return;
        };

        if is_remote(&location) {
            job.is_remote = true;
            job.geocoding_source = Some("heuristic".to_string());
            job.geocoded_at = Some(Utc::now());
            return;
        }

        // Already placed (e.g. by the AI normalizer)? Coordinates are
        // still worth a lookup, but skip when the provider is absent.
        let Some(geocoder) = &self.geocoder else {
            return;
        };

        let query = normalized_query(&location);
        match self.geocode_cached(geocoder.as_ref(), &query).await {
            Ok(Some(point)) => {
                job.latitude = Some(point.latitude);
                job.longitude = Some(point.longitude);
                if job.city.is_none() {
                    job.city = point.city;
                }
                if job.country_iso.is_none() {
                    job.country_iso = point.country_iso;
                }
                if job.country.is_none() {
                    job.country = point.country;
                }
                job.geocoding_source = Some("geocoder".to_string());
                job.geocoded_at = Some(Utc::now());
            }
            Ok(None) => {
                debug!(query = %query, "geocoder had no result");
            }
            Err(GeocodeError::RateLimited) => {
                debug!(query = %query, "geocoder rate limited, skipping");
            }
            Err(e) => {
                warn!(query = %query, error = %e, "geocoding failed");
            }
        }
    }

    async fn geocode_cached(
        &self,
        geocoder: &dyn Geocoder,
        query: &str,
    ) -> Result<Option<GeoPoint>, GeocodeError> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(hit) = cache.get(query) {
                return Ok(hit.clone());
            }
        }

        // Bounded wait on the token bucket; a stalled bucket surfaces as
        // rate_limited rather than blocking the worker.
        if tokio::time::timeout(self.acquire_timeout, self.limiter.until_ready())
            .await
            .is_err()
        {
            return Err(GeocodeError::RateLimited);
        }

        let result = match geocoder.geocode(query).await {
            Ok(point) => Some(point),
            Err(GeocodeError::NoResult(_)) => None,
            Err(e) => return Err(e),
        };

        let mut cache = self.cache.lock().await;
        cache.put(query.to_string(), result.clone());
        Ok(result)
    }
}

/// Case-fold and collapse whitespace so cache keys and provider queries
/// agree.
fn normalized_query(location: &str) -> String {
    location
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_remote(location: &str) -> bool {
    let lower = location.to_lowercase();
    REMOTE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGeocoder;
    use uuid::Uuid;

    fn job_at(location: &str) -> NewJob {
        let mut job = NewJob::minimal(Uuid::new_v4(), "Officer role", "https://x.org/j/1");
        job.location_raw = Some(location.to_string());
        job
    }

    fn cfg() -> EnrichConfig {
        EnrichConfig {
            geocode_rps: 100,
            acquire_timeout: Duration::from_millis(200),
            cache_size: 16,
        }
    }

    #[tokio::test]
    async fn remote_keywords_skip_the_provider() {
        let geocoder = Arc::new(MockGeocoder::default());
        let enricher = Enricher::new(Some(geocoder.clone()), &cfg());

        let mut job = job_at("Remote (work from home)");
        enricher.enrich(&mut job).await;

        assert!(job.is_remote);
        assert_eq!(job.geocoding_source.as_deref(), Some("heuristic"));
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn geocoder_fills_coordinates_and_caches() {
        let geocoder = Arc::new(MockGeocoder::default().with_place(
            "nairobi, kenya",
            GeoPoint {
                latitude: -1.286,
                longitude: 36.817,
                country: Some("Kenya".into()),
                country_iso: Some("KE".into()),
                city: Some("Nairobi".into()),
            },
        ));
        let enricher = Enricher::new(Some(geocoder.clone()), &cfg());

        let mut job = job_at("Nairobi,  Kenya");
        enricher.enrich(&mut job).await;
        assert_eq!(job.latitude, Some(-1.286));
        assert_eq!(job.city.as_deref(), Some("Nairobi"));
        assert_eq!(job.geocoding_source.as_deref(), Some("geocoder"));

        let mut again = job_at("Nairobi, Kenya");
        enricher.enrich(&mut again).await;
        assert_eq!(geocoder.calls(), 1); // second hit came from the cache
    }

    #[tokio::test]
    async fn missing_provider_and_no_result_are_nonfatal() {
        let enricher = Enricher::new(None, &cfg());
        let mut job = job_at("Nairobi, Kenya");
        enricher.enrich(&mut job).await;
        assert_eq!(job.latitude, None);

        let geocoder = Arc::new(MockGeocoder::default()); // knows no places
        let enricher = Enricher::new(Some(geocoder), &cfg());
        let mut job = job_at("Atlantis");
        enricher.enrich(&mut job).await;
        assert_eq!(job.latitude, None);
        assert_eq!(job.geocoding_source, None);
    }
}
