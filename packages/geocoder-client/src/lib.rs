//! Nominatim-style forward geocoding client.
//!
//! A thin reqwest client for the OpenStreetMap Nominatim search API (or
//! any compatible self-hosted instance). Rate limiting is the caller's
//! responsibility; the free public instance allows about one request
//! per second, which the pipeline enforces with its own token bucket.
//!
//! # Example
//!
//! ```rust,ignore
//! use geocoder_client::GeocoderClient;
//!
//! let client = GeocoderClient::new("jobs-pipeline/1.0 ops@example.org");
//! if let Some(place) = client.search("Nairobi, Kenya").await? {
//!     println!("{}, {}", place.latitude, place.longitude);
//! }
//! ```

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Result type for geocoder operations.
pub type Result<T> = std::result::Result<T, GeocoderError>;

#[derive(Debug, Error)]
pub enum GeocoderError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Provider returned a non-2xx status
    #[error("Provider error (HTTP {0})")]
    Provider(u16),

    /// Response body was not the expected JSON
    #[error("Parse error: {0}")]
    Parse(String),
}

/// One resolved place.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
    pub city: Option<String>,
    pub country: Option<String>,
    /// ISO-3166 alpha-2, uppercased
    pub country_iso: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

/// Forward geocoding client.
#[derive(Clone)]
pub struct GeocoderClient {
    http_client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl GeocoderClient {
    /// Nominatim's usage policy requires an identifying user agent with
    /// contact information.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: user_agent.into(),
        }
    }

    /// Point at a self-hosted instance.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Search for a location string. Returns the best hit, or `None`
    /// when the provider knows nothing.
    pub async fn search(&self, query: &str) -> Result<Option<Place>> {
        let response = self
            .http_client
            .get(format!("{}/search", self.base_url))
            .header("User-Agent", &self.user_agent)
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| GeocoderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocoderError::Provider(status.as_u16()));
        }

        let hits: Vec<NominatimHit> = response
            .json()
            .await
            .map_err(|e| GeocoderError::Parse(e.to_string()))?;

        let Some(hit) = hits.into_iter().next() else {
            debug!(query, "no geocoding result");
            return Ok(None);
        };

        let place = place_from_hit(hit)?;
        debug!(query, lat = place.latitude, lon = place.longitude, "geocoded");
        Ok(Some(place))
    }
}

fn place_from_hit(hit: NominatimHit) -> Result<Place> {
    let latitude = hit
        .lat
        .parse::<f64>()
        .map_err(|e| GeocoderError::Parse(format!("bad latitude: {}", e)))?;
    let longitude = hit
        .lon
        .parse::<f64>()
        .map_err(|e| GeocoderError::Parse(format!("bad longitude: {}", e)))?;

    let city = hit
        .address
        .city
        .or(hit.address.town)
        .or(hit.address.village);

    Ok(Place {
        latitude,
        longitude,
        display_name: hit.display_name,
        city,
        country: hit.address.country,
        country_iso: hit.address.country_code.map(|c| c.to_uppercase()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_parsing_prefers_city_over_town() {
        let hit = NominatimHit {
            lat: "-1.2863".to_string(),
            lon: "36.8172".to_string(),
            display_name: "Nairobi, Kenya".to_string(),
            address: NominatimAddress {
                city: Some("Nairobi".to_string()),
                town: Some("ignored".to_string()),
                village: None,
                country: Some("Kenya".to_string()),
                country_code: Some("ke".to_string()),
            },
        };

        let place = place_from_hit(hit).unwrap();
        assert_eq!(place.city.as_deref(), Some("Nairobi"));
        assert_eq!(place.country_iso.as_deref(), Some("KE"));
        assert!((place.latitude + 1.2863).abs() < 1e-9);
    }

    #[test]
    fn bad_coordinates_are_parse_errors() {
        let hit = NominatimHit {
            lat: "not-a-number".to_string(),
            lon: "36.8".to_string(),
            display_name: "x".to_string(),
            address: NominatimAddress::default(),
        };
        assert!(matches!(place_from_hit(hit), Err(GeocoderError::Parse(_))));
    }
}
