//! Capability adapters: bridge the provider clients onto the pipeline's
//! capability traits.

use async_trait::async_trait;

use ai_client::{AiClient, AiClientError, Message};
use geocoder_client::{GeocoderClient, GeocoderError};
use ingestion::{AiError, Completer, GeoPoint, GeocodeError, Geocoder};

/// `Completer` over the chat-completion client.
pub struct AiCompleter {
    client: AiClient,
}

impl AiCompleter {
    pub fn new(client: AiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Completer for AiCompleter {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        self.client
            .chat_json(&[Message::system(system), Message::user(user)])
            .await
            .map_err(|e| match e {
                AiClientError::Parse(msg) => AiError::InvalidJsonResponse(msg),
                other => AiError::Provider(other.to_string()),
            })
    }
}

/// `Geocoder` over the Nominatim client.
pub struct NominatimGeocoder {
    client: GeocoderClient,
}

impl NominatimGeocoder {
    pub fn new(client: GeocoderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<GeoPoint, GeocodeError> {
        let place = self
            .client
            .search(query)
            .await
            .map_err(|e| match e {
                GeocoderError::Provider(429) => GeocodeError::RateLimited,
                other => GeocodeError::Provider(other.to_string()),
            })?
            .ok_or_else(|| GeocodeError::NoResult(query.to_string()))?;

        Ok(GeoPoint {
            latitude: place.latitude,
            longitude: place.longitude,
            country: place.country,
            country_iso: place.country_iso,
            city: place.city,
        })
    }
}
