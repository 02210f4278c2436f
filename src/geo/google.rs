//! Google Maps Geocoding API client.
//!
//! A thin [`Geocoder`] implementation over the JSON geocoding endpoint.
//! The interesting part is the status handling: the API reports most
//! problems in the response body, not the HTTP status. `ZERO_RESULTS` is a
//! normal answer (an empty candidate list), while anything other than `OK`
//! (`OVER_QUERY_LIMIT`, `REQUEST_DENIED`, ...) is a [`GeoError::BadStatus`].
//!
//! The endpoint URL is overridable so tests can point the client at a
//! local server instead of the live API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::GeoError;
use crate::geo::{AddressComponent, Candidate, Geocoder};

const DEFAULT_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Geocoder backed by the Google Maps Geocoding API.
pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GoogleGeocoder {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Redirect requests to a different endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeoError> {
        debug!("Geocoding \"{}\"", query);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("address", query), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| GeoError::RequestFailed {
                query: query.to_string(),
                detail: e.to_string(),
            })?;

        let body: GeocodeResponse =
            response.json().await.map_err(|e| GeoError::RequestFailed {
                query: query.to_string(),
                detail: format!("decoding response body: {e}"),
            })?;

        interpret(query, body)
    }
}

/// Turn a decoded response body into candidates, per the API's status
/// contract.
fn interpret(query: &str, body: GeocodeResponse) -> Result<Vec<Candidate>, GeoError> {
    match body.status.as_str() {
        "OK" => Ok(body.results.into_iter().map(Candidate::from).collect()),
        // A clean "nothing found", not an error
        "ZERO_RESULTS" => Ok(Vec::new()),
        other => Err(GeoError::BadStatus {
            query: query.to_string(),
            status: other.to_string(),
        }),
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<WireResult>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    formatted_address: String,
    geometry: WireGeometry,
    #[serde(default)]
    address_components: Vec<WireComponent>,
}

#[derive(Debug, Deserialize)]
struct WireGeometry {
    location: WireLocation,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct WireComponent {
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

impl From<WireResult> for Candidate {
    fn from(wire: WireResult) -> Self {
        Candidate {
            lat: wire.geometry.location.lat,
            lng: wire.geometry.location.lng,
            formatted_address: wire.formatted_address,
            components: wire
                .address_components
                .into_iter()
                .map(|c| AddressComponent {
                    types: c.types,
                    short_name: c.short_name,
                })
                .collect(),
        }
    }
}
