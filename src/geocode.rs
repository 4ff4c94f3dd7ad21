//! Reverse geocoding.
//!
//! [`Geocoder`] is the transport seam; [`NominatimClient`] talks to an
//! OpenStreetMap Nominatim instance. The free functions on top fail closed:
//! any lookup error becomes an "unknown" value plus a [`Notice`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::client::USER_AGENT;
use crate::errors::{HazardError, Notice};
use crate::models::DetailedLocation;

/// Public Nominatim reverse endpoint.
pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Raw reverse-geocode response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReverseResponse {
    pub address: Option<Address>,
    pub display_name: Option<String>,
}

/// Address block of a reverse-geocode response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Address {
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postcode: Option<String>,
}

/// Structured resolution of a coordinate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedPlace {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postcode: Option<String>,
    pub display_address: Option<String>,
}

impl ResolvedPlace {
    /// Expand into the display record for a user position.
    #[must_use]
    pub fn detailed(&self, lat: f64, lng: f64) -> DetailedLocation {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "Unknown".into());
        DetailedLocation {
            city: or_unknown(&self.city),
            state: or_unknown(&self.state),
            country: or_unknown(&self.country),
            postcode: self.postcode.clone(),
            full_address: or_unknown(&self.display_address),
            lat,
            lng,
        }
    }
}

impl From<ReverseResponse> for ResolvedPlace {
    fn from(resp: ReverseResponse) -> Self {
        let addr = resp.address.unwrap_or_default();
        Self {
            city: first_present([addr.city, addr.town, addr.village]),
            state: first_present([addr.state]),
            country: first_present([addr.country]),
            postcode: first_present([addr.postcode]),
            display_address: first_present([resp.display_name]),
        }
    }
}

fn first_present<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates.into_iter().flatten().find(|s| !s.trim().is_empty())
}

/// Anything that can turn a coordinate into a place.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Full structured lookup.
    async fn reverse(&self, lat: f64, lng: f64) -> Result<ResolvedPlace, HazardError>;

    /// Display-string-only lookup. Defaults to the structured call.
    async fn display_name(&self, lat: f64, lng: f64) -> Result<String, HazardError> {
        Ok(self
            .reverse(lat, lng)
            .await?
            .display_address
            .unwrap_or_default())
    }
}

/// Client for a Nominatim reverse-geocoding service.
pub struct NominatimClient {
    client: Client,
    base_url: String,
}

impl NominatimClient {
    /// Create a new client against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(base_url: impl Into<String>) -> Result<Self, HazardError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn lookup(&self, lat: f64, lng: f64, details: bool) -> Result<ReverseResponse, HazardError> {
        let mut query = vec![
            ("lat", lat.to_string()),
            ("lon", lng.to_string()),
            ("format", "json".to_string()),
        ];
        if details {
            query.push(("addressdetails", "1".to_string()));
        }

        let response = self.client.get(&self.base_url).query(&query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HazardError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    #[instrument(skip(self))]
    async fn reverse(&self, lat: f64, lng: f64) -> Result<ResolvedPlace, HazardError> {
        let place = ResolvedPlace::from(self.lookup(lat, lng, true).await?);
        debug!(state = ?place.state, country = ?place.country, "reverse geocoded");
        Ok(place)
    }

    #[instrument(skip(self))]
    async fn display_name(&self, lat: f64, lng: f64) -> Result<String, HazardError> {
        Ok(self
            .lookup(lat, lng, false)
            .await?
            .display_name
            .unwrap_or_default())
    }
}

/// Structured resolution that never fails.
///
/// Returns `None` for the place on failure, together with the notice.
pub async fn resolve_place(
    geocoder: &dyn Geocoder,
    lat: f64,
    lng: f64,
) -> (Option<ResolvedPlace>, Option<Notice>) {
    match geocoder.reverse(lat, lng).await {
        Ok(place) => (Some(place), None),
        Err(e) => {
            warn!("reverse geocode failed: {}", e);
            (
                None,
                Some(Notice::GeocodeUnavailable {
                    message: e.to_string(),
                }),
            )
        }
    }
}

/// Display-address lookup that never fails; empty string when unknown.
pub async fn resolve_display(geocoder: &dyn Geocoder, lat: f64, lng: f64) -> (String, Option<Notice>) {
    match geocoder.display_name(lat, lng).await {
        Ok(name) => (name, None),
        Err(e) => {
            warn!("address lookup failed: {}", e);
            (
                String::new(),
                Some(Notice::GeocodeUnavailable {
                    message: e.to_string(),
                }),
            )
        }
    }
}
