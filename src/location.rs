//! User position acquisition.
//!
//! Acquisition is bounded: a provider that does not answer within the
//! configured wait fails with [`HazardError::LocationTimeout`]. There is no
//! automatic retry.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::HazardError;
use crate::models::Coordinate;

/// Default ceiling on how long to wait for a position.
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the user's current position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate, HazardError>;
}

/// A position supplied up front, e.g. from `--lat`/`--lon`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLocation(pub Option<Coordinate>);

impl FixedLocation {
    /// Build from optional CLI values; both must be present.
    #[must_use]
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Self {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Self(Some(Coordinate { lat, lng })),
            _ => Self(None),
        }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinate, HazardError> {
        let coord = self
            .0
            .ok_or_else(|| HazardError::LocationDenied("no position configured".into()))?;
        validate(coord)
    }
}

/// Reject positions outside the valid lat/lng ranges.
///
/// # Errors
///
/// Returns `LocationDenied` when the coordinate is out of range.
pub fn validate(coord: Coordinate) -> Result<Coordinate, HazardError> {
    if !coord.lat.is_finite() || !(-90.0..=90.0).contains(&coord.lat) {
        return Err(HazardError::LocationDenied(format!(
            "latitude {} out of range [-90, 90]",
            coord.lat
        )));
    }
    if !coord.lng.is_finite() || !(-180.0..=180.0).contains(&coord.lng) {
        return Err(HazardError::LocationDenied(format!(
            "longitude {} out of range [-180, 180]",
            coord.lng
        )));
    }
    Ok(coord)
}

/// Ask `provider` for a position, waiting at most `wait`.
///
/// # Errors
///
/// Returns the provider's error, or `LocationTimeout` if it did not answer.
pub async fn acquire(provider: &dyn LocationProvider, wait: Duration) -> Result<Coordinate, HazardError> {
    tokio::time::timeout(wait, provider.current_position())
        .await
        .map_err(|_| HazardError::LocationTimeout(wait))?
}
