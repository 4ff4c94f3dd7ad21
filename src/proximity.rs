//! Proximity evaluation.
//!
//! Decides which events are "nearby" a user under one of three policies:
//! great-circle radius, same state, or same country.

use std::f64::consts::PI;

use serde::Serialize;

use crate::errors::HazardError;
use crate::models::{DisasterEvent, UserLocationContext};

/// Mean Earth radius in kilometers for haversine calculations.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Radius used when `nearby` is chosen without one.
pub const DEFAULT_RADIUS_KM: f64 = 500.0;

/// Active proximity policy. Exactly one is in force at a time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ProximityPolicy {
    /// Within `radius_km` of the user
    Nearby { radius_km: f64 },
    /// Same first-level administrative region
    State,
    /// Same country
    Country,
}

impl Default for ProximityPolicy {
    fn default() -> Self {
        Self::Nearby {
            radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

impl ProximityPolicy {
    /// Build a radius policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the radius is not a positive finite number.
    pub fn nearby(radius_km: f64) -> Result<Self, HazardError> {
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(HazardError::InvalidPolicy(format!(
                "radius must be positive, got {radius_km}"
            )));
        }
        Ok(Self::Nearby { radius_km })
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nearby { .. } => "nearby",
            Self::State => "state",
            Self::Country => "country",
        }
    }

    /// Radius in km, when this is a radius policy.
    #[must_use]
    pub const fn radius_km(self) -> Option<f64> {
        match self {
            Self::Nearby { radius_km } => Some(radius_km),
            Self::State | Self::Country => None,
        }
    }

    /// Build a policy from a mode name and optional radius.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown mode or an invalid radius.
    pub fn from_mode(mode: &str, radius_km: Option<f64>) -> Result<Self, HazardError> {
        match mode.trim().to_lowercase().as_str() {
            "nearby" => Self::nearby(radius_km.unwrap_or(DEFAULT_RADIUS_KM)),
            "state" => Ok(Self::State),
            "country" | "nationwide" => Ok(Self::Country),
            other => Err(HazardError::InvalidPolicy(format!(
                "unknown mode '{other}' (expected: nearby, state, country)"
            ))),
        }
    }
}

impl std::str::FromStr for ProximityPolicy {
    type Err = String;

    /// Accepts `nearby`, `nearby:<km>`, `state`, `country`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mode, radius) = match s.split_once(':') {
            Some((mode, km)) => {
                let km = km
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| format!("invalid radius in policy: {e}"))?;
                (mode, Some(km))
            }
            None => (s, None),
        };
        Self::from_mode(mode, radius).map_err(|e| e.to_string())
    }
}

/// Calculate the great-circle distance between two points using the haversine formula.
///
/// Returns distance in kilometers.
#[must_use]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1 * PI / 180.0;
    let lat2_rad = lat2 * PI / 180.0;
    let delta_lat = (lat2 - lat1) * PI / 180.0;
    let delta_lon = (lon2 - lon1) * PI / 180.0;

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distance from the user to an event in km.
#[must_use]
pub fn distance_km(user: &UserLocationContext, event: &DisasterEvent) -> f64 {
    haversine_distance(user.lat, user.lng, event.lat, event.lng)
}

/// Filter `events` down to those near the user under `policy`.
///
/// Order-preserving. With no user context the result is empty. Region
/// policies only match when both sides have a value; an event without a
/// state never matches `State`.
#[must_use]
pub fn evaluate(
    events: &[DisasterEvent],
    policy: ProximityPolicy,
    user: Option<&UserLocationContext>,
) -> Vec<DisasterEvent> {
    let Some(user) = user else {
        return Vec::new();
    };

    events
        .iter()
        .filter(|event| matches(event, policy, user))
        .cloned()
        .collect()
}

fn matches(event: &DisasterEvent, policy: ProximityPolicy, user: &UserLocationContext) -> bool {
    match policy {
        ProximityPolicy::Nearby { radius_km } => distance_km(user, event) <= radius_km,
        ProximityPolicy::State => same_region(event.state.as_deref(), user.state.as_deref()),
        ProximityPolicy::Country => same_region(Some(&event.country), user.country.as_deref()),
    }
}

fn same_region(event: Option<&str>, user: Option<&str>) -> bool {
    match (event, user) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => a.to_lowercase() == b.to_lowercase(),
        _ => false,
    }
}
