//! Data models for the GDACS event feed and the canonical engine types.
//!
//! The raw structures are deliberately loose: every field is optional so a
//! single malformed record never fails the whole snapshot. Validation
//! happens in [`crate::normalize`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::errors::HazardError;

/// Top-level GeoJSON response from the event feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollection {
    /// Expected to be "FeatureCollection" when present
    #[serde(rename = "type", default)]
    pub type_: Option<String>,

    /// Event records; a null or missing list means "no events"
    #[serde(default)]
    pub features: Option<Vec<Feature>>,
}

impl FeatureCollection {
    /// Validate the response structure.
    pub fn validate(&self) -> Result<(), HazardError> {
        match self.type_.as_deref() {
            None | Some("FeatureCollection") => Ok(()),
            Some(other) => Err(HazardError::InvalidResponse(format!(
                "expected type 'FeatureCollection', got '{other}'"
            ))),
        }
    }

    /// Take the feature list, treating null as empty.
    #[must_use]
    pub fn into_features(self) -> Vec<Feature> {
        self.features.unwrap_or_default()
    }
}

/// A single raw feed record.
///
/// A geometry or property block of the wrong shape reads as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Feature {
    #[serde(deserialize_with = "lenient")]
    pub geometry: Option<Geometry>,
    #[serde(deserialize_with = "lenient")]
    pub properties: Option<Properties>,
}

/// Raw geometry. Coordinates are `[lng, lat, ...]` and may be numbers or
/// numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Geometry {
    pub coordinates: Option<Value>,
}

/// Raw event properties as published by GDACS.
///
/// Values are kept untyped; upstream is not consistent about strings
/// versus numbers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Properties {
    /// Upstream event id (integer in practice, string tolerated)
    pub eventid: Option<Value>,
    pub name: Option<Value>,
    pub description: Option<Value>,
    pub eventtype: Option<Value>,
    pub country: Option<Value>,
    /// First-level administrative region
    pub adm1: Option<Value>,
    pub fromdate: Option<Value>,
    pub todate: Option<Value>,
    pub datemodified: Option<Value>,
    pub severity: Option<Value>,
    pub alertlevel: Option<Value>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Known event category codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DisasterType {
    Earthquake,
    Flood,
    Cyclone,
    Volcano,
    Tsunami,
    Drought,
    Wildfire,
    ExtremeHeat,
    ColdWave,
    Landslide,
    /// Unrecognised code, kept verbatim
    Other(String),
}

impl DisasterType {
    /// Map an upstream code. Unknown codes are preserved, not rejected.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "EQ" => Self::Earthquake,
            "FL" => Self::Flood,
            "TC" => Self::Cyclone,
            "VO" => Self::Volcano,
            "TS" => Self::Tsunami,
            "DR" => Self::Drought,
            "WF" => Self::Wildfire,
            "EH" => Self::ExtremeHeat,
            "CW" => Self::ColdWave,
            "LS" => Self::Landslide,
            _ => Self::Other(code.to_string()),
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Earthquake => "EQ",
            Self::Flood => "FL",
            Self::Cyclone => "TC",
            Self::Volcano => "VO",
            Self::Tsunami => "TS",
            Self::Drought => "DR",
            Self::Wildfire => "WF",
            Self::ExtremeHeat => "EH",
            Self::ColdWave => "CW",
            Self::Landslide => "LS",
            Self::Other(code) => code,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Earthquake => "Earthquake",
            Self::Flood => "Flood",
            Self::Cyclone => "Cyclone",
            Self::Volcano => "Volcano",
            Self::Tsunami => "Tsunami",
            Self::Drought => "Drought",
            Self::Wildfire => "Wildfire",
            Self::ExtremeHeat => "Extreme Heat",
            Self::ColdWave => "Cold Wave",
            Self::Landslide => "Landslide",
            Self::Other(code) => code,
        }
    }

    #[must_use]
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Earthquake => "🗻",
            Self::Flood | Self::Tsunami => "🌊",
            Self::Cyclone => "🌀",
            Self::Volcano => "🌋",
            Self::Drought => "🌵",
            Self::Wildfire => "🔥",
            Self::ExtremeHeat => "☀️",
            Self::ColdWave => "❄️",
            Self::Landslide => "🏔️",
            Self::Other(_) => "❔",
        }
    }
}

impl Serialize for DisasterType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// Canonical, validated disaster event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisasterEvent {
    /// Synthetic id, unique within one snapshot and namespace
    pub id: String,
    /// Upstream event id, untouched
    pub source_id: String,
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    #[serde(rename = "type")]
    pub event_type: DisasterType,
    pub country: String,
    pub state: Option<String>,
    pub date: Option<String>,
    pub to_date: Option<String>,
    pub modified: Option<String>,
    pub severity: String,
    pub alert_level: String,
    pub is_historical: bool,
}

impl DisasterEvent {
    /// Start time, if the timestamp parses.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.date.as_deref().and_then(parse_timestamp)
    }

    /// Human duration between start and end.
    #[must_use]
    pub fn duration_label(&self) -> String {
        duration_label(self.date.as_deref(), self.to_date.as_deref())
    }
}

/// Parse the timestamp shapes seen in the feed.
///
/// GDACS emits naive `YYYY-MM-DDTHH:MM:SS` values that are UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Describe how long an event has run.
///
/// A zero or negative span means the event is still ongoing.
#[must_use]
pub fn duration_label(start: Option<&str>, end: Option<&str>) -> String {
    let (Some(start), Some(end)) = (
        start.and_then(parse_timestamp),
        end.and_then(parse_timestamp),
    ) else {
        return "Unknown".into();
    };

    let diff = end.signed_duration_since(start);
    if diff.num_milliseconds() <= 0 {
        return "Ongoing".into();
    }

    let days = diff.num_days();
    let hours = diff.num_hours();
    if days > 0 {
        format!("{days} days")
    } else if hours > 0 {
        format!("{hours} hours")
    } else {
        format!("{} minutes", diff.num_minutes())
    }
}

/// A bare position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// Structured reverse-geocode result for the user's own position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedLocation {
    pub city: String,
    pub state: String,
    pub country: String,
    pub postcode: Option<String>,
    pub full_address: String,
    pub lat: f64,
    pub lng: f64,
}

/// Where the user is, and which administrative regions contain them.
///
/// `state` and `country` always come from the same lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserLocationContext {
    pub lat: f64,
    pub lng: f64,
    pub state: Option<String>,
    pub country: Option<String>,
    pub detailed_address: Option<DetailedLocation>,
}

/// Derived alert view. `visible` is true exactly when `matched_events` is
/// non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertState {
    pub visible: bool,
    pub matched_events: Vec<DisasterEvent>,
    pub nearest_address: String,
}

/// Minimal live event for tests in other modules.
#[cfg(test)]
pub(crate) fn test_event(id: &str, lat: f64, lng: f64) -> DisasterEvent {
    DisasterEvent {
        id: id.into(),
        source_id: id.into(),
        lat,
        lng,
        name: id.into(),
        event_type: DisasterType::Earthquake,
        country: "India".into(),
        state: None,
        date: None,
        to_date: None,
        modified: None,
        severity: "Unknown".into(),
        alert_level: "Unknown".into(),
        is_historical: false,
    }
}
