//! Raw feed records to canonical [`DisasterEvent`]s.
//!
//! Pure functions: no I/O, never fails. Records without a usable
//! `[lng, lat]` pair are dropped and counted.

use serde_json::Value;

use crate::models::{DisasterEvent, DisasterType, Feature, Properties};

/// Id prefix applied to every historical record.
pub const HISTORICAL_PREFIX: &str = "hist-";

/// How a snapshot should be tagged.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub historical: bool,
    pub id_prefix: Option<String>,
}

impl NormalizeOptions {
    /// Options for the live feed.
    #[must_use]
    pub fn live() -> Self {
        Self::default()
    }

    /// Options for a historical-window feed.
    #[must_use]
    pub fn historical() -> Self {
        Self {
            historical: true,
            id_prefix: Some(HISTORICAL_PREFIX.to_string()),
        }
    }
}

/// Result of normalizing one snapshot.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub events: Vec<DisasterEvent>,
    /// Records rejected for missing or non-finite coordinates
    pub dropped: usize,
}

/// Normalize a snapshot of raw features.
///
/// The sequential index in each id is the record's position in the raw
/// list, so ids stay unique even when the upstream id repeats.
#[must_use]
pub fn normalize(features: &[Feature], opts: &NormalizeOptions) -> Normalized {
    let mut out = Normalized::default();
    let empty = Properties::default();
    let prefix = opts.id_prefix.as_deref().unwrap_or("");

    for (index, feature) in features.iter().enumerate() {
        let Some((lng, lat)) = coordinates(feature) else {
            out.dropped += 1;
            continue;
        };

        let props = feature.properties.as_ref().unwrap_or(&empty);
        let source_id = props.eventid.as_ref().map(value_text).unwrap_or_default();
        let modified = text(props.datemodified.as_ref());

        out.events.push(DisasterEvent {
            id: format!("{prefix}{source_id}-{index}"),
            source_id,
            lat,
            lng,
            name: text(props.name.as_ref())
                .or_else(|| text(props.description.as_ref()))
                .unwrap_or_else(|| "Unknown".into()),
            event_type: DisasterType::from_code(&text(props.eventtype.as_ref()).unwrap_or_default()),
            country: text(props.country.as_ref()).unwrap_or_else(|| "Unknown".into()),
            state: text(props.adm1.as_ref()),
            date: text(props.fromdate.as_ref()).or_else(|| modified.clone()),
            to_date: text(props.todate.as_ref()).or_else(|| modified.clone()),
            modified,
            severity: text(props.severity.as_ref()).unwrap_or_else(|| "Unknown".into()),
            alert_level: text(props.alertlevel.as_ref()).unwrap_or_else(|| "Unknown".into()),
            is_historical: opts.historical,
        });
    }

    out
}

/// Extract `(lng, lat)` from the source's `[lng, lat, ...]` order.
fn coordinates(feature: &Feature) -> Option<(f64, f64)> {
    let coords = feature.geometry.as_ref()?.coordinates.as_ref()?.as_array()?;
    if coords.len() < 2 {
        return None;
    }
    let lng = number(&coords[0])?;
    let lat = number(&coords[1])?;
    Some((lng, lat))
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Trimmed text of a property, `None` when missing or blank.
fn text(value: Option<&Value>) -> Option<String> {
    let s = value_text(value?);
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureCollection;

    fn features(json: &str) -> Vec<Feature> {
        serde_json::from_str::<FeatureCollection>(json)
            .expect("failed to parse fixture")
            .into_features()
    }

    const FIXTURE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"geometry": {"coordinates": [80.2707, 13.0827]},
             "properties": {"eventid": 1001, "eventtype": "FL", "name": "Flood in Chennai",
                            "country": "India", "adm1": "Tamil Nadu",
                            "fromdate": "2024-05-01T00:00:00", "todate": "2024-05-04T00:00:00",
                            "severity": "Magnitude 5", "alertlevel": "Orange"}},
            {"geometry": {"coordinates": [1]},
             "properties": {"eventid": 1002}},
            {"geometry": {"coordinates": ["77.5946", "12.9716"]},
             "properties": {"eventid": "1003", "eventtype": "ZZ", "description": "Something odd",
                            "datemodified": "2024-06-01T12:00:00"}},
            {"properties": {"eventid": 1004}},
            {"geometry": {"coordinates": [null, 10.0]}, "properties": {"eventid": 1005}}
        ]
    }"#;

    #[test]
    fn test_reads_lng_lat_order() {
        let out = normalize(&features(FIXTURE), &NormalizeOptions::live());
        let first = &out.events[0];
        assert!((first.lat - 13.0827).abs() < 1e-9);
        assert!((first.lng - 80.2707).abs() < 1e-9);
    }

    #[test]
    fn test_drops_malformed_without_panicking() {
        let out = normalize(&features(FIXTURE), &NormalizeOptions::live());
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.dropped, 3);
    }

    #[test]
    fn test_single_component_coordinates_dropped() {
        let raw = features(
            r#"{"features": [
                {"geometry": {"coordinates": [10.0, 20.0]}, "properties": {"eventid": 1}},
                {"geometry": {"coordinates": [1]}, "properties": {"eventid": 2}}
            ]}"#,
        );
        let out = normalize(&raw, &NormalizeOptions::live());
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].source_id, "1");
    }

    #[test]
    fn test_ids_use_raw_index() {
        let out = normalize(&features(FIXTURE), &NormalizeOptions::live());
        assert_eq!(out.events[0].id, "1001-0");
        assert_eq!(out.events[1].id, "1003-2");
    }

    #[test]
    fn test_repeated_upstream_ids_stay_unique() {
        let raw = features(
            r#"{"features": [
                {"geometry": {"coordinates": [0, 0]}, "properties": {"eventid": 7}},
                {"geometry": {"coordinates": [1, 1]}, "properties": {"eventid": 7}}
            ]}"#,
        );
        let out = normalize(&raw, &NormalizeOptions::live());
        assert_ne!(out.events[0].id, out.events[1].id);
    }

    #[test]
    fn test_fallback_chain() {
        let out = normalize(&features(FIXTURE), &NormalizeOptions::live());
        let odd = &out.events[1];
        assert_eq!(odd.name, "Something odd");
        assert_eq!(odd.event_type, DisasterType::Other("ZZ".into()));
        assert_eq!(odd.country, "Unknown");
        assert_eq!(odd.state, None);
        assert_eq!(odd.severity, "Unknown");
        assert_eq!(odd.alert_level, "Unknown");
        assert_eq!(odd.date.as_deref(), Some("2024-06-01T12:00:00"));
        assert_eq!(odd.date, odd.to_date);
        assert_eq!(odd.duration_label(), "Ongoing");
    }

    #[test]
    fn test_odd_property_types_keep_siblings() {
        let raw = features(
            r#"{"features": [
                {"geometry": {"coordinates": [80.27, 13.08]},
                 "properties": {"eventid": 1, "eventtype": "FL", "alertlevel": "Green"}},
                {"geometry": {"coordinates": [77.59, 12.97]},
                 "properties": {"eventid": 2, "eventtype": "EQ", "alertlevel": 2,
                                "name": 42, "country": ["India"], "fromdate": null}},
                {"geometry": "point", "properties": "n/a"},
                {"geometry": {"coordinates": "77.59,12.97"}, "properties": {"eventid": 4}}
            ]}"#,
        );
        assert_eq!(raw.len(), 4);

        let out = normalize(&raw, &NormalizeOptions::live());
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.dropped, 2);
        assert_eq!(out.events[0].alert_level, "Green");
        let odd = &out.events[1];
        assert_eq!(odd.source_id, "2");
        assert_eq!(odd.alert_level, "2");
        assert_eq!(odd.name, "42");
        assert_eq!(odd.event_type, DisasterType::Earthquake);
        assert_eq!(odd.date, None);
    }

    #[test]
    fn test_name_defaults_to_unknown() {
        let raw = features(r#"{"features": [{"geometry": {"coordinates": [5, 5]}}]}"#);
        let out = normalize(&raw, &NormalizeOptions::live());
        assert_eq!(out.events[0].name, "Unknown");
        assert_eq!(out.events[0].id, "-0");
    }

    #[test]
    fn test_historical_tagging() {
        let out = normalize(&features(FIXTURE), &NormalizeOptions::historical());
        assert!(out.events.iter().all(|e| e.is_historical));
        assert_eq!(out.events[0].id, "hist-1001-0");

        let live = normalize(&features(FIXTURE), &NormalizeOptions::live());
        assert!(live.events.iter().all(|e| !e.is_historical));
        assert_ne!(live.events[0].id, out.events[0].id);
    }
}
