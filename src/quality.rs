// src/quality.rs
//
// Six-component weighted data-quality scoring. Pure and side-effect free:
// scoring a field map never fails, missing data only degrades components.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{DataQualityScore, QualityBucket, QualityComponents};

pub const REQUIRED_FIELDS: [&str; 8] = [
    "address",
    "city",
    "state",
    "zip_code",
    "latitude",
    "longitude",
    "lot_sqft",
    "property_type",
];

pub const OPTIONAL_FIELDS: [&str; 8] = [
    "bedrooms",
    "bathrooms",
    "sqft",
    "year_built",
    "assessed_value",
    "estimated_value",
    "zoning",
    "owner_name",
];

const WEIGHT_COMPLETENESS: f64 = 0.25;
const WEIGHT_ACCURACY: f64 = 0.25;
const WEIGHT_CONSISTENCY: f64 = 0.20;
const WEIGHT_TIMELINESS: f64 = 0.15;
const WEIGHT_VALIDITY: f64 = 0.10;
const WEIGHT_UNIQUENESS: f64 = 0.05;

/// Compute the quality score for a flattened property field map.
///
/// `score` is always the fixed linear combination of the six components:
/// 0.25 completeness + 0.25 accuracy + 0.20 consistency + 0.15 timeliness
/// + 0.10 validity + 0.05 uniqueness. All values are rounded to 3 decimals
/// for output stability. `sources` is left empty here; the pipeline fills it
/// from the canonical property's provenance.
pub fn calculate_quality_score(
    fields: &Map<String, Value>,
    source_timestamp: Option<DateTime<Utc>>,
    duplicate_checked: bool,
) -> DataQualityScore {
    let completeness = score_completeness(fields);
    let accuracy = score_accuracy(fields);
    let consistency = score_consistency(fields);
    let (timeliness, freshness_hours) = score_timeliness(source_timestamp);
    let validity = score_validity();
    let uniqueness = if duplicate_checked { 0.95 } else { 1.0 };

    let score = completeness * WEIGHT_COMPLETENESS
        + accuracy * WEIGHT_ACCURACY
        + consistency * WEIGHT_CONSISTENCY
        + timeliness * WEIGHT_TIMELINESS
        + validity * WEIGHT_VALIDITY
        + uniqueness * WEIGHT_UNIQUENESS;

    let confidence = if score >= 0.85 {
        QualityBucket::High
    } else if score >= 0.70 {
        QualityBucket::Medium
    } else {
        QualityBucket::Low
    };

    DataQualityScore {
        score: round3(score),
        components: QualityComponents {
            completeness: round3(completeness),
            accuracy: round3(accuracy),
            consistency: round3(consistency),
            timeliness: round3(timeliness),
            validity: round3(validity),
            uniqueness: round3(uniqueness),
        },
        freshness_hours,
        sources: Vec::new(),
        confidence,
    }
}

/// Map common provider key variants in a raw payload onto the standard field
/// names the scorer expects.
pub fn extract_property_fields(raw_data: &Map<String, Value>) -> Map<String, Value> {
    let pick = |keys: &[&str]| -> Value {
        for key in keys {
            if let Some(v) = raw_data.get(*key) {
                if !v.is_null() {
                    return v.clone();
                }
            }
        }
        Value::Null
    };

    let mut fields = Map::new();
    fields.insert("address".to_string(), pick(&["address"]));
    fields.insert("city".to_string(), pick(&["city"]));
    fields.insert("state".to_string(), pick(&["state"]));
    fields.insert("zip_code".to_string(), pick(&["zip", "zip_code"]));
    fields.insert("latitude".to_string(), pick(&["lat", "latitude"]));
    fields.insert("longitude".to_string(), pick(&["lng", "longitude"]));
    fields.insert("lot_sqft".to_string(), pick(&["lot_sqft"]));
    fields.insert("property_type".to_string(), pick(&["property_type"]));
    fields.insert("bedrooms".to_string(), pick(&["bedrooms"]));
    fields.insert("bathrooms".to_string(), pick(&["bathrooms"]));
    fields.insert("sqft".to_string(), pick(&["sqft"]));
    fields.insert("year_built".to_string(), pick(&["year_built"]));
    fields.insert("assessed_value".to_string(), pick(&["assessed_value"]));
    fields.insert("estimated_value".to_string(), pick(&["estimated_value"]));
    fields.insert("zoning".to_string(), pick(&["zoning"]));
    fields.insert("owner_name".to_string(), pick(&["owner_name"]));
    fields
}

fn present(fields: &Map<String, Value>, key: &str) -> bool {
    fields.get(key).map_or(false, |v| !v.is_null())
}

fn score_completeness(fields: &Map<String, Value>) -> f64 {
    let required_present = REQUIRED_FIELDS.iter().filter(|f| present(fields, f)).count();
    let optional_present = OPTIONAL_FIELDS.iter().filter(|f| present(fields, f)).count();

    (required_present as f64 / REQUIRED_FIELDS.len() as f64) * 0.7
        + (optional_present as f64 / OPTIONAL_FIELDS.len() as f64) * 0.3
}

fn score_accuracy(fields: &Map<String, Value>) -> f64 {
    let mut checks: Vec<f64> = Vec::new();

    if let Some(zip) = fields.get("zip_code").and_then(Value::as_str) {
        if !zip.is_empty() {
            let ok = zip.len() == 5 && zip.chars().all(|c| c.is_ascii_digit());
            checks.push(if ok { 1.0 } else { 0.5 });
        }
    }

    if let Some(state) = fields.get("state").and_then(Value::as_str) {
        if !state.is_empty() {
            let ok = state.len() == 2 && state.chars().all(|c| c.is_ascii_alphabetic());
            checks.push(if ok { 1.0 } else { 0.5 });
        }
    }

    if let Some(year) = fields.get("year_built").and_then(Value::as_i64) {
        checks.push(if (1800..=2030).contains(&year) { 1.0 } else { 0.5 });
    }

    let lat = fields.get("latitude").and_then(Value::as_f64);
    let lng = fields.get("longitude").and_then(Value::as_f64);
    if let (Some(lat), Some(lng)) = (lat, lng) {
        let valid = (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng);
        checks.push(if valid { 1.0 } else { 0.0 });
    }

    if checks.is_empty() {
        0.8
    } else {
        checks.iter().sum::<f64>() / checks.len() as f64
    }
}

fn score_consistency(fields: &Map<String, Value>) -> f64 {
    let mut checks: Vec<f64> = Vec::new();

    let lot_sqft = fields.get("lot_sqft").and_then(Value::as_f64);
    let building_sqft = fields.get("sqft").and_then(Value::as_f64);

    if let (Some(lot), Some(building)) = (lot_sqft, building_sqft) {
        if lot > 0.0 && building > 0.0 {
            checks.push(if lot >= building { 1.0 } else { 0.5 });
        }
    }

    let assessed = fields.get("assessed_value").and_then(Value::as_f64);
    if let (Some(assessed), Some(building)) = (assessed, building_sqft) {
        if assessed > 0.0 && building > 0.0 {
            let ppsf = assessed / building;
            checks.push(if (50.0..=2000.0).contains(&ppsf) { 1.0 } else { 0.7 });
        }
    }

    if checks.is_empty() {
        0.85
    } else {
        checks.iter().sum::<f64>() / checks.len() as f64
    }
}

fn score_timeliness(source_timestamp: Option<DateTime<Utc>>) -> (f64, i64) {
    let Some(ts) = source_timestamp else {
        return (0.7, 0);
    };

    let freshness_hours = (Utc::now() - ts).num_hours().max(0);

    let score = if freshness_hours < 24 {
        1.0
    } else if freshness_hours < 168 {
        0.9
    } else if freshness_hours < 720 {
        0.8
    } else if freshness_hours < 2160 {
        0.7
    } else {
        0.5
    };

    (score, freshness_hours)
}

/// Schema-compliance placeholder: a record that reached scoring already
/// passed adapter-level parsing.
fn score_validity() -> f64 {
    0.95
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn full_fields() -> Map<String, Value> {
        map(&[
            ("address", json!("100 Congress Ave")),
            ("city", json!("Austin")),
            ("state", json!("TX")),
            ("zip_code", json!("78701")),
            ("latitude", json!(30.2672)),
            ("longitude", json!(-97.7431)),
            ("lot_sqft", json!(8000)),
            ("property_type", json!("residential")),
            ("bedrooms", json!(3)),
            ("bathrooms", json!(2)),
            ("sqft", json!(1800)),
            ("year_built", json!(1995)),
            ("assessed_value", json!(450000)),
            ("estimated_value", json!(480000)),
            ("zoning", json!("SF-3")),
            ("owner_name", json!("Jordan Doe")),
        ])
    }

    #[test]
    fn test_score_is_exact_weighted_sum_of_components() {
        let samples = [
            Map::new(),
            map(&[("zip_code", json!("787"))]),
            map(&[("state", json!("Texas")), ("year_built", json!(1700))]),
            full_fields(),
        ];
        for fields in &samples {
            let q = calculate_quality_score(fields, None, false);
            let c = &q.components;
            let expected = c.completeness * 0.25
                + c.accuracy * 0.25
                + c.consistency * 0.20
                + c.timeliness * 0.15
                + c.validity * 0.10
                + c.uniqueness * 0.05;
            assert!((q.score - (expected * 1000.0).round() / 1000.0).abs() < 2e-3);
            assert!((0.0..=1.0).contains(&q.score));
        }
    }

    #[test]
    fn test_complete_fresh_record_scores_high() {
        let ts = Utc::now() - Duration::hours(2);
        let q = calculate_quality_score(&full_fields(), Some(ts), false);
        assert_eq!(q.components.completeness, 1.0);
        assert_eq!(q.components.accuracy, 1.0);
        assert_eq!(q.components.consistency, 1.0);
        assert_eq!(q.components.timeliness, 1.0);
        assert_eq!(q.components.uniqueness, 1.0);
        assert!(q.freshness_hours < 24);
        assert_eq!(q.confidence, QualityBucket::High);
    }

    #[test]
    fn test_empty_map_uses_component_defaults() {
        let q = calculate_quality_score(&Map::new(), None, false);
        assert_eq!(q.components.completeness, 0.0);
        assert_eq!(q.components.accuracy, 0.8);
        assert_eq!(q.components.consistency, 0.85);
        assert_eq!(q.components.timeliness, 0.7);
        assert_eq!(q.components.validity, 0.95);
        assert_eq!(q.freshness_hours, 0);
        assert_eq!(q.confidence, QualityBucket::Low);
    }

    #[test]
    fn test_invalid_coordinates_zero_the_check() {
        let fields = map(&[("latitude", json!(123.0)), ("longitude", json!(-200.0))]);
        let q = calculate_quality_score(&fields, None, false);
        assert_eq!(q.components.accuracy, 0.0);
    }

    #[test]
    fn test_bad_zip_and_state_half_credit() {
        let fields = map(&[("zip_code", json!("787")), ("state", json!("Texas"))]);
        let q = calculate_quality_score(&fields, None, false);
        assert_eq!(q.components.accuracy, 0.5);
    }

    #[test]
    fn test_consistency_penalizes_building_larger_than_lot() {
        let fields = map(&[("lot_sqft", json!(1000)), ("sqft", json!(2500))]);
        let q = calculate_quality_score(&fields, None, false);
        assert_eq!(q.components.consistency, 0.5);
    }

    #[test]
    fn test_timeliness_step_function() {
        let cases = [
            (12, 1.0),
            (100, 0.9),
            (500, 0.8),
            (1000, 0.7),
            (5000, 0.5),
        ];
        for (hours, expected) in cases {
            let ts = Utc::now() - Duration::hours(hours);
            let q = calculate_quality_score(&Map::new(), Some(ts), false);
            assert_eq!(q.components.timeliness, expected, "at {} hours", hours);
            assert!(q.freshness_hours >= hours - 1 && q.freshness_hours <= hours + 1);
        }
    }

    #[test]
    fn test_duplicate_check_flag_lowers_uniqueness() {
        let q = calculate_quality_score(&Map::new(), None, true);
        assert_eq!(q.components.uniqueness, 0.95);
    }

    #[test]
    fn test_serialized_shape_matches_wire_contract() {
        let mut q = calculate_quality_score(&full_fields(), None, false);
        q.sources = vec!["regrid".to_string()];
        let v = serde_json::to_value(&q).expect("serializes");
        assert!(v.get("score").is_some());
        let components = v.get("components").expect("components object");
        for key in [
            "completeness",
            "accuracy",
            "consistency",
            "timeliness",
            "validity",
            "uniqueness",
        ] {
            assert!(components.get(key).is_some(), "missing component {}", key);
        }
        assert_eq!(v.get("freshness_hours"), Some(&json!(0)));
        assert_eq!(v.get("sources"), Some(&json!(["regrid"])));
        assert!(matches!(
            v.get("confidence").and_then(Value::as_str),
            Some("high") | Some("medium") | Some("low")
        ));
    }

    #[test]
    fn test_extract_property_fields_maps_key_variants() {
        let raw = map(&[
            ("zip", json!("78701")),
            ("lat", json!(30.1)),
            ("lng", json!(-97.7)),
            ("sqft", json!(1500)),
        ]);
        let fields = extract_property_fields(&raw);
        assert_eq!(fields.get("zip_code"), Some(&json!("78701")));
        assert_eq!(fields.get("latitude"), Some(&json!(30.1)));
        assert_eq!(fields.get("longitude"), Some(&json!(-97.7)));
        assert_eq!(fields.get("sqft"), Some(&json!(1500)));
        assert_eq!(fields.get("owner_name"), Some(&Value::Null));
    }
}
