// src/matching/comparator.rs
//
// Field-level pairwise scoring between an incoming record and one blocking
// candidate. Only fields present on both sides contribute; the final
// confidence is the arithmetic mean of the contributed scores.

use strsim::jaro_winkler;

use crate::address;
use crate::config::{
    ADDRESS_SIMILARITY_FLOOR, LOCATION_NEAR_METERS, LOCATION_NEAR_SCORE, LOCATION_TIGHT_METERS,
    LOCATION_TIGHT_SCORE, MIN_CANDIDATE_CONFIDENCE,
};
use crate::matching::blocking::BlockedCandidate;
use crate::matching::ResolutionInput;
use crate::models::MatchCandidate;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Jaro-Winkler similarity between two address strings after both are
/// normalized and lower-cased. Returns 0.0 when either side fails to
/// normalize to a formatted address.
pub fn address_similarity(addr1: &str, addr2: &str) -> f64 {
    let norm1 = address::normalize(addr1);
    let norm2 = address::normalize(addr2);
    match (norm1.formatted_address, norm2.formatted_address) {
        (Some(a), Some(b)) => jaro_winkler(&a.to_lowercase(), &b.to_lowercase()),
        _ => 0.0,
    }
}

/// Score one blocking candidate against the incoming record.
///
/// Returns `None` when no field contributed or the mean confidence fell at
/// or below the discard floor; such candidates never reach classification.
pub fn score_candidate(input: &ResolutionInput, candidate: &BlockedCandidate) -> Option<MatchCandidate> {
    let mut scores: Vec<f64> = Vec::new();
    let mut matched_fields: Vec<String> = Vec::new();

    if let (Some(input_parcel), Some(cand_parcel)) =
        (input.parcel_id.as_deref(), candidate.row.parcel_id.as_deref())
    {
        if input_parcel == cand_parcel {
            scores.push(1.0);
            matched_fields.push("parcel_id".to_string());
        }
    }

    if let (Some(input_addr), Some(cand_addr)) = (
        input.formatted_address.as_deref(),
        candidate.row.formatted_address.as_deref(),
    ) {
        let sim = address_similarity(input_addr, cand_addr);
        if sim > ADDRESS_SIMILARITY_FLOOR {
            scores.push(sim);
            matched_fields.push("address".to_string());
        }
    }

    if let (Some(lat), Some(lng), Some(cand_lat), Some(cand_lng)) = (
        input.latitude,
        input.longitude,
        candidate.row.latitude,
        candidate.row.longitude,
    ) {
        let distance = haversine_distance_meters(lat, lng, cand_lat, cand_lng);
        if distance < LOCATION_TIGHT_METERS {
            scores.push(LOCATION_TIGHT_SCORE);
            matched_fields.push("location".to_string());
        } else if distance < LOCATION_NEAR_METERS {
            scores.push(LOCATION_NEAR_SCORE);
            matched_fields.push("location".to_string());
        }
    }

    if scores.is_empty() {
        return None;
    }
    let confidence = scores.iter().sum::<f64>() / scores.len() as f64;
    if confidence <= MIN_CANDIDATE_CONFIDENCE {
        return None;
    }

    Some(MatchCandidate {
        property_id: candidate.row.id.clone(),
        confidence,
        match_type: candidate.primary_match_type(),
        matched_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::blocking::BlockingSource;
    use crate::models::{MatchType, PropertyRow};

    fn candidate(
        parcel_id: Option<&str>,
        address: Option<&str>,
        lat: Option<f64>,
        lng: Option<f64>,
        source: BlockingSource,
    ) -> BlockedCandidate {
        BlockedCandidate {
            row: PropertyRow {
                id: "TX-TRAVIS-ABCDEF1234".to_string(),
                parcel_id: parcel_id.map(String::from),
                formatted_address: address.map(String::from),
                city: Some("Austin".to_string()),
                state: Some("TX".to_string()),
                latitude: lat,
                longitude: lng,
            },
            sources: vec![source],
        }
    }

    #[test]
    fn test_haversine_close_points() {
        // ~1.3 m apart in downtown Austin.
        let d = haversine_distance_meters(30.2672, -97.7431, 30.26721, -97.74312);
        assert!(d < 10.0, "distance was {}", d);
        assert!(d > 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Austin to Dallas is roughly 290 km.
        let d = haversine_distance_meters(30.2672, -97.7431, 32.7767, -96.7970);
        assert!((280_000.0..300_000.0).contains(&d), "distance was {}", d);
    }

    #[test]
    fn test_parcel_equality_scores_full_confidence() {
        let input = ResolutionInput {
            parcel_id: Some("TX-TRAVIS-001".to_string()),
            ..Default::default()
        };
        let cand = candidate(Some("TX-TRAVIS-001"), None, None, None, BlockingSource::ParcelId);
        let m = score_candidate(&input, &cand).expect("candidate survives");
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.match_type, MatchType::Exact);
        assert_eq!(m.matched_fields, vec!["parcel_id"]);
    }

    #[test]
    fn test_address_similarity_after_normalization() {
        let sim = address_similarity(
            "100 Congress Ave, Austin, TX 78701",
            "100 Congress Avenue, Austin, Texas 78701",
        );
        assert!(sim > 0.85, "similarity was {}", sim);
    }

    #[test]
    fn test_address_contributes_matched_field() {
        let input = ResolutionInput {
            formatted_address: Some("100 Congress Ave, Austin, TX 78701".to_string()),
            ..Default::default()
        };
        let cand = candidate(
            None,
            Some("100 Congress Avenue, Austin, Texas 78701"),
            None,
            None,
            BlockingSource::Address,
        );
        let m = score_candidate(&input, &cand).expect("candidate survives");
        assert!(m.matched_fields.contains(&"address".to_string()));
        assert_eq!(m.match_type, MatchType::Fuzzy);
    }

    #[test]
    fn test_location_bands() {
        let input = ResolutionInput {
            latitude: Some(30.2672),
            longitude: Some(-97.7431),
            ..Default::default()
        };

        // < 10 m contributes 0.95.
        let tight = candidate(None, None, Some(30.26721), Some(-97.74312), BlockingSource::Geocode);
        let m = score_candidate(&input, &tight).expect("tight survives");
        assert_eq!(m.confidence, 0.95);
        assert_eq!(m.match_type, MatchType::Geocode);

        // ~30 m contributes 0.80.
        let near = candidate(None, None, Some(30.26745), Some(-97.7431), BlockingSource::Geocode);
        let m = score_candidate(&input, &near).expect("near survives");
        assert_eq!(m.confidence, 0.80);

        // >= 50 m contributes nothing, so no field scored at all.
        let far = candidate(None, None, Some(30.2700), Some(-97.7431), BlockingSource::Geocode);
        assert!(score_candidate(&input, &far).is_none());
    }

    #[test]
    fn test_confidence_is_mean_of_contributed_scores() {
        let input = ResolutionInput {
            parcel_id: Some("P-1".to_string()),
            latitude: Some(30.2672),
            longitude: Some(-97.7431),
            ..Default::default()
        };
        let cand = candidate(Some("P-1"), None, Some(30.26721), Some(-97.74312), BlockingSource::ParcelId);
        let m = score_candidate(&input, &cand).expect("candidate survives");
        // parcel 1.0 and location 0.95; address absent on both sides is skipped.
        assert!((m.confidence - 0.975).abs() < 1e-9);
        assert_eq!(m.matched_fields, vec!["parcel_id", "location"]);
    }

    #[test]
    fn test_absent_fields_are_skipped_not_zeroed() {
        let input = ResolutionInput {
            parcel_id: Some("P-1".to_string()),
            formatted_address: Some("100 Congress Ave, Austin, TX 78701".to_string()),
            ..Default::default()
        };
        // Candidate has no parcel and no coordinates; only address compares.
        let cand = candidate(
            None,
            Some("100 Congress Ave, Austin, TX 78701"),
            None,
            None,
            BlockingSource::Address,
        );
        let m = score_candidate(&input, &cand).expect("candidate survives");
        assert_eq!(m.matched_fields, vec!["address"]);
        assert!(m.confidence > 0.99);
    }

    #[test]
    fn test_no_contributing_field_discards_candidate() {
        let input = ResolutionInput {
            parcel_id: Some("P-1".to_string()),
            ..Default::default()
        };
        let cand = candidate(Some("P-2"), None, None, None, BlockingSource::ParcelId);
        assert!(score_candidate(&input, &cand).is_none());
    }
}
