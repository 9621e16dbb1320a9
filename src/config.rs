// src/config.rs

use std::time::Duration;

/// Best confidence at or above this is an exact-grade auto merge
/// (typically parcel-id equality).
pub const CONFIDENCE_EXACT: f64 = 0.99;

/// Best confidence at or above this auto-merges without an audit flag.
pub const CONFIDENCE_AUTO_MERGE: f64 = 0.90;

/// Best confidence in [0.85, 0.90) still auto-merges but is flagged for audit.
pub const CONFIDENCE_FLAGGED_MERGE: f64 = 0.85;

/// Best confidence in [0.70, 0.85) is queued for human review.
pub const CONFIDENCE_REVIEW: f64 = 0.70;

/// Candidates scoring at or below this are discarded before classification.
pub const MIN_CANDIDATE_CONFIDENCE: f64 = 0.3;

/// Address similarity below this floor does not contribute to the pair score.
pub const ADDRESS_SIMILARITY_FLOOR: f64 = 0.85;

/// Spatial blocking radius in meters.
pub const BLOCKING_RADIUS_METERS: f64 = 100.0;

/// Location proximity bands for pairwise comparison (meters / fixed score).
pub const LOCATION_TIGHT_METERS: f64 = 10.0;
pub const LOCATION_TIGHT_SCORE: f64 = 0.95;
pub const LOCATION_NEAR_METERS: f64 = 50.0;
pub const LOCATION_NEAR_SCORE: f64 = 0.80;

/// Row caps for the three blocking lookups.
pub const PARCEL_BLOCK_LIMIT: i64 = 5;
pub const ADDRESS_BLOCK_LIMIT: i64 = 20;
pub const GEO_BLOCK_LIMIT: i64 = 10;

/// How many candidates are retained on a resolution result for audit.
pub const MAX_RETAINED_MATCHES: usize = 5;

/// Runtime configuration for one import job. Built once in main and passed
/// by reference into the components that need it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrency cap for in-flight record resolutions.
    pub max_concurrent_records: usize,
    /// Per-provider-call timeout for geocoding requests.
    pub geocoder_timeout: Duration,
    /// Skip the geocoding fallback entirely (records without coordinates
    /// are then blocked on parcel/address only).
    pub geocoding_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_records: 10,
            geocoder_timeout: Duration::from_secs(10),
            geocoding_enabled: true,
        }
    }
}
