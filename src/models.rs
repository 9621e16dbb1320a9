// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One ingestion event from an external data provider. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPropertyRecord {
    pub source_system: String,
    pub source_type: String,
    pub source_record_id: String,
    pub extraction_timestamp: DateTime<Utc>,
    /// Opaque provider payload; field extraction for quality scoring happens
    /// in `quality::extract_property_fields`.
    #[serde(default)]
    pub raw_data: Map<String, Value>,

    // Pre-parsed fields the provider fills in when it can.
    #[serde(default)]
    pub parcel_id: Option<String>,
    #[serde(default)]
    pub address_raw: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// A parsed and USPS-standardized address. Value object, recomputed on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAddress {
    pub street_number: Option<String>,
    pub street_name: Option<String>,
    pub street_suffix: Option<String>,
    pub direction: Option<String>,
    pub unit_type: Option<String>,
    pub unit_number: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub zip4: Option<String>,
    pub street_address: Option<String>,
    pub formatted_address: Option<String>,
    pub confidence: f64,
}

/// Accuracy tier a geocoding provider reports for its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocodeAccuracy {
    Rooftop,
    Parcel,
    Street,
    City,
}

impl GeocodeAccuracy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeocodeAccuracy::Rooftop => "rooftop",
            GeocodeAccuracy::Parcel => "parcel",
            GeocodeAccuracy::Street => "street",
            GeocodeAccuracy::City => "city",
        }
    }
}

/// Result of one geocoding call. Consumed immediately, not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingResult {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: GeocodeAccuracy,
    pub source: String,
    pub confidence: f64,
}

/// How a scored candidate pair relates: exact key equality, fuzzy address
/// agreement, or geocode proximity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Geocode,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Geocode => "geocode",
        }
    }
}

/// A potential duplicate match with its computed confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub property_id: String,
    pub confidence: f64,
    pub match_type: MatchType,
    pub matched_fields: Vec<String>,
}

/// Terminal classification action for a match decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    AutoMerge,
    Review,
    KeepSeparate,
}

impl ResolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::AutoMerge => "auto_merge",
            ResolutionAction::Review => "review",
            ResolutionAction::KeepSeparate => "keep_separate",
        }
    }
}

/// Outcome of entity resolution for one incoming record.
///
/// `canonical_id` is non-null only when `action == AutoMerge`; for review and
/// keep-separate outcomes the id is minted later by the canonicalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityResolutionResult {
    pub canonical_id: Option<String>,
    pub confidence: f64,
    /// Top candidates, highest confidence first, capped at 5 for audit.
    pub matches: Vec<MatchCandidate>,
    pub action: ResolutionAction,
    /// True for the lower-certainty auto-merge band [0.85, 0.90).
    pub flagged_for_audit: bool,
}

impl EntityResolutionResult {
    pub fn no_candidates() -> Self {
        Self {
            canonical_id: None,
            confidence: 0.0,
            matches: Vec::new(),
            action: ResolutionAction::KeepSeparate,
            flagged_for_audit: false,
        }
    }
}

/// The six named quality components, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityComponents {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
    pub validity: f64,
    pub uniqueness: f64,
}

/// Confidence bucket derived from the aggregate quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityBucket {
    High,
    Medium,
    Low,
}

impl QualityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityBucket::High => "high",
            QualityBucket::Medium => "medium",
            QualityBucket::Low => "low",
        }
    }
}

/// Weighted data-quality snapshot attached to every resolved record.
///
/// The serialized shape is a wire contract: `score`, nested `components`,
/// `freshness_hours`, `sources`, `confidence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityScore {
    pub score: f64,
    pub components: QualityComponents,
    pub freshness_hours: i64,
    pub sources: Vec<String>,
    pub confidence: QualityBucket,
}

/// A canonical property row as returned by the blocking lookups.
#[derive(Debug, Clone)]
pub struct PropertyRow {
    pub id: String,
    pub parcel_id: Option<String>,
    pub formatted_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Everything the pipeline produces for one record: the resolution decision,
/// the canonical id ultimately persisted, and the quality snapshot.
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub canonical_id: String,
    pub created_new: bool,
    pub resolution: EntityResolutionResult,
    pub quality: DataQualityScore,
}
