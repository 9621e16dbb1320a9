// src/matching/mod.rs

pub mod blocking;
pub mod classifier;
pub mod comparator;

/// The incoming record's comparable fields, assembled by the pipeline after
/// address normalization and (optional) geocoding.
#[derive(Debug, Clone, Default)]
pub struct ResolutionInput {
    pub parcel_id: Option<String>,
    pub formatted_address: Option<String>,
    pub street_number: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ResolutionInput {
    /// A record with none of the blocking keys cannot be matched against the
    /// store and is treated as new.
    pub fn is_blockable(&self) -> bool {
        self.parcel_id.is_some()
            || (self.city.is_some() && self.state.is_some())
            || (self.latitude.is_some() && self.longitude.is_some())
    }
}
