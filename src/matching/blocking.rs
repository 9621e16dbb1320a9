// src/matching/blocking.rs
//
// Recall-oriented candidate prefilter. Issues up to three bounded lookups
// against the property store and unions the results; it never decides a
// match, it only bounds the cost of pairwise comparison.

use anyhow::Result;
use log::debug;
use std::collections::HashMap;
use tokio_postgres::GenericClient;

use crate::db;
use crate::matching::ResolutionInput;
use crate::models::{MatchType, PropertyRow};

/// Which lookup produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingSource {
    ParcelId,
    Address,
    Geocode,
}

impl BlockingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockingSource::ParcelId => "parcel_id",
            BlockingSource::Address => "address",
            BlockingSource::Geocode => "geocode",
        }
    }
}

/// A candidate property with every blocking source that surfaced it.
#[derive(Debug, Clone)]
pub struct BlockedCandidate {
    pub row: PropertyRow,
    pub sources: Vec<BlockingSource>,
}

impl BlockedCandidate {
    /// Maps the strongest blocking source onto the match-type reported on
    /// the scored candidate: parcel lookup implies an exact key, address
    /// lookup a fuzzy comparison, spatial lookup a geocode match.
    pub fn primary_match_type(&self) -> MatchType {
        if self.sources.contains(&BlockingSource::ParcelId) {
            MatchType::Exact
        } else if self.sources.contains(&BlockingSource::Address) {
            MatchType::Fuzzy
        } else {
            MatchType::Geocode
        }
    }
}

/// Run the blocking lookups for one incoming record on the given client
/// (callers pass the resolution transaction so all lookups see one snapshot).
pub async fn find_candidates(
    client: &impl GenericClient,
    input: &ResolutionInput,
) -> Result<Vec<BlockedCandidate>> {
    if !input.is_blockable() {
        debug!("Blocking: no parcel id, address, or coordinates; record treated as new");
        return Ok(Vec::new());
    }

    let mut hits: Vec<(PropertyRow, BlockingSource)> = Vec::new();

    if let Some(parcel_id) = input.parcel_id.as_deref() {
        for row in db::fetch_candidates_by_parcel(client, parcel_id).await? {
            hits.push((row, BlockingSource::ParcelId));
        }
    }

    if let (Some(city), Some(state)) = (input.city.as_deref(), input.state.as_deref()) {
        let rows =
            db::fetch_candidates_by_address(client, city, state, input.street_number.as_deref())
                .await?;
        for row in rows {
            hits.push((row, BlockingSource::Address));
        }
    }

    if let (Some(lat), Some(lng)) = (input.latitude, input.longitude) {
        for row in db::fetch_candidates_near(client, lat, lng).await? {
            hits.push((row, BlockingSource::Geocode));
        }
    }

    let candidates = union_candidates(hits);
    debug!("Blocking: {} distinct candidates", candidates.len());
    Ok(candidates)
}

/// Dedupe lookup hits by property id, preserving first-seen order and
/// accumulating every blocking source per property.
pub fn union_candidates(hits: Vec<(PropertyRow, BlockingSource)>) -> Vec<BlockedCandidate> {
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<BlockedCandidate> = Vec::new();

    for (row, source) in hits {
        match by_id.get(&row.id) {
            Some(&idx) => {
                if !out[idx].sources.contains(&source) {
                    out[idx].sources.push(source);
                }
            }
            None => {
                by_id.insert(row.id.clone(), out.len());
                out.push(BlockedCandidate {
                    row,
                    sources: vec![source],
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> PropertyRow {
        PropertyRow {
            id: id.to_string(),
            parcel_id: None,
            formatted_address: None,
            city: None,
            state: None,
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn test_union_dedupes_by_id_and_keeps_all_sources() {
        let hits = vec![
            (row("a"), BlockingSource::ParcelId),
            (row("b"), BlockingSource::Address),
            (row("a"), BlockingSource::Geocode),
            (row("a"), BlockingSource::Geocode),
        ];
        let merged = union_candidates(hits);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].row.id, "a");
        assert_eq!(
            merged[0].sources,
            vec![BlockingSource::ParcelId, BlockingSource::Geocode]
        );
        assert_eq!(merged[1].sources, vec![BlockingSource::Address]);
    }

    #[test]
    fn test_primary_match_type_priority() {
        let both = BlockedCandidate {
            row: row("a"),
            sources: vec![BlockingSource::Geocode, BlockingSource::ParcelId],
        };
        assert_eq!(both.primary_match_type(), MatchType::Exact);

        let addr = BlockedCandidate {
            row: row("b"),
            sources: vec![BlockingSource::Address, BlockingSource::Geocode],
        };
        assert_eq!(addr.primary_match_type(), MatchType::Fuzzy);

        let geo = BlockedCandidate {
            row: row("c"),
            sources: vec![BlockingSource::Geocode],
        };
        assert_eq!(geo.primary_match_type(), MatchType::Geocode);
    }

    #[test]
    fn test_unblockable_input() {
        let input = ResolutionInput::default();
        assert!(!input.is_blockable());

        let with_city_only = ResolutionInput {
            city: Some("Austin".to_string()),
            ..Default::default()
        };
        assert!(!with_city_only.is_blockable());

        let with_coords = ResolutionInput {
            latitude: Some(30.0),
            longitude: Some(-97.0),
            ..Default::default()
        };
        assert!(with_coords.is_blockable());
    }
}
