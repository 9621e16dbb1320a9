// src/canonical.rs
//
// Canonical-ID assignment and persistence of the merge decision. Auto-merge
// reuses the winning property's id; review and keep-separate outcomes mint a
// deterministic new id so re-ingesting the same source record converges on
// the same canonical property.

use anyhow::Result;
use log::debug;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio_postgres::GenericClient;

use crate::db::{self, InsertOutcome, NewProperty};
use crate::matching::ResolutionInput;
use crate::models::{
    DataQualityScore, EntityResolutionResult, RawPropertyRecord, ResolutionAction,
};

const HASH_LEN: usize = 10;

/// Mint a canonical property id: `{STATE}-{COUNTY|UNKNOWN}-{HASH}` where the
/// hash is the first 10 hex chars of SHA-256 over the parcel id, or over
/// `source_system:source_record_id` when no parcel id exists.
pub fn mint_canonical_id(
    state: Option<&str>,
    county: Option<&str>,
    parcel_id: Option<&str>,
    source_system: &str,
    source_record_id: &str,
) -> String {
    let state_part = state
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "XX".to_string());
    let county_part = county
        .map(|c| c.trim().to_uppercase().replace(char::is_whitespace, "_"))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let hash_input = match parcel_id.filter(|p| !p.trim().is_empty()) {
        Some(parcel) => parcel.trim().to_string(),
        None => format!("{}:{}", source_system, source_record_id),
    };
    let digest = Sha256::digest(hash_input.as_bytes());
    let hash_part = hex::encode(digest)[..HASH_LEN].to_uppercase();

    format!("{}-{}-{}", state_part, county_part, hash_part)
}

/// The dedupe key enforcing the store's creation-race uniqueness constraint.
pub fn dedupe_key(record: &RawPropertyRecord) -> String {
    match record.parcel_id.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(parcel) => parcel.trim().to_string(),
        None => format!("{}:{}", record.source_system, record.source_record_id),
    }
}

/// What the canonicalizer did with one resolution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Merged into an existing property.
    Merged(String),
    /// Created a new canonical property (provisional when queued for review).
    Created(String),
    /// Lost a concurrent-creation race; resolution must be retried against
    /// the committed state.
    Conflict,
}

/// Persist a resolution decision and return the canonical id ultimately used.
///
/// Must run on the same transaction as the blocking lookups so a single
/// record's resolution commits atomically. Fills `quality.sources` from the
/// property's provenance before writing the snapshot.
pub async fn persist_resolution(
    client: &impl GenericClient,
    record: &RawPropertyRecord,
    input: &ResolutionInput,
    resolution: &EntityResolutionResult,
    quality: &mut DataQualityScore,
) -> Result<PersistOutcome> {
    match resolution.action {
        ResolutionAction::AutoMerge => {
            let canonical_id = resolution
                .canonical_id
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("auto_merge resolution without a canonical id"))?;
            db::append_source(client, canonical_id, &record.source_system).await?;
            quality.sources = db::fetch_property_sources(client, canonical_id).await?;
            db::update_quality(client, canonical_id, quality).await?;
            debug!(
                "Merged {}:{} into {} (confidence {:.4}{})",
                record.source_system,
                record.source_record_id,
                canonical_id,
                resolution.confidence,
                if resolution.flagged_for_audit {
                    ", flagged"
                } else {
                    ""
                }
            );
            Ok(PersistOutcome::Merged(canonical_id.to_string()))
        }
        ResolutionAction::Review | ResolutionAction::KeepSeparate => {
            let county = record
                .raw_data
                .get("county")
                .and_then(|v| v.as_str())
                .filter(|c| !c.trim().is_empty());
            let canonical_id = mint_canonical_id(
                input.state.as_deref(),
                county,
                record.parcel_id.as_deref(),
                &record.source_system,
                &record.source_record_id,
            );
            let key = dedupe_key(record);
            quality.sources = vec![record.source_system.clone()];
            let new_property = NewProperty {
                id: &canonical_id,
                dedupe_key: &key,
                parcel_id: record.parcel_id.as_deref(),
                formatted_address: input.formatted_address.as_deref(),
                city: input.city.as_deref(),
                state: input.state.as_deref(),
                latitude: input.latitude,
                longitude: input.longitude,
                source_system: &record.source_system,
                quality: serde_json::to_value(quality)?,
            };
            match db::insert_property(client, &new_property).await? {
                InsertOutcome::Created => {
                    if resolution.action == ResolutionAction::Review {
                        let details = json!({
                            "matches": resolution.matches,
                            "address": input.formatted_address,
                            "parcel_id": record.parcel_id,
                        });
                        db::enqueue_review(
                            client,
                            &canonical_id,
                            &record.source_system,
                            &record.source_record_id,
                            resolution.confidence,
                            details,
                        )
                        .await?;
                        debug!(
                            "Created provisional property {} and queued for review (confidence {:.4})",
                            canonical_id, resolution.confidence
                        );
                    } else {
                        debug!("Created new property {}", canonical_id);
                    }
                    Ok(PersistOutcome::Created(canonical_id))
                }
                InsertOutcome::Conflict => Ok(PersistOutcome::Conflict),
            }
        }
    }
}

/// After losing a creation race, merge into the committed winner for this
/// record's dedupe key. Returns the winner's canonical id, or None when the
/// winning row is gone and resolution should be retried from the top. This
/// is what makes re-ingesting the same source record idempotent even when
/// the record carries no blocking keys.
pub async fn adopt_committed_winner(
    client: &impl GenericClient,
    record: &RawPropertyRecord,
    quality: &mut DataQualityScore,
) -> Result<Option<String>> {
    let key = dedupe_key(record);
    let Some(winner) = db::fetch_property_by_dedupe_key(client, &key).await? else {
        return Ok(None);
    };
    db::append_source(client, &winner.id, &record.source_system).await?;
    quality.sources = db::fetch_property_sources(client, &winner.id).await?;
    db::update_quality(client, &winner.id, quality).await?;
    debug!(
        "Adopted committed winner {} for dedupe_key '{}' after creation race",
        winner.id, key
    );
    Ok(Some(winner.id))
}
