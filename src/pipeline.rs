// src/pipeline.rs
//
// Orchestrates resolution for incoming records: address normalization,
// geocoding fallback, candidate blocking, pairwise scoring, classification,
// quality scoring, and persistence. Each record resolves inside a single
// database transaction so the decision commits atomically.

use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use crate::address;
use crate::canonical::{self, PersistOutcome};
use crate::config::PipelineConfig;
use crate::db::PgPool;
use crate::geocoding::GeocodingService;
use crate::matching::{blocking, classifier, comparator, ResolutionInput};
use crate::models::{RawPropertyRecord, ResolvedRecord};
use crate::quality;
use crate::results::ImportStats;

/// Assemble the comparable fields for one record from its pre-parsed fields
/// and normalized address. Coordinates may still be absent; the geocoding
/// fallback fills them in separately.
fn base_input(record: &RawPropertyRecord) -> ResolutionInput {
    let normalized = record
        .address_raw
        .as_deref()
        .map(address::normalize)
        .unwrap_or_default();
    ResolutionInput {
        parcel_id: record
            .parcel_id
            .clone()
            .filter(|p| !p.trim().is_empty()),
        formatted_address: normalized.formatted_address,
        street_number: normalized.street_number,
        city: normalized.city,
        state: normalized.state,
        latitude: record.latitude,
        longitude: record.longitude,
    }
}

/// One-line geocoding query. The normalized formatted address already
/// carries city, state, and zip; passing it alone keeps those parts from
/// being appended a second time. Falls back to the raw address when
/// normalization produced nothing.
fn geocode_query(record: &RawPropertyRecord, input: &ResolutionInput) -> Option<String> {
    input
        .formatted_address
        .clone()
        .or_else(|| record.address_raw.clone())
}

#[derive(Clone)]
pub struct ResolutionPipeline {
    pool: PgPool,
    geocoder: Arc<GeocodingService>,
    config: PipelineConfig,
}

impl ResolutionPipeline {
    pub fn new(pool: PgPool, config: PipelineConfig) -> Result<Self> {
        let geocoder = Arc::new(GeocodingService::new(config.geocoder_timeout)?);
        Ok(Self {
            pool,
            geocoder,
            config,
        })
    }

    /// Build the resolution input, geocoding when the record has an address
    /// but no coordinates. Geocoding failure is not fatal; the record is
    /// then blocked on parcel and address keys only.
    async fn build_input(&self, record: &RawPropertyRecord) -> Result<ResolutionInput> {
        let mut input = base_input(record);

        let needs_coords = input.latitude.is_none() || input.longitude.is_none();
        if needs_coords && self.config.geocoding_enabled {
            if let Some(query) = geocode_query(record, &input) {
                let geocoded = self.geocoder.geocode(&query, None, None, None).await?;
                if let Some(result) = geocoded {
                    input.latitude = Some(result.latitude);
                    input.longitude = Some(result.longitude);
                }
            }
        }
        Ok(input)
    }

    /// Resolve one record end to end. Blocking, scoring, classification and
    /// persistence run inside one transaction; losing a concurrent-creation
    /// race retries resolution once against the committed state.
    pub async fn resolve(&self, record: &RawPropertyRecord) -> Result<ResolvedRecord> {
        let input = self.build_input(record).await?;

        for attempt in 0..2 {
            let mut conn = self
                .pool
                .get()
                .await
                .context("Failed to get connection from pool")?;
            let tx = conn
                .transaction()
                .await
                .context("Failed to start resolution transaction")?;

            let candidates = blocking::find_candidates(&tx, &input).await?;
            let scored: Vec<_> = candidates
                .iter()
                .filter_map(|c| comparator::score_candidate(&input, c))
                .collect();
            let resolution = classifier::classify(scored);

            let fields = quality::extract_property_fields(&record.raw_data);
            let mut quality_score = quality::calculate_quality_score(
                &fields,
                Some(record.extraction_timestamp),
                false,
            );

            let outcome =
                canonical::persist_resolution(&tx, record, &input, &resolution, &mut quality_score)
                    .await?;

            match outcome {
                PersistOutcome::Merged(canonical_id) => {
                    tx.commit()
                        .await
                        .context("Failed to commit resolution transaction")?;
                    return Ok(ResolvedRecord {
                        canonical_id,
                        created_new: false,
                        resolution,
                        quality: quality_score,
                    });
                }
                PersistOutcome::Created(canonical_id) => {
                    tx.commit()
                        .await
                        .context("Failed to commit resolution transaction")?;
                    return Ok(ResolvedRecord {
                        canonical_id,
                        created_new: true,
                        resolution,
                        quality: quality_score,
                    });
                }
                PersistOutcome::Conflict => {
                    tx.rollback()
                        .await
                        .context("Failed to roll back after creation race")?;
                    // Merge into the committed winner rather than re-running
                    // resolution: an unblockable record would never see the
                    // winner through blocking and would conflict forever.
                    let adopt_tx = conn
                        .transaction()
                        .await
                        .context("Failed to start adoption transaction")?;
                    let adopted =
                        canonical::adopt_committed_winner(&adopt_tx, record, &mut quality_score)
                            .await?;
                    if let Some(canonical_id) = adopted {
                        adopt_tx
                            .commit()
                            .await
                            .context("Failed to commit adoption transaction")?;
                        return Ok(ResolvedRecord {
                            canonical_id,
                            created_new: false,
                            resolution,
                            quality: quality_score,
                        });
                    }
                    adopt_tx
                        .rollback()
                        .await
                        .context("Failed to roll back empty adoption")?;
                    debug!(
                        "Creation race for {}:{} but winner row is gone (attempt {}); retrying resolution",
                        record.source_system,
                        record.source_record_id,
                        attempt + 1
                    );
                }
            }
        }

        Err(anyhow::anyhow!(
            "Repeated creation race for {}:{}; record can be retried",
            record.source_system,
            record.source_record_id
        ))
    }

    /// Drain a provider stream with bounded concurrency, recording outcomes
    /// in the shared stats. Record-level failures are counted and logged but
    /// do not abort the run.
    pub async fn run_stream(
        &self,
        mut records: BoxStream<'static, Result<RawPropertyRecord>>,
        stats: Arc<Mutex<ImportStats>>,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_records));
        let mut handles = Vec::new();

        while let Some(item) = records.next().await {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    warn!("Provider stream yielded an invalid record: {:#}", e);
                    stats.lock().await.record_error();
                    continue;
                }
            };

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("Worker semaphore closed")?;
            let pipeline = self.clone();
            let stats = Arc::clone(&stats);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                match pipeline.resolve(&record).await {
                    Ok(resolved) => {
                        debug!(
                            "Resolved {}:{} -> {} ({})",
                            record.source_system,
                            record.source_record_id,
                            resolved.canonical_id,
                            resolved.resolution.action.as_str()
                        );
                        stats.lock().await.record(&resolved);
                    }
                    Err(e) => {
                        warn!(
                            "Failed to resolve {}:{}: {:#}",
                            record.source_system, record.source_record_id, e
                        );
                        stats.lock().await.record_error();
                    }
                }
            }));
        }

        let task_count = handles.len();
        futures::future::join_all(handles).await;
        info!("All {} resolution tasks completed", task_count);
        Ok(())
    }
}
