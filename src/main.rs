// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::{path::Path, path::PathBuf, sync::Arc, time::Duration, time::Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use parcel_dedupe_lib::{
    config::PipelineConfig,
    db,
    ingest::{NdjsonFileProvider, ProviderRegistry, RegionQuery},
    pipeline::ResolutionPipeline,
    results::ImportStats,
};

/// Property entity resolution import pipeline.
#[derive(Parser, Debug)]
#[command(name = "parcel_dedupe", version, about)]
struct Args {
    /// Registered provider adapter to pull records from.
    #[arg(long, default_value = "file")]
    provider: String,

    /// Two-letter state code scoping the import region.
    #[arg(long)]
    state: String,

    /// Optional county filter within the state.
    #[arg(long)]
    county: Option<String>,

    /// Cap on records pulled from the provider.
    #[arg(long)]
    limit: Option<usize>,

    /// NDJSON export backing the "file" provider.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Concurrency cap for in-flight record resolutions.
    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    /// Skip the geocoding fallback for records without coordinates.
    #[arg(long)]
    no_geocoding: bool,

    /// Stream and validate records without touching the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();
    let run_id = Uuid::new_v4().to_string();
    info!("Starting property resolution import run {}", run_id);
    let start_time = Instant::now();

    let env_paths = [".env", ".env.local", "../.env"];
    let mut loaded_env = false;
    for path in env_paths.iter() {
        if Path::new(path).exists() {
            if let Err(e) = db::load_env_from_file(path) {
                warn!("Failed to load environment from {}: {}", path, e);
            } else {
                loaded_env = true;
                break;
            }
        }
    }
    if !loaded_env {
        info!("No .env file found, using environment variables from system");
    }

    let mut registry = ProviderRegistry::new();
    if let Some(input) = &args.input {
        registry.register(Arc::new(NdjsonFileProvider::new(
            "file",
            "file_export",
            input.clone(),
        )));
    }

    let provider = registry.get(&args.provider).with_context(|| {
        format!(
            "Unknown provider '{}' (registered: {:?})",
            args.provider,
            registry.names()
        )
    })?;

    let query = RegionQuery {
        state: args.state.clone(),
        county: args.county.clone(),
        limit: args.limit,
    };
    info!(
        "Importing from provider '{}' for {}{}",
        provider.name(),
        args.state,
        args.county
            .as_deref()
            .map(|c| format!(" / {}", c))
            .unwrap_or_default()
    );

    if args.dry_run {
        let count = dry_run(provider.stream_region(query)).await?;
        info!("Dry run: {} records validated, nothing persisted", count);
        return Ok(());
    }

    let pool = db::connect()
        .await
        .context("Failed to connect to database")?;

    let config = PipelineConfig {
        max_concurrent_records: args.concurrency,
        geocoder_timeout: Duration::from_secs(10),
        geocoding_enabled: !args.no_geocoding,
    };
    let pipeline = ResolutionPipeline::new(pool, config)?;

    let stats = Arc::new(Mutex::new(ImportStats::new()));
    pipeline
        .run_stream(provider.stream_region(query), Arc::clone(&stats))
        .await?;

    stats.lock().await.report(&run_id, start_time.elapsed());
    Ok(())
}

/// Stream and count records without resolving them. Malformed records still
/// fail the run so bad exports are caught before a real import.
async fn dry_run(
    mut records: futures::stream::BoxStream<'static, Result<parcel_dedupe_lib::models::RawPropertyRecord>>,
) -> Result<usize> {
    use futures::StreamExt;
    let mut count = 0usize;
    while let Some(item) = records.next().await {
        let record = item.context("Provider stream yielded an invalid record")?;
        count += 1;
        log::debug!(
            "Validated {}:{} ({})",
            record.source_system,
            record.source_record_id,
            record.address_raw.as_deref().unwrap_or("<no address>")
        );
    }
    Ok(count)
}
