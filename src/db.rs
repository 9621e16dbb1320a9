// src/db.rs

use anyhow::{Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::{debug, info, warn};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Config, GenericClient, NoTls, Row as PgRow};
use uuid::Uuid;

use crate::config::{
    ADDRESS_BLOCK_LIMIT, BLOCKING_RADIUS_METERS, GEO_BLOCK_LIMIT, PARCEL_BLOCK_LIMIT,
};
use crate::models::{DataQualityScore, PropertyRow};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Reads environment variables and constructs a PostgreSQL config.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port_str = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
    let port = port_str.parse::<u16>().unwrap_or(5432);
    let dbname = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "parceldata".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("property_resolution_pipeline");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Initializes the database connection pool.
pub async fn connect() -> Result<PgPool> {
    let config = build_pg_config();
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool = Pool::builder()
        .max_size(30)
        .min_idle(Some(2))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    conn.query_one("SELECT 1", &[])
        .await
        .context("Test query 'SELECT 1' failed")?;
    info!("Database connection pool initialized successfully.");
    Ok(pool.clone())
}

/// Loads environment variables from a .env file. Missing files are not an
/// error; the system environment is used as-is.
pub fn load_env_from_file(file_path: &str) -> Result<()> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    match File::open(file_path) {
        Ok(file) => {
            let reader = BufReader::new(file);
            for line in reader.lines() {
                let line = line.context("Failed to read line from env file")?;
                if line.starts_with('#') || line.trim().is_empty() {
                    continue;
                }
                if let Some(idx) = line.find('=') {
                    let key = line[..idx].trim();
                    let value = line[idx + 1..].trim().trim_matches('"');
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                        debug!(
                            "Set env var from file: {} = {}",
                            key,
                            if key == "POSTGRES_PASSWORD" {
                                "[hidden]"
                            } else {
                                value
                            }
                        );
                    }
                }
            }
            info!("Loaded environment variables from {}", file_path);
        }
        Err(e) => {
            warn!(
                "Could not open env file '{}': {}. Proceeding with system environment variables.",
                file_path, e
            );
        }
    }
    Ok(())
}

const PROPERTY_COLUMNS: &str =
    "id, parcel_id, formatted_address, city, state, latitude, longitude";

fn row_to_property(row: &PgRow) -> PropertyRow {
    PropertyRow {
        id: row.get("id"),
        parcel_id: row.get("parcel_id"),
        formatted_address: row.get("formatted_address"),
        city: row.get("city"),
        state: row.get("state"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
    }
}

/// Exact parcel-id equality lookup (blocking, max 5 rows).
pub async fn fetch_candidates_by_parcel(
    client: &impl GenericClient,
    parcel_id: &str,
) -> Result<Vec<PropertyRow>> {
    let query = format!(
        "SELECT {} FROM public.property WHERE parcel_id = $1 LIMIT $2",
        PROPERTY_COLUMNS
    );
    let rows = client
        .query(&query, &[&parcel_id, &PARCEL_BLOCK_LIMIT])
        .await
        .context("Blocking: parcel-id candidate query failed")?;
    Ok(rows.iter().map(row_to_property).collect())
}

/// City + state equality lookup, narrowed by the street-number prefix of the
/// stored formatted address when the incoming record has one (blocking,
/// max 20 rows).
pub async fn fetch_candidates_by_address(
    client: &impl GenericClient,
    city: &str,
    state: &str,
    street_number: Option<&str>,
) -> Result<Vec<PropertyRow>> {
    let prefix = street_number.map(|n| format!("{} %", n));
    let query = format!(
        "SELECT {} FROM public.property
         WHERE lower(city) = lower($1) AND upper(state) = upper($2)
           AND formatted_address IS NOT NULL
           AND ($3::text IS NULL OR formatted_address LIKE $3)
         LIMIT $4",
        PROPERTY_COLUMNS
    );
    let rows = client
        .query(&query, &[&city, &state, &prefix, &ADDRESS_BLOCK_LIMIT])
        .await
        .context("Blocking: address candidate query failed")?;
    Ok(rows.iter().map(row_to_property).collect())
}

/// Spatial proximity lookup within the blocking radius (max 10 rows).
pub async fn fetch_candidates_near(
    client: &impl GenericClient,
    latitude: f64,
    longitude: f64,
) -> Result<Vec<PropertyRow>> {
    let query = format!(
        "SELECT {} FROM public.property
         WHERE latitude IS NOT NULL AND longitude IS NOT NULL
           AND ST_DWithin(
                 ST_SetSRID(ST_MakePoint(longitude, latitude), 4326)::geography,
                 ST_SetSRID(ST_MakePoint($2, $1), 4326)::geography,
                 $3)
         LIMIT $4",
        PROPERTY_COLUMNS
    );
    let rows = client
        .query(
            &query,
            &[&latitude, &longitude, &BLOCKING_RADIUS_METERS, &GEO_BLOCK_LIMIT],
        )
        .await
        .context("Blocking: spatial candidate query failed")?;
    Ok(rows.iter().map(row_to_property).collect())
}

/// Field values for a brand-new canonical property row.
#[derive(Debug, Clone)]
pub struct NewProperty<'a> {
    pub id: &'a str,
    /// Uniqueness key for concurrent-create races: the parcel id when known,
    /// otherwise `source_system:source_record_id`.
    pub dedupe_key: &'a str,
    pub parcel_id: Option<&'a str>,
    pub formatted_address: Option<&'a str>,
    pub city: Option<&'a str>,
    pub state: Option<&'a str>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub source_system: &'a str,
    pub quality: serde_json::Value,
}

/// Outcome of attempting to create a new canonical property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    /// Another worker committed a row with the same dedupe key (or id)
    /// first. The caller should retry resolution against committed state.
    Conflict,
}

pub async fn insert_property(
    client: &impl GenericClient,
    property: &NewProperty<'_>,
) -> Result<InsertOutcome> {
    const INSERT_SQL: &str = "
        INSERT INTO public.property (
            id, dedupe_key, parcel_id, formatted_address, city, state,
            latitude, longitude, source_systems, quality, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, ARRAY[$9]::text[], $10, now(), now())";

    let result = client
        .execute(
            INSERT_SQL,
            &[
                &property.id,
                &property.dedupe_key,
                &property.parcel_id,
                &property.formatted_address,
                &property.city,
                &property.state,
                &property.latitude,
                &property.longitude,
                &property.source_system,
                &property.quality,
            ],
        )
        .await;

    match result {
        Ok(_) => Ok(InsertOutcome::Created),
        Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
            debug!(
                "Property insert for dedupe_key '{}' lost a creation race",
                property.dedupe_key
            );
            Ok(InsertOutcome::Conflict)
        }
        Err(e) => Err(e).context("Failed to insert new canonical property"),
    }
}

/// Append a contributing source system to a property's provenance list.
/// Re-adding an existing source is a no-op.
pub async fn append_source(
    client: &impl GenericClient,
    property_id: &str,
    source_system: &str,
) -> Result<()> {
    const APPEND_SQL: &str = "
        UPDATE public.property
        SET source_systems = array_append(source_systems, $2), updated_at = now()
        WHERE id = $1 AND NOT ($2 = ANY(source_systems))";
    client
        .execute(APPEND_SQL, &[&property_id, &source_system])
        .await
        .context("Failed to append source provenance")?;
    Ok(())
}

/// Fetch the committed property holding a dedupe key, used to adopt the
/// winner after losing a creation race.
pub async fn fetch_property_by_dedupe_key(
    client: &impl GenericClient,
    dedupe_key: &str,
) -> Result<Option<PropertyRow>> {
    let query = format!(
        "SELECT {} FROM public.property WHERE dedupe_key = $1",
        PROPERTY_COLUMNS
    );
    let row = client
        .query_opt(&query, &[&dedupe_key])
        .await
        .context("Failed to fetch property by dedupe key")?;
    Ok(row.as_ref().map(row_to_property))
}

pub async fn fetch_property_sources(
    client: &impl GenericClient,
    property_id: &str,
) -> Result<Vec<String>> {
    let row = client
        .query_opt(
            "SELECT source_systems FROM public.property WHERE id = $1",
            &[&property_id],
        )
        .await
        .context("Failed to fetch property provenance")?;
    Ok(row.map(|r| r.get("source_systems")).unwrap_or_default())
}

/// Replace a property's current quality snapshot.
pub async fn update_quality(
    client: &impl GenericClient,
    property_id: &str,
    quality: &DataQualityScore,
) -> Result<()> {
    let quality_json =
        serde_json::to_value(quality).context("Failed to serialize quality score")?;
    client
        .execute(
            "UPDATE public.property SET quality = $2, updated_at = now() WHERE id = $1",
            &[&property_id, &quality_json],
        )
        .await
        .context("Failed to update quality snapshot")?;
    Ok(())
}

/// Queue a review-band resolution outcome for human adjudication. The
/// adjudication workflow itself is external; this is only the handoff row.
pub async fn enqueue_review(
    client: &impl GenericClient,
    property_id: &str,
    source_system: &str,
    source_record_id: &str,
    triggering_confidence: f64,
    details: serde_json::Value,
) -> Result<()> {
    const INSERT_SQL: &str = "
        INSERT INTO public.resolution_review_queue (
            id, property_id, source_system, source_record_id,
            triggering_confidence, details, status, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, 'pending_review', now())";
    let id = Uuid::new_v4().to_string();
    client
        .execute(
            INSERT_SQL,
            &[
                &id,
                &property_id,
                &source_system,
                &source_record_id,
                &triggering_confidence,
                &details,
            ],
        )
        .await
        .context("Failed to enqueue review entry")?;
    Ok(())
}
