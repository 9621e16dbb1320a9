// src/ingest/ndjson.rs
//
// File-backed provider adapter over newline-delimited JSON exports. Used for
// batch imports of provider dumps and as the fixture provider in local runs;
// network adapters live outside this crate and implement the same trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::address;
use crate::ingest::provider::{ProviderAdapter, RegionQuery};
use crate::models::RawPropertyRecord;

pub struct NdjsonFileProvider {
    name: String,
    source_type: String,
    path: PathBuf,
}

impl NdjsonFileProvider {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            path,
        }
    }

    /// Full parse of the backing file; point lookups scan this. Fine for
    /// fixture-sized exports, which is what this adapter is for.
    async fn load_all(&self) -> Result<Vec<RawPropertyRecord>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read provider file {}", self.path.display()))?;
        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: RawPropertyRecord = serde_json::from_str(line).with_context(|| {
                format!(
                    "Malformed record at {}:{}",
                    self.path.display(),
                    line_no + 1
                )
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Records missing the filtered key are excluded: a region-scoped import
/// must not pull state-less records into every region.
fn record_in_region(record: &RawPropertyRecord, query: &RegionQuery) -> bool {
    let state_matches = record
        .raw_data
        .get("state")
        .and_then(|v| v.as_str())
        .map_or(false, |s| s.eq_ignore_ascii_case(&query.state));
    let county_matches = match &query.county {
        Some(county) => record
            .raw_data
            .get("county")
            .and_then(|v| v.as_str())
            .map_or(false, |c| c.eq_ignore_ascii_case(county)),
        None => true,
    };
    state_matches && county_matches
}

enum StreamState {
    Init(PathBuf),
    Reading { lines: Lines<BufReader<File>>, emitted: usize },
    Done,
}

#[async_trait]
impl ProviderAdapter for NdjsonFileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        &self.source_type
    }

    async fn fetch_property(&self, property_id: &str) -> Result<Option<RawPropertyRecord>> {
        let records = self.load_all().await?;
        Ok(records.into_iter().find(|r| {
            r.source_record_id == property_id || r.parcel_id.as_deref() == Some(property_id)
        }))
    }

    async fn fetch_by_address(
        &self,
        street: &str,
        city: &str,
        state: &str,
        zip_code: Option<&str>,
    ) -> Result<Option<RawPropertyRecord>> {
        let wanted = address::normalize(&match zip_code {
            Some(zip) => format!("{}, {}, {} {}", street, city, state, zip),
            None => format!("{}, {}, {}", street, city, state),
        });
        let Some(wanted_formatted) = wanted.formatted_address else {
            return Ok(None);
        };
        let records = self.load_all().await?;
        Ok(records.into_iter().find(|r| {
            r.address_raw
                .as_deref()
                .and_then(|raw| address::normalize(raw).formatted_address)
                .map_or(false, |f| f.eq_ignore_ascii_case(&wanted_formatted))
        }))
    }

    async fn fetch_batch(&self, property_ids: &[String]) -> Result<Vec<RawPropertyRecord>> {
        let records = self.load_all().await?;
        Ok(records
            .into_iter()
            .filter(|r| property_ids.contains(&r.source_record_id))
            .collect())
    }

    fn stream_region(&self, query: RegionQuery) -> BoxStream<'static, Result<RawPropertyRecord>> {
        let path = self.path.clone();
        stream::unfold(StreamState::Init(path), move |mut state| {
            let query = query.clone();
            async move {
                loop {
                    match state {
                        StreamState::Init(path) => match File::open(&path).await {
                            Ok(file) => {
                                state = StreamState::Reading {
                                    lines: BufReader::new(file).lines(),
                                    emitted: 0,
                                };
                            }
                            Err(e) => {
                                let err = anyhow::Error::from(e).context(format!(
                                    "Failed to open provider file {}",
                                    path.display()
                                ));
                                return Some((Err(err), StreamState::Done));
                            }
                        },
                        StreamState::Reading { mut lines, emitted } => {
                            if query.limit.map_or(false, |limit| emitted >= limit) {
                                return None;
                            }
                            match lines.next_line().await {
                                Ok(Some(line)) => {
                                    if line.trim().is_empty() {
                                        state = StreamState::Reading { lines, emitted };
                                        continue;
                                    }
                                    match serde_json::from_str::<RawPropertyRecord>(&line) {
                                        Ok(record) if record_in_region(&record, &query) => {
                                            return Some((
                                                Ok(record),
                                                StreamState::Reading {
                                                    lines,
                                                    emitted: emitted + 1,
                                                },
                                            ));
                                        }
                                        Ok(_) => {
                                            state = StreamState::Reading { lines, emitted };
                                        }
                                        Err(e) => {
                                            let err = anyhow::Error::from(e)
                                                .context("Malformed record in provider stream");
                                            return Some((Err(err), StreamState::Done));
                                        }
                                    }
                                }
                                Ok(None) => return None,
                                Err(e) => {
                                    let err = anyhow::Error::from(e)
                                        .context("I/O error in provider stream");
                                    return Some((Err(err), StreamState::Done));
                                }
                            }
                        }
                        StreamState::Done => return None,
                    }
                }
            }
        })
        .boxed()
    }
}
