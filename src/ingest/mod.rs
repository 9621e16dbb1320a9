// src/ingest/mod.rs

pub mod ndjson;
pub mod provider;

pub use ndjson::NdjsonFileProvider;
pub use provider::{ProviderAdapter, ProviderRegistry, RegionQuery};
