// src/ingest/provider.rs
//
// Capability seam for external data providers. Adapters are independent
// types selected through a registry; the pipeline only ever sees the trait.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::RawPropertyRecord;

/// A region scoped provider export request.
#[derive(Debug, Clone)]
pub struct RegionQuery {
    pub state: String,
    pub county: Option<String>,
    pub limit: Option<usize>,
}

/// Capabilities every data provider adapter exposes.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Category tag stamped onto emitted records (`parcel_registry`,
    /// `tax_assessor`, `listing_feed`, ...).
    fn source_type(&self) -> &str;

    async fn fetch_property(&self, property_id: &str) -> Result<Option<RawPropertyRecord>>;

    async fn fetch_by_address(
        &self,
        street: &str,
        city: &str,
        state: &str,
        zip_code: Option<&str>,
    ) -> Result<Option<RawPropertyRecord>>;

    async fn fetch_batch(&self, property_ids: &[String]) -> Result<Vec<RawPropertyRecord>>;

    /// Lazy, finite, non-restartable sequence of records for a region.
    /// Malformed provider payloads surface as `Err` items (contract
    /// violations, not transient conditions).
    fn stream_region(&self, query: RegionQuery) -> BoxStream<'static, Result<RawPropertyRecord>>;
}

/// Name-keyed adapter registry; replaces provider selection by inheritance.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct NullAdapter {
        name: &'static str,
    }

    #[async_trait]
    impl ProviderAdapter for NullAdapter {
        fn name(&self) -> &str {
            self.name
        }
        fn source_type(&self) -> &str {
            "test"
        }
        async fn fetch_property(&self, _: &str) -> Result<Option<RawPropertyRecord>> {
            Ok(None)
        }
        async fn fetch_by_address(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> Result<Option<RawPropertyRecord>> {
            Ok(None)
        }
        async fn fetch_batch(&self, _: &[String]) -> Result<Vec<RawPropertyRecord>> {
            Ok(Vec::new())
        }
        fn stream_region(&self, _: RegionQuery) -> BoxStream<'static, Result<RawPropertyRecord>> {
            Box::pin(stream::empty())
        }
    }

    #[test]
    fn test_registry_lookup_and_names() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(NullAdapter { name: "regrid" }));
        registry.register(Arc::new(NullAdapter { name: "attom" }));

        assert!(registry.get("regrid").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.names(), vec!["attom".to_string(), "regrid".to_string()]);
    }
}
