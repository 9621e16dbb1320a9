// src/geocoding.rs
//
// Address-to-coordinate resolution through an ordered provider fallback
// chain. Provider failures and empty results are absorbed here: the pipeline
// only ever sees Some(result) or None.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::models::{GeocodeAccuracy, GeocodingResult};

const CENSUS_GEOCODER_URL: &str =
    "https://geocoding.geo.census.gov/geocoder/locations/onelineaddress";
const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";
const NOMINATIM_REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const USER_AGENT: &str = "parcel_dedupe/0.1";

// Accuracy and confidence are policy constants keyed by provider identity,
// not computed from responses.
const CENSUS_CONFIDENCE: f64 = 0.95;
const NOMINATIM_CONFIDENCE: f64 = 0.80;

/// A single geocoding backend in the fallback chain.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ok(None) means "no result here, try the next provider". Transport and
    /// parse errors must be mapped to Ok(None) by the implementation.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>>;
}

/// US Census Bureau geocoder. Free, US-only, rooftop-grade results.
pub struct CensusGeocoder {
    client: Client,
}

impl CensusGeocoder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GeocodingProvider for CensusGeocoder {
    fn name(&self) -> &'static str {
        "census"
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>> {
        let request = self.client.get(CENSUS_GEOCODER_URL).query(&[
            ("address", address),
            ("benchmark", "Public_AR_Current"),
            ("format", "json"),
        ]);

        let data: Value = match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Census geocoding returned unparseable body for '{}': {}", address, e);
                    return Ok(None);
                }
            },
            Err(e) => {
                debug!("Census geocoding failed for '{}': {}", address, e);
                return Ok(None);
            }
        };

        let coords = data
            .pointer("/result/addressMatches/0/coordinates")
            .and_then(Value::as_object);
        let Some(coords) = coords else {
            return Ok(None);
        };
        let (Some(latitude), Some(longitude)) = (
            coords.get("y").and_then(Value::as_f64),
            coords.get("x").and_then(Value::as_f64),
        ) else {
            return Ok(None);
        };

        Ok(Some(GeocodingResult {
            latitude,
            longitude,
            accuracy: GeocodeAccuracy::Rooftop,
            source: self.name().to_string(),
            confidence: CENSUS_CONFIDENCE,
        }))
    }
}

/// OpenStreetMap Nominatim. Free, global, street-grade results.
pub struct NominatimGeocoder {
    client: Client,
}

impl NominatimGeocoder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GeocodingProvider for NominatimGeocoder {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>> {
        let request = self
            .client
            .get(NOMINATIM_SEARCH_URL)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .header("User-Agent", USER_AGENT);

        let results: Value = match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Nominatim returned unparseable body for '{}': {}", address, e);
                    return Ok(None);
                }
            },
            Err(e) => {
                debug!("Nominatim geocoding failed for '{}': {}", address, e);
                return Ok(None);
            }
        };

        // Nominatim returns lat/lon as strings.
        let first = results.get(0);
        let latitude = first
            .and_then(|r| r.get("lat"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok());
        let longitude = first
            .and_then(|r| r.get("lon"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok());
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Ok(None);
        };

        Ok(Some(GeocodingResult {
            latitude,
            longitude,
            accuracy: GeocodeAccuracy::Street,
            source: self.name().to_string(),
            confidence: NOMINATIM_CONFIDENCE,
        }))
    }
}

/// A reverse-geocoded address, best effort.
#[derive(Debug, Clone, Default)]
pub struct ReverseGeocodeResult {
    pub display_name: Option<String>,
    pub house_number: Option<String>,
    pub road: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
}

/// Ordered fallback chain over geocoding providers.
pub struct GeocodingService {
    client: Client,
    providers: Vec<Box<dyn GeocodingProvider>>,
}

impl GeocodingService {
    /// Default chain: Census first, Nominatim as fallback.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build geocoding HTTP client")?;
        let providers: Vec<Box<dyn GeocodingProvider>> = vec![
            Box::new(CensusGeocoder::new(client.clone())),
            Box::new(NominatimGeocoder::new(client.clone())),
        ];
        Ok(Self { client, providers })
    }

    pub fn with_providers(client: Client, providers: Vec<Box<dyn GeocodingProvider>>) -> Self {
        Self { client, providers }
    }

    /// Try each provider strictly in order; the first hit wins. Returns
    /// Ok(None) when every provider failed or came back empty.
    pub async fn geocode(
        &self,
        address: &str,
        city: Option<&str>,
        state: Option<&str>,
        zip_code: Option<&str>,
    ) -> Result<Option<GeocodingResult>> {
        let full_address = assemble_full_address(address, city, state, zip_code);
        for provider in &self.providers {
            if let Some(result) = provider.geocode(&full_address).await? {
                debug!(
                    "Geocoded '{}' via {} ({}, confidence {:.2})",
                    full_address,
                    result.source,
                    result.accuracy.as_str(),
                    result.confidence
                );
                return Ok(Some(result));
            }
        }
        debug!("All geocoding providers exhausted for '{}'", full_address);
        Ok(None)
    }

    /// Reverse geocode coordinates to an address via Nominatim.
    pub async fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<ReverseGeocodeResult>> {
        let request = self
            .client
            .get(NOMINATIM_REVERSE_URL)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("format", "json".to_string()),
            ])
            .header("User-Agent", USER_AGENT);

        let data: Value = match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Reverse geocoding returned unparseable body at ({}, {}): {}", lat, lng, e);
                    return Ok(None);
                }
            },
            Err(e) => {
                debug!("Reverse geocoding failed at ({}, {}): {}", lat, lng, e);
                return Ok(None);
            }
        };

        let field = |path: &str| {
            data.pointer(path)
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|s| !s.is_empty())
        };
        Ok(Some(ReverseGeocodeResult {
            display_name: field("/display_name"),
            house_number: field("/address/house_number"),
            road: field("/address/road"),
            city: field("/address/city"),
            state: field("/address/state"),
            postcode: field("/address/postcode"),
        }))
    }
}

/// Join street/city/state/zip the way providers expect one-line input.
fn assemble_full_address(
    address: &str,
    city: Option<&str>,
    state: Option<&str>,
    zip_code: Option<&str>,
) -> String {
    let mut full = address.to_string();
    if let Some(city) = city {
        full.push_str(", ");
        full.push_str(city);
    }
    if let Some(state) = state {
        full.push_str(", ");
        full.push_str(state);
    }
    if let Some(zip) = zip_code {
        full.push(' ');
        full.push_str(zip);
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_full_address() {
        assert_eq!(
            assemble_full_address("100 Congress Ave", Some("Austin"), Some("TX"), Some("78701")),
            "100 Congress Ave, Austin, TX 78701"
        );
        assert_eq!(
            assemble_full_address("100 Congress Ave", None, Some("TX"), None),
            "100 Congress Ave, TX"
        );
        assert_eq!(assemble_full_address("100 Congress Ave", None, None, None), "100 Congress Ave");
    }

    struct StaticProvider {
        result: Option<GeocodingResult>,
    }

    #[async_trait]
    impl GeocodingProvider for StaticProvider {
        fn name(&self) -> &'static str {
            "static"
        }
        async fn geocode(&self, _address: &str) -> Result<Option<GeocodingResult>> {
            Ok(self.result.clone())
        }
    }

    fn hit(source: &str, confidence: f64) -> GeocodingResult {
        GeocodingResult {
            latitude: 30.2672,
            longitude: -97.7431,
            accuracy: GeocodeAccuracy::Rooftop,
            source: source.to_string(),
            confidence,
        }
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_second_provider() {
        let service = GeocodingService::with_providers(
            Client::new(),
            vec![
                Box::new(StaticProvider { result: None }),
                Box::new(StaticProvider {
                    result: Some(hit("secondary", 0.80)),
                }),
            ],
        );
        let result = service
            .geocode("100 Congress Ave", None, None, None)
            .await
            .expect("chain never errors")
            .expect("second provider hits");
        assert_eq!(result.source, "secondary");
        assert_eq!(result.confidence, 0.80);
    }

    #[tokio::test]
    async fn test_first_provider_wins() {
        let service = GeocodingService::with_providers(
            Client::new(),
            vec![
                Box::new(StaticProvider {
                    result: Some(hit("primary", 0.95)),
                }),
                Box::new(StaticProvider {
                    result: Some(hit("secondary", 0.80)),
                }),
            ],
        );
        let result = service
            .geocode("100 Congress Ave", None, None, None)
            .await
            .expect("chain never errors")
            .expect("first provider hits");
        assert_eq!(result.source, "primary");
    }

    #[tokio::test]
    async fn test_all_providers_empty_yields_none() {
        let service = GeocodingService::with_providers(
            Client::new(),
            vec![
                Box::new(StaticProvider { result: None }),
                Box::new(StaticProvider { result: None }),
            ],
        );
        let result = service
            .geocode("nowhere at all", None, None, None)
            .await
            .expect("chain never errors");
        assert!(result.is_none());
    }
}
