//! City to timezone resolution
//!
//! Two HTTP hops: geocode the city name to coordinates, then look the
//! coordinates up in a timezone-by-position service. A city that geocodes
//! to nothing resolves to `None`; the wizard treats that the same as a
//! validation failure.

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[async_trait]
pub trait LocationResolver: Send + Sync {
    /// Resolve a city name to an IANA timezone, or `None` if the city is
    /// unknown to the geocoder.
    async fn resolve_timezone(&self, city: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct TimezoneResponse {
    #[serde(rename = "zoneName")]
    zone_name: Option<String>,
}

/// OpenCage + TimezoneDB backed resolver
pub struct HttpLocationResolver {
    http: reqwest::Client,
    geocode_api_key: String,
    timezonedb_api_key: String,
}

impl HttpLocationResolver {
    pub fn new(geocode_api_key: String, timezonedb_api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            geocode_api_key,
            timezonedb_api_key,
        }
    }
}

#[async_trait]
impl LocationResolver for HttpLocationResolver {
    async fn resolve_timezone(&self, city: &str) -> Result<Option<String>> {
        let geocode: GeocodeResponse = self
            .http
            .get("https://api.opencagedata.com/geocode/v1/json")
            .query(&[("q", city), ("key", &self.geocode_api_key)])
            .send()
            .await?
            .json()
            .await?;

        let geometry = match geocode.results.into_iter().find_map(|r| r.geometry) {
            Some(g) => g,
            None => {
                debug!("No geocode result for city '{}'", city);
                return Ok(None);
            }
        };

        let timezone: TimezoneResponse = self
            .http
            .get("https://api.timezonedb.com/v2.1/get-time-zone")
            .query(&[
                ("key", self.timezonedb_api_key.as_str()),
                ("format", "json"),
                ("by", "position"),
                ("lat", &geometry.lat.to_string()),
                ("lng", &geometry.lng.to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;

        Ok(timezone.zone_name)
    }
}
