//! Forward geocoding: convert a free-text location into coordinates.
//! Uses the OpenWeather direct geocoding endpoint.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::http::{get_json, lenient};
use crate::location::{build_location_queries, normalize_query};
use crate::types::{Coordinate, WeatherError};

#[derive(Debug, Deserialize)]
struct DirectGeocodeResult {
    #[serde(default, deserialize_with = "lenient::f64")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    name: Option<String>,
}

pub struct Geocoder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    /// Geocoding results are stable, entries never expire
    cache: TtlCache<Coordinate>,
}

impl Geocoder {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            cache: TtlCache::unbounded(),
        }
    }

    /// Resolve `location` to a coordinate.
    ///
    /// Candidates from [`build_location_queries`] are tried in order; a failing
    /// candidate is treated as "no match". Returns `None` when nothing matches,
    /// no key is configured, or the call is cancelled.
    #[tracing::instrument(skip(self, cancellation), level = "debug")]
    pub async fn geocode(
        &self,
        location: &str,
        cancellation: &CancellationToken,
    ) -> Option<Coordinate> {
        let key = normalize_query(location);
        if key.is_empty() {
            return None;
        }
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!("Geocode cache hit for '{}'", key);
            return Some(hit);
        }

        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("Geocoding skipped: no API key configured");
            return None;
        };

        for candidate in build_location_queries(location) {
            let candidate_key = normalize_query(&candidate);
            let found = match self.cache.get(&candidate_key) {
                Some(hit) => Some(hit),
                None => match self.lookup(&candidate, api_key, cancellation).await {
                    Ok(found) => found,
                    Err(WeatherError::Cancelled) => {
                        tracing::debug!("Geocoding cancelled");
                        return None;
                    }
                    Err(e) => {
                        tracing::debug!("Geocode candidate '{}' failed: {}", candidate, e);
                        None
                    }
                },
            };

            if let Some(coordinate) = found {
                self.cache.insert(key.clone(), coordinate);
                self.cache.insert(candidate_key, coordinate);
                tracing::info!(
                    "Geocoded '{}' via '{}' to ({:.4}, {:.4})",
                    location,
                    candidate,
                    coordinate.latitude,
                    coordinate.longitude
                );
                return Some(coordinate);
            }
        }

        tracing::debug!("No geocoding match for '{}'", location);
        None
    }

    async fn lookup(
        &self,
        query: &str,
        api_key: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<Coordinate>, WeatherError> {
        let request = self
            .client
            .get(format!("{}/geo/1.0/direct", self.base_url))
            .query(&[("q", query), ("limit", "1"), ("appid", api_key)]);

        let body: Value = get_json(request, self.timeout, cancellation).await?;

        Ok(lenient::items::<DirectGeocodeResult>(body).into_iter().next().and_then(|r| {
            if let Some(name) = &r.name {
                tracing::debug!("Geocode candidate '{}' matched '{}'", query, name);
            }
            Some(Coordinate::new(r.lat?, r.lon?))
        }))
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
