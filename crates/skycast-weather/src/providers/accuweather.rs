//! AccuWeather: resolve a location key, then read its 12-hour hourly forecast.
//!
//! Ships disabled; while `enabled = false` the fetcher answers `None`
//! without touching the network but keeps its place in the fallback order.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use skycast_core::{ProviderConfig, ProviderKind};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{TtlCache, FORECAST_TTL, RESULT_TTL};
use crate::http::{get_json, lenient};
use crate::location::{build_location_queries, normalize_query};
use crate::nearest::pick_nearest;
use crate::provider::{ProviderContext, WeatherProvider};
use crate::types::{Coordinate, ForecastEntry, WeatherError, WeatherInfo};

#[derive(Debug, Deserialize)]
struct LocationResult {
    #[serde(rename = "Key", default, deserialize_with = "lenient::string")]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HourlyForecast {
    #[serde(rename = "EpochDateTime", default, deserialize_with = "lenient::i64")]
    epoch: Option<i64>,
    #[serde(rename = "Temperature", default, deserialize_with = "lenient::object")]
    temperature: Option<Temperature>,
    #[serde(rename = "IconPhrase", default, deserialize_with = "lenient::string")]
    icon_phrase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Temperature {
    #[serde(rename = "Value", default, deserialize_with = "lenient::f64")]
    value: Option<f64>,
    #[serde(rename = "Unit", default, deserialize_with = "lenient::string")]
    unit: Option<String>,
}

impl HourlyForecast {
    fn into_entry(self) -> Option<ForecastEntry> {
        let (temperature_c, temperature_f) = match self.temperature {
            Some(Temperature { value: Some(v), unit }) if unit.as_deref() == Some("F") => {
                (Some((v - 32.0) * 5.0 / 9.0), Some(v))
            }
            Some(t) => (t.value, None),
            None => (None, None),
        };
        Some(ForecastEntry {
            timestamp_ms: self.epoch?.checked_mul(1000)?,
            temperature_c,
            temperature_f,
            condition: self.icon_phrase,
        })
    }
}

pub struct AccuWeatherProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    /// Location key per normalized query or rounded coordinate
    location_keys: TtlCache<String>,
    /// Hourly series per location key
    hourly: TtlCache<Arc<Vec<ForecastEntry>>>,
}

impl AccuWeatherProvider {
    pub fn new(client: Client, config: &ProviderConfig, timeout: Duration) -> Self {
        let api_key = config
            .enabled
            .then(|| config.credential().map(str::to_string))
            .flatten();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
            location_keys: TtlCache::with_ttl(RESULT_TTL),
            hourly: TtlCache::with_ttl(FORECAST_TTL),
        }
    }

    async fn key_for_text(
        &self,
        query: &str,
        api_key: &str,
        ctx: &ProviderContext,
    ) -> Result<Option<String>, WeatherError> {
        let cache_key = normalize_query(query);
        if let Some(hit) = self.location_keys.get(&cache_key) {
            return Ok(Some(hit));
        }

        let request = self
            .client
            .get(format!("{}/locations/v1/cities/search", self.base_url))
            .query(&[("apikey", api_key), ("q", query)]);
        let body: Value = get_json(request, self.timeout, ctx.cancellation()).await?;

        let found = lenient::items::<LocationResult>(body)
            .into_iter()
            .find_map(|r| r.key);
        if let Some(key) = &found {
            self.location_keys.insert(cache_key, key.clone());
        }
        Ok(found)
    }

    async fn key_for_coordinate(
        &self,
        coordinate: Coordinate,
        api_key: &str,
        ctx: &ProviderContext,
    ) -> Result<Option<String>, WeatherError> {
        let cache_key = coordinate.cache_key();
        if let Some(hit) = self.location_keys.get(&cache_key) {
            return Ok(Some(hit));
        }

        let position = format!("{},{}", coordinate.latitude, coordinate.longitude);
        let request = self
            .client
            .get(format!("{}/locations/v1/cities/geoposition/search", self.base_url))
            .query(&[("apikey", api_key), ("q", position.as_str())]);
        let result: LocationResult =
            get_json(request, self.timeout, ctx.cancellation()).await?;

        if let Some(key) = &result.key {
            self.location_keys.insert(cache_key, key.clone());
        }
        Ok(result.key)
    }

    /// Text candidates first, then the (possibly geocoded) coordinate
    async fn resolve_location_key(
        &self,
        api_key: &str,
        ctx: &ProviderContext,
    ) -> Result<Option<String>, WeatherError> {
        if ctx.supplied_coordinates().is_none() {
            if let Some(location) = ctx.raw_location() {
                for candidate in build_location_queries(location) {
                    match self.key_for_text(&candidate, api_key, ctx).await {
                        Ok(Some(key)) => return Ok(Some(key)),
                        Ok(None) => {}
                        Err(WeatherError::Cancelled) => return Err(WeatherError::Cancelled),
                        Err(e) => {
                            tracing::debug!("AccuWeather search '{}' failed: {}", candidate, e)
                        }
                    }
                }
            }
        }

        match ctx.ensure_coordinates().await {
            Some(coordinate) => self.key_for_coordinate(coordinate, api_key, ctx).await,
            None => Ok(None),
        }
    }

    async fn hourly_series(
        &self,
        location_key: &str,
        api_key: &str,
        ctx: &ProviderContext,
    ) -> Result<Arc<Vec<ForecastEntry>>, WeatherError> {
        if let Some(hit) = self.hourly.get(location_key) {
            tracing::debug!("AccuWeather hourly cache hit for {}", location_key);
            return Ok(hit);
        }

        let request = self
            .client
            .get(format!(
                "{}/forecasts/v1/hourly/12hour/{}",
                self.base_url, location_key
            ))
            .query(&[("apikey", api_key), ("metric", "true")]);
        let body: Value = get_json(request, self.timeout, ctx.cancellation()).await?;

        let entries: Arc<Vec<ForecastEntry>> = Arc::new(
            lenient::items::<HourlyForecast>(body)
                .into_iter()
                .filter_map(HourlyForecast::into_entry)
                .collect(),
        );
        if !entries.is_empty() {
            self.hourly.insert(location_key, entries.clone());
        }
        Ok(entries)
    }

    async fn try_fetch(
        &self,
        api_key: &str,
        ctx: &ProviderContext,
    ) -> Result<Option<WeatherInfo>, WeatherError> {
        let Some(location_key) = self.resolve_location_key(api_key, ctx).await? else {
            return Ok(None);
        };
        let series = self.hourly_series(&location_key, api_key, ctx).await?;
        let nearest = pick_nearest(series.as_slice(), ctx.target_timestamp_ms(), |e| {
            e.timestamp_ms
        });
        Ok(nearest.map(WeatherInfo::from))
    }
}

#[async_trait]
impl WeatherProvider for AccuWeatherProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AccuWeather
    }

    #[tracing::instrument(skip_all, name = "accuweather_fetch", level = "debug")]
    async fn fetch(&self, ctx: &ProviderContext) -> Result<Option<WeatherInfo>, WeatherError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };

        match self.try_fetch(api_key, ctx).await {
            Err(WeatherError::Cancelled) => Err(WeatherError::Cancelled),
            Err(e) => {
                tracing::debug!("AccuWeather lookup failed: {}", e);
                Ok(None)
            }
            found => found,
        }
    }

    fn clear_cache(&self) {
        self.location_keys.clear();
        self.hourly.clear();
    }
}
