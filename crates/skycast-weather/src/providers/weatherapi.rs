//! WeatherAPI.com combined geocode + forecast endpoint, queried by text first.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use skycast_core::{ProviderConfig, ProviderKind};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{TtlCache, RESULT_TTL};
use crate::http::{get_json, lenient};
use crate::location::{build_location_queries, normalize_query};
use crate::nearest::pick_nearest;
use crate::provider::{ProviderContext, WeatherProvider};
use crate::types::{ForecastEntry, WeatherError, WeatherInfo};

const FORECAST_DAYS: &str = "3";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default, deserialize_with = "lenient::object")]
    forecast: Option<Forecast>,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    #[serde(default, deserialize_with = "lenient::vec")]
    forecastday: Vec<ForecastDay>,
}

#[derive(Debug, Deserialize)]
struct ForecastDay {
    #[serde(default, deserialize_with = "lenient::vec")]
    hour: Vec<Hour>,
}

#[derive(Debug, Deserialize)]
struct Hour {
    #[serde(default, deserialize_with = "lenient::i64")]
    time_epoch: Option<i64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    temp_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    temp_f: Option<f64>,
    #[serde(default, deserialize_with = "lenient::object")]
    condition: Option<Condition>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    #[serde(default, deserialize_with = "lenient::string")]
    text: Option<String>,
}

impl Hour {
    fn into_entry(self) -> Option<ForecastEntry> {
        Some(ForecastEntry {
            timestamp_ms: self.time_epoch?.checked_mul(1000)?,
            temperature_c: self.temp_c,
            temperature_f: self.temp_f,
            condition: self.condition.and_then(|c| c.text),
        })
    }
}

impl ForecastResponse {
    /// Hours of every day, in response order
    fn into_hours(self) -> Vec<ForecastEntry> {
        self.forecast
            .map(|f| f.forecastday)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|day| day.hour)
            .filter_map(Hour::into_entry)
            .collect()
    }
}

pub struct WeatherApiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    /// Flattened hour list per normalized query or rounded coordinate
    responses: TtlCache<Arc<Vec<ForecastEntry>>>,
}

impl WeatherApiProvider {
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
            responses: TtlCache::with_ttl(RESULT_TTL),
        }
    }

    /// Hour list for `query`, or `None` when the provider knows no such place
    async fn hours_for(
        &self,
        query: &str,
        cache_key: String,
        api_key: &str,
        ctx: &ProviderContext,
    ) -> Result<Option<Arc<Vec<ForecastEntry>>>, WeatherError> {
        if let Some(hit) = self.responses.get(&cache_key) {
            tracing::debug!("WeatherAPI cache hit for '{}'", cache_key);
            return Ok(Some(hit));
        }

        let request = self
            .client
            .get(format!("{}/v1/forecast.json", self.base_url))
            .query(&[("key", api_key), ("q", query), ("days", FORECAST_DAYS)]);

        let response: ForecastResponse =
            get_json(request, self.timeout, ctx.cancellation()).await?;
        let hours = response.into_hours();
        if hours.is_empty() {
            return Ok(None);
        }

        let hours = Arc::new(hours);
        self.responses.insert(cache_key, hours.clone());
        Ok(Some(hours))
    }

    async fn first_match(
        &self,
        api_key: &str,
        ctx: &ProviderContext,
    ) -> Result<Option<Arc<Vec<ForecastEntry>>>, WeatherError> {
        if ctx.supplied_coordinates().is_none() {
            if let Some(location) = ctx.raw_location() {
                for candidate in build_location_queries(location) {
                    let key = normalize_query(&candidate);
                    match self.hours_for(&candidate, key, api_key, ctx).await {
                        Ok(Some(hours)) => return Ok(Some(hours)),
                        Ok(None) => {}
                        Err(WeatherError::Cancelled) => return Err(WeatherError::Cancelled),
                        Err(e) => {
                            tracing::debug!("WeatherAPI query '{}' failed: {}", candidate, e)
                        }
                    }
                }
            }
        }

        let Some(coordinate) = ctx.ensure_coordinates().await else {
            return Ok(None);
        };
        let query = format!("{},{}", coordinate.latitude, coordinate.longitude);
        match self.hours_for(&query, coordinate.cache_key(), api_key, ctx).await {
            Err(WeatherError::Cancelled) => Err(WeatherError::Cancelled),
            Err(e) => {
                tracing::debug!("WeatherAPI coordinate query failed: {}", e);
                Ok(None)
            }
            found => found,
        }
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::WeatherApi
    }

    #[tracing::instrument(skip_all, name = "weatherapi_fetch", level = "debug")]
    async fn fetch(&self, ctx: &ProviderContext) -> Result<Option<WeatherInfo>, WeatherError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };

        let Some(hours) = self.first_match(api_key, ctx).await? else {
            return Ok(None);
        };

        let nearest = pick_nearest(hours.as_slice(), ctx.target_timestamp_ms(), |e| {
            e.timestamp_ms
        });
        Ok(nearest.map(WeatherInfo::from))
    }

    fn clear_cache(&self) {
        self.responses.clear();
    }
}
