//! OpenWeather 5-day / 3-hour forecast series, looked up by coordinate.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use skycast_core::{ProviderConfig, ProviderKind};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{TtlCache, FORECAST_TTL};
use crate::http::{get_json, lenient};
use crate::nearest::pick_nearest;
use crate::provider::{ProviderContext, WeatherProvider};
use crate::types::{Coordinate, ForecastEntry, WeatherError, WeatherInfo};

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default, deserialize_with = "lenient::vec")]
    list: Vec<ForecastItem>,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    #[serde(default, deserialize_with = "lenient::i64")]
    dt: Option<i64>,
    #[serde(default, deserialize_with = "lenient::object")]
    main: Option<ForecastMain>,
    #[serde(default, deserialize_with = "lenient::vec")]
    weather: Vec<ForecastCondition>,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    #[serde(default, deserialize_with = "lenient::f64")]
    temp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastCondition {
    #[serde(default, deserialize_with = "lenient::string")]
    description: Option<String>,
}

impl ForecastItem {
    fn into_entry(self) -> Option<ForecastEntry> {
        Some(ForecastEntry {
            timestamp_ms: self.dt?.checked_mul(1000)?,
            temperature_c: self.main.and_then(|m| m.temp),
            temperature_f: None,
            condition: self.weather.into_iter().find_map(|w| w.description),
        })
    }
}

pub struct OpenWeatherProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    /// Forecast series per rounded coordinate
    series: TtlCache<Arc<Vec<ForecastEntry>>>,
}

impl OpenWeatherProvider {
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
            series: TtlCache::with_ttl(FORECAST_TTL),
        }
    }

    async fn forecast_series(
        &self,
        coordinate: Coordinate,
        api_key: &str,
        ctx: &ProviderContext,
    ) -> Result<Arc<Vec<ForecastEntry>>, WeatherError> {
        let key = coordinate.cache_key();
        if let Some(hit) = self.series.get(&key) {
            tracing::debug!("OpenWeather series cache hit for {}", key);
            return Ok(hit);
        }

        let request = self
            .client
            .get(format!("{}/data/2.5/forecast", self.base_url))
            .query(&[
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("units", "metric".to_string()),
                ("appid", api_key.to_string()),
            ]);

        let response: ForecastResponse = get_json(request, self.timeout, ctx.cancellation()).await?;
        let entries: Vec<ForecastEntry> = response
            .list
            .into_iter()
            .filter_map(ForecastItem::into_entry)
            .collect();

        let entries = Arc::new(entries);
        if !entries.is_empty() {
            self.series.insert(key, entries.clone());
        }
        Ok(entries)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenWeather
    }

    #[tracing::instrument(skip_all, name = "openweather_fetch", level = "debug")]
    async fn fetch(&self, ctx: &ProviderContext) -> Result<Option<WeatherInfo>, WeatherError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };
        let Some(coordinate) = ctx.ensure_coordinates().await else {
            return Ok(None);
        };

        let series = match self.forecast_series(coordinate, api_key, ctx).await {
            Ok(series) => series,
            Err(WeatherError::Cancelled) => return Err(WeatherError::Cancelled),
            Err(e) => {
                tracing::debug!("OpenWeather forecast failed: {}", e);
                return Ok(None);
            }
        };

        let nearest = pick_nearest(series.as_slice(), ctx.target_timestamp_ms(), |e| {
            e.timestamp_ms
        });
        Ok(nearest.map(WeatherInfo::from))
    }

    fn clear_cache(&self) {
        self.series.clear();
    }
}
