use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skycast_core::{AppError, ConfigError, NetworkError, ProviderKind};
use tokio_util::sync::CancellationToken;

/// Geographic coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Cache key rounded to 3 decimal places (~110m)
    pub fn cache_key(&self) -> String {
        format!("{:.3},{:.3}", self.latitude, self.longitude)
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Display icon derived from a condition description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeatherIcon {
    Sunny,
    #[default]
    Cloudy,
    Rainy,
    Snowy,
}

impl WeatherIcon {
    /// Classify a free-text condition. Total: unknown or missing text is cloudy.
    pub fn from_description(description: Option<&str>) -> Self {
        let Some(text) = description else {
            return Self::Cloudy;
        };
        let text = text.to_lowercase();

        if text.contains("snow") {
            Self::Snowy
        } else if ["rain", "drizzle", "storm"].iter().any(|w| text.contains(w)) {
            Self::Rainy
        } else if text.contains("clear") || text.contains("sun") {
            Self::Sunny
        } else {
            Self::Cloudy
        }
    }
}

/// Normalized weather reading returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherInfo {
    pub temperature_c: Option<f64>,
    pub temperature_f: Option<f64>,
    pub description: Option<String>,
    pub icon: WeatherIcon,
}

impl WeatherInfo {
    /// Build from a Celsius reading, deriving Fahrenheit and the icon
    pub fn from_celsius(temperature_c: Option<f64>, description: Option<String>) -> Self {
        let temperature_f = temperature_c.map(celsius_to_fahrenheit);
        Self::new(temperature_c, temperature_f, description)
    }

    pub fn new(
        temperature_c: Option<f64>,
        temperature_f: Option<f64>,
        description: Option<String>,
    ) -> Self {
        let icon = WeatherIcon::from_description(description.as_deref());
        Self {
            temperature_c,
            temperature_f,
            description,
            icon,
        }
    }
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// One timestamped point of a provider's forecast series
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntry {
    pub timestamp_ms: i64,
    pub temperature_c: Option<f64>,
    pub temperature_f: Option<f64>,
    pub condition: Option<String>,
}

impl From<&ForecastEntry> for WeatherInfo {
    fn from(entry: &ForecastEntry) -> Self {
        let temperature_f = entry
            .temperature_f
            .or_else(|| entry.temperature_c.map(celsius_to_fahrenheit));
        WeatherInfo::new(entry.temperature_c, temperature_f, entry.condition.clone())
    }
}

/// Inputs of one resolution call. Immutable once built.
#[derive(Debug, Clone)]
pub struct RequestContext {
    raw_location: Option<String>,
    coordinates: Option<Coordinate>,
    target_timestamp_ms: i64,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn for_location(location: impl Into<String>) -> Self {
        Self::build(Some(location.into()), None)
    }

    pub fn for_coordinates(coordinates: Coordinate) -> Self {
        Self::build(None, Some(coordinates))
    }

    fn build(raw_location: Option<String>, coordinates: Option<Coordinate>) -> Self {
        Self {
            raw_location,
            coordinates,
            target_timestamp_ms: Utc::now().timestamp_millis(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Target a specific instant instead of now
    pub fn at(mut self, target: DateTime<Utc>) -> Self {
        self.target_timestamp_ms = target.timestamp_millis();
        self
    }

    pub fn at_millis(mut self, target_ms: i64) -> Self {
        self.target_timestamp_ms = target_ms;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn raw_location(&self) -> Option<&str> {
        self.raw_location.as_deref()
    }

    pub fn coordinates(&self) -> Option<Coordinate> {
        self.coordinates
    }

    pub fn target_timestamp_ms(&self) -> i64 {
        self.target_timestamp_ms
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Weather subsystem errors. Never surfaced past the public resolve calls.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Request timed out")]
    Timeout,
    #[error("Request cancelled")]
    Cancelled,
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No API key configured for {0}")]
    MissingCredential(ProviderKind),
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl WeatherError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for WeatherError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::Network(e) => AppError::Network(e),
            WeatherError::Timeout => AppError::Network(NetworkError::Timeout),
            WeatherError::Parse(msg) => AppError::Network(NetworkError::InvalidResponse(msg)),
            WeatherError::MissingCredential(kind) => {
                AppError::Config(ConfigError::MissingSetting(format!("weather.{}.api_key", kind)))
            }
            WeatherError::Cancelled => AppError::Service("weather request cancelled".into()),
            WeatherError::Client(msg) => AppError::Service(msg),
        }
    }
}
