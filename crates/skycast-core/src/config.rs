use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{AppError, ConfigError};

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Weather data source. Declaration order is the fixed fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenWeather,
    AccuWeather,
    WeatherApi,
}

impl ProviderKind {
    /// All providers in fixed fallback order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenWeather,
        ProviderKind::AccuWeather,
        ProviderKind::WeatherApi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenWeather => "openweather",
            Self::AccuWeather => "accuweather",
            Self::WeatherApi => "weatherapi",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Weather settings
    #[serde(default)]
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Provider tried first until the active-provider store says otherwise
    #[serde(default)]
    pub default_provider: ProviderKind,

    /// Upper bound for every individual HTTP call, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub geocoding: GeocodingConfig,

    #[serde(default = "default_openweather")]
    pub openweather: ProviderConfig,

    /// Disabled by default (request cost and CORS restrictions)
    #[serde(default = "default_accuweather")]
    pub accuweather: ProviderConfig,

    #[serde(default = "default_weatherapi")]
    pub weatherapi: ProviderConfig,
}

/// Forward geocoding endpoint. Authenticates with the OpenWeather key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    pub base_url: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API credential (falls back to the provider's environment variable)
    #[serde(default)]
    pub api_key: Option<String>,

    pub base_url: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderConfig {
    /// Returns the credential if one is configured (not blank, not a placeholder)
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.starts_with("YOUR_"))
    }

    /// Check if the provider may issue requests
    pub fn is_configured(&self) -> bool {
        self.enabled && self.credential().is_some()
    }
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_enabled() -> bool {
    true
}

fn env_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn default_openweather() -> ProviderConfig {
    ProviderConfig {
        api_key: env_key("OPENWEATHER_API_KEY"),
        base_url: "https://api.openweathermap.org".to_string(),
        enabled: true,
    }
}

fn default_accuweather() -> ProviderConfig {
    ProviderConfig {
        api_key: env_key("ACCUWEATHER_API_KEY"),
        base_url: "https://dataservice.accuweather.com".to_string(),
        enabled: false,
    }
}

fn default_weatherapi() -> ProviderConfig {
    ProviderConfig {
        api_key: env_key("WEATHERAPI_API_KEY"),
        base_url: "https://api.weatherapi.com".to_string(),
        enabled: true,
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::default(),
            request_timeout_secs: default_request_timeout_secs(),
            geocoding: GeocodingConfig::default(),
            openweather: default_openweather(),
            accuweather: default_accuweather(),
            weatherapi: default_weatherapi(),
        }
    }
}

impl WeatherConfig {
    /// Settings for a single provider
    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenWeather => &self.openweather,
            ProviderKind::AccuWeather => &self.accuweather,
            ProviderKind::WeatherApi => &self.weatherapi,
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    /// Fill credentials missing from the file from the environment
    fn fill_env_credentials(&mut self) {
        for (provider, var) in [
            (&mut self.openweather, "OPENWEATHER_API_KEY"),
            (&mut self.accuweather, "ACCUWEATHER_API_KEY"),
            (&mut self.weatherapi, "WEATHERAPI_API_KEY"),
        ] {
            if provider.api_key.is_none() {
                provider.api_key = env_key(var);
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skycast");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file
    ///
    /// Fails with [`ConfigError::NotFound`] for a missing file,
    /// [`ConfigError::ParseError`] for malformed TOML and [`AppError::Io`]
    /// for any other read failure.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AppError::from(ConfigError::NotFound(
                path.display().to_string(),
            )),
            _ => AppError::Io(e),
        })?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.weather.fill_env_credentials();

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let weather = &self.weather;

        if weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        } else if weather.request_timeout_secs > 30 {
            result.add_warning(
                "weather.request_timeout_secs",
                "Request timeout is unusually long (>30s); \
                 a slow provider stalls the fallback chain",
            );
        }

        self.validate_url(
            &weather.geocoding.base_url,
            "weather.geocoding.base_url",
            &mut result,
        );

        for kind in ProviderKind::ALL {
            let provider = weather.provider(kind);
            let field = format!("weather.{}", kind);

            self.validate_url(&provider.base_url, &format!("{}.base_url", field), &mut result);

            if provider.enabled && provider.credential().is_none() {
                result.add_warning(
                    format!("{}.api_key", field),
                    "Provider enabled without an API key - it will be skipped",
                );
            }
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(AppError::Io)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .map_err(AppError::Io)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("skycast");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn keyed(config: &mut Config) {
        config.weather.openweather.api_key = Some("ow-key".into());
        config.weather.accuweather.api_key = Some("aw-key".into());
        config.weather.weatherapi.api_key = Some("wa-key".into());
    }

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_accuweather_disabled_by_default() {
        let config = WeatherConfig::default();
        assert!(!config.accuweather.enabled);
        assert!(config.openweather.enabled);
        assert!(config.weatherapi.enabled);
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = Config::default();
        config.weather.weatherapi.base_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.weatherapi.base_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.weather.geocoding.base_url = "ftp://localhost:8080".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_timeout_is_error() {
        let mut config = Config::default();
        config.weather.request_timeout_secs = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.request_timeout_secs"));
    }

    #[test]
    fn test_missing_key_is_warning() {
        let mut config = Config::default();
        keyed(&mut config);
        config.weather.weatherapi.api_key = None;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "weather.weatherapi.api_key"));
        assert!(!result.warnings.iter().any(|w| w.field == "weather.openweather.api_key"));
    }

    #[test]
    fn test_placeholder_key_is_not_a_credential() {
        let provider = ProviderConfig {
            api_key: Some("YOUR_API_KEY".into()),
            base_url: "https://example.com".into(),
            enabled: true,
        };
        assert_eq!(provider.credential(), None);
        assert!(!provider.is_configured());

        let blank = ProviderConfig {
            api_key: Some("   ".into()),
            ..provider.clone()
        };
        assert_eq!(blank.credential(), None);

        let real = ProviderConfig {
            api_key: Some(" abc ".into()),
            ..provider
        };
        assert_eq!(real.credential(), Some("abc"));
        assert!(real.is_configured());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        keyed(&mut config);
        config.weather.default_provider = ProviderKind::WeatherApi;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.weather.default_provider, ProviderKind::WeatherApi);
        assert_eq!(loaded.weather.weatherapi.api_key.as_deref(), Some("wa-key"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::Config(ConfigError::NotFound(_)))
        ));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[weather
default_provider = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_unwritable_location_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let err = Config::default()
            .save_to(&blocker.join("config.toml"))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Io(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_dir = \"/tmp/skycast\"\n[weather]\ndefault_provider = \"weatherapi\"\n",
        )
        .unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.weather.default_provider, ProviderKind::WeatherApi);
        assert_eq!(loaded.weather.request_timeout_secs, 5);
        assert!(!loaded.weather.accuweather.enabled);
    }

    #[test]
    fn test_provider_order() {
        assert_eq!(
            ProviderKind::ALL,
            [ProviderKind::OpenWeather, ProviderKind::AccuWeather, ProviderKind::WeatherApi]
        );
        assert_eq!(ProviderKind::WeatherApi.to_string(), "weatherapi");
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
