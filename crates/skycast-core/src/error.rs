//! Error types shared by the Skycast crates.
//!
//! Weather resolution itself never surfaces errors to callers; these types
//! carry failure detail to logs and to hosts that want a display message.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a UI-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Service-level errors mapped from the weather crate.
    #[error("Service error: {0}")]
    Service(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Io(_) => "Could not read or write a file.",
            AppError::Service(_) => "Weather data is currently unavailable.",
            AppError::Other(_) => "Something went wrong.",
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    /// Upstream rejected the API key (401/403)
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => NetworkError::Unauthorized { status, message },
            429 => NetworkError::RateLimited,
            _ => NetworkError::ServerError { status, message },
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => "Weather service unreachable.",
            NetworkError::Timeout => "Weather service did not respond in time.",
            NetworkError::Unauthorized { .. } => "Weather API key was rejected.",
            NetworkError::RateLimited => "Weather API quota exceeded. Try again later.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "Weather service is having problems."
            }
            NetworkError::ServerError { .. } => "Weather request failed.",
            NetworkError::InvalidResponse(_) => "Weather service sent an unexpected response.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "No config file found, using defaults.",
            ConfigError::Invalid(_) => "Weather configuration is invalid.",
            ConfigError::ParseError(_) => "Config file could not be parsed.",
            ConfigError::MissingSetting(_) => "A weather setting is missing.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else if self.is_connect() {
            NetworkError::ConnectionFailed(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::from_status(status.as_u16(), self.to_string())
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}
