//! Bounded, cancellable JSON GET shared by the geocoder and providers.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use skycast_core::{NetworkError, ReqwestErrorExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::types::WeatherError;

const USER_AGENT: &str = concat!("Skycast/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client. Per-call bounds are applied in [`get_json`].
pub fn build_client(timeout: Duration) -> Result<Client, WeatherError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| WeatherError::Client(e.to_string()))
}

/// Send `request` and decode the body.
///
/// Fails with `Timeout` after `timeout` and with `Cancelled` as soon as the
/// token fires; the in-flight request is dropped in both cases.
pub async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    timeout: Duration,
    cancellation: &CancellationToken,
) -> Result<T, WeatherError> {
    if cancellation.is_cancelled() {
        return Err(WeatherError::Cancelled);
    }

    let call = async {
        let response = request
            .send()
            .await
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_default();
            if matches!(status.as_u16(), 401 | 403 | 429) {
                tracing::warn!("Upstream responded {} {}", status.as_u16(), reason);
            }
            return Err(WeatherError::Network(NetworkError::from_status(
                status.as_u16(),
                reason,
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;
        Ok(serde_json::from_slice::<T>(&body)?)
    };

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(WeatherError::Cancelled),
        outcome = tokio::time::timeout(timeout, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(WeatherError::Timeout),
        },
    }
}

/// Deserializers that read absent, null or wrong-typed values as missing data.
pub mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(Value::deserialize(d)?.as_f64())
    }

    pub fn i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)))
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Nested object; anything that does not decode is `None`
    pub fn object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(Value::deserialize(d)?).ok())
    }

    /// Array decoded element by element, see [`items`]
    pub fn vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(items(Value::deserialize(d)?))
    }

    /// Elements of a JSON array that decode as `T`; the rest are skipped.
    /// A non-array is empty.
    pub fn items<T: DeserializeOwned>(value: Value) -> Vec<T> {
        match value {
            Value::Array(values) => values
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}
