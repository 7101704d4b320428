//! Provider capability shared by every weather source.

use async_trait::async_trait;
use skycast_core::ProviderKind;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::geocode::Geocoder;
use crate::types::{Coordinate, RequestContext, WeatherError, WeatherInfo};

/// A weather source tried by the orchestrator.
///
/// `Ok(None)` means "no answer"; an `Err` is logged by the orchestrator and
/// treated the same way.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn fetch(&self, ctx: &ProviderContext) -> Result<Option<WeatherInfo>, WeatherError>;

    /// Drop every cached response
    fn clear_cache(&self) {}
}

/// Per-call view handed to providers.
///
/// Coordinates are resolved lazily and at most once per call, then shared by
/// every provider in the fallback chain.
pub struct ProviderContext {
    request: RequestContext,
    geocoder: Option<Arc<Geocoder>>,
    coordinates: OnceCell<Option<Coordinate>>,
}

impl ProviderContext {
    pub fn new(request: RequestContext, geocoder: Option<Arc<Geocoder>>) -> Self {
        Self {
            request,
            geocoder,
            coordinates: OnceCell::new(),
        }
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn raw_location(&self) -> Option<&str> {
        self.request.raw_location()
    }

    /// Coordinates supplied by the caller, without geocoding
    pub fn supplied_coordinates(&self) -> Option<Coordinate> {
        self.request.coordinates()
    }

    pub fn target_timestamp_ms(&self) -> i64 {
        self.request.target_timestamp_ms()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.request.cancellation()
    }

    /// Caller-supplied coordinates, else the geocoded text location (memoized).
    pub async fn ensure_coordinates(&self) -> Option<Coordinate> {
        if let Some(coordinates) = self.request.coordinates() {
            return Some(coordinates);
        }

        *self
            .coordinates
            .get_or_init(|| async {
                match (self.request.raw_location(), &self.geocoder) {
                    (Some(location), Some(geocoder)) => {
                        geocoder.geocode(location, self.request.cancellation()).await
                    }
                    _ => None,
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::http::build_client;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_supplied_coordinates_skip_geocoding() {
        let ctx = ProviderContext::new(
            RequestContext::for_coordinates(Coordinate::new(1.0, 2.0)),
            None,
        );
        assert_eq!(ctx.ensure_coordinates().await, Some(Coordinate::new(1.0, 2.0)));
    }

    #[tokio::test]
    async fn test_ensure_coordinates_geocodes_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"lat": 48.85, "lon": 2.35}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = Arc::new(Geocoder::new(
            build_client(Duration::from_secs(5)).unwrap(),
            server.uri(),
            Some("key".into()),
            Duration::from_secs(2),
        ));
        let ctx = ProviderContext::new(
            RequestContext::for_location("Paris"),
            Some(geocoder.clone()),
        );

        assert_eq!(ctx.ensure_coordinates().await, Some(Coordinate::new(48.85, 2.35)));
        // a cleared geocoder cache does not matter within the same call
        geocoder.clear();
        assert_eq!(ctx.ensure_coordinates().await, Some(Coordinate::new(48.85, 2.35)));
    }

    #[tokio::test]
    async fn test_failed_resolution_is_memoized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = Arc::new(Geocoder::new(
            build_client(Duration::from_secs(5)).unwrap(),
            server.uri(),
            Some("key".into()),
            Duration::from_secs(2),
        ));
        let ctx = ProviderContext::new(RequestContext::for_location("Atlantis"), Some(geocoder));

        assert_eq!(ctx.ensure_coordinates().await, None);
        assert_eq!(ctx.ensure_coordinates().await, None);
    }
}
