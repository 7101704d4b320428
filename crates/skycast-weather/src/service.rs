//! Weather resolution service.
//!
//! Holds the provider fallback chain and the active provider, and exposes
//! the inbound call surface. Resolution never fails: callers get a
//! [`WeatherInfo`] or `None`.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use skycast_core::{ProviderKind, WeatherConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::geocode::Geocoder;
use crate::http::build_client;
use crate::provider::{ProviderContext, WeatherProvider};
use crate::providers::{AccuWeatherProvider, OpenWeatherProvider, WeatherApiProvider};
use crate::store::{ActiveProviderStore, Subscription};
use crate::types::{Coordinate, RequestContext, WeatherError, WeatherInfo};

pub struct WeatherService {
    /// Fixed fallback order
    providers: Vec<Arc<dyn WeatherProvider>>,
    geocoder: Option<Arc<Geocoder>>,
    active: RwLock<ProviderKind>,
    subscription: Mutex<Option<Subscription>>,
}

impl WeatherService {
    pub fn new(
        providers: Vec<Arc<dyn WeatherProvider>>,
        geocoder: Option<Arc<Geocoder>>,
        initial_active: ProviderKind,
    ) -> Self {
        Self {
            providers,
            geocoder,
            active: RwLock::new(initial_active),
            subscription: Mutex::new(None),
        }
    }

    /// Build the built-in chain (OpenWeather, AccuWeather, WeatherAPI) sharing
    /// one HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &WeatherConfig) -> Result<Arc<Self>, WeatherError> {
        let timeout = config.request_timeout();
        let client = build_client(timeout)?;

        let geocoder = Arc::new(Geocoder::new(
            client.clone(),
            config.geocoding.base_url.clone(),
            config.openweather.credential().map(str::to_string),
            timeout,
        ));

        let providers: Vec<Arc<dyn WeatherProvider>> = vec![
            Arc::new(OpenWeatherProvider::new(client.clone(), &config.openweather, timeout)),
            Arc::new(AccuWeatherProvider::new(client.clone(), &config.accuweather, timeout)),
            Arc::new(WeatherApiProvider::new(client, &config.weatherapi, timeout)),
        ];

        for kind in ProviderKind::ALL {
            if !config.provider(kind).is_configured() {
                tracing::debug!("Weather provider {} not configured, it will be skipped", kind);
            }
        }

        Ok(Arc::new(Self::new(providers, Some(geocoder), config.default_provider)))
    }

    // =========== Resolution ===========

    /// Weather for a free-text location.
    pub async fn resolve_by_location(
        &self,
        location: &str,
        target: Option<DateTime<Utc>>,
        cancellation: Option<CancellationToken>,
    ) -> Option<WeatherInfo> {
        if location.trim().is_empty() {
            return None;
        }
        let request = RequestContext::for_location(location);
        self.resolve_weather(Self::finish_request(request, target, cancellation))
            .await
    }

    /// Weather for a coordinate pair. Out-of-range coordinates yield `None`.
    pub async fn resolve_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        target: Option<DateTime<Utc>>,
        cancellation: Option<CancellationToken>,
    ) -> Option<WeatherInfo> {
        let coordinate = Coordinate::new(latitude, longitude);
        if !coordinate.is_valid() {
            tracing::debug!("Ignoring invalid coordinate ({}, {})", latitude, longitude);
            return None;
        }
        let request = RequestContext::for_coordinates(coordinate);
        self.resolve_weather(Self::finish_request(request, target, cancellation))
            .await
    }

    fn finish_request(
        mut request: RequestContext,
        target: Option<DateTime<Utc>>,
        cancellation: Option<CancellationToken>,
    ) -> RequestContext {
        if let Some(target) = target {
            request = request.at(target);
        }
        if let Some(token) = cancellation {
            request = request.with_cancellation(token);
        }
        request
    }

    /// Try the active provider, then the rest in fixed order; first answer wins.
    #[tracing::instrument(skip_all, level = "debug")]
    pub async fn resolve_weather(&self, request: RequestContext) -> Option<WeatherInfo> {
        let order = self.try_order();
        let cancellation = request.cancellation().clone();
        let ctx = ProviderContext::new(request, self.geocoder.clone());

        for provider in order {
            let kind = provider.kind();
            if cancellation.is_cancelled() {
                tracing::debug!("Weather resolution cancelled before {}", kind);
                return None;
            }

            match provider.fetch(&ctx).await {
                Ok(Some(info)) => {
                    if cancellation.is_cancelled() {
                        tracing::debug!("Discarding {} result from a cancelled call", kind);
                        return None;
                    }
                    tracing::debug!("Weather resolved by {}", kind);
                    return Some(info);
                }
                Ok(None) => tracing::debug!("{} had no answer", kind),
                Err(WeatherError::Cancelled) => {
                    tracing::debug!("Weather resolution cancelled during {}", kind);
                    return None;
                }
                Err(e) => tracing::warn!("Weather provider {} failed: {}", kind, e),
            }
        }

        tracing::debug!("No provider returned weather");
        None
    }

    fn try_order(&self) -> Vec<Arc<dyn WeatherProvider>> {
        let active = self.active_provider();
        let (mut order, rest): (Vec<_>, Vec<_>) = self
            .providers
            .iter()
            .cloned()
            .partition(|p| p.kind() == active);
        order.extend(rest);
        order
    }

    /// Provider kinds in the order the next call will try them
    pub fn provider_order(&self) -> Vec<ProviderKind> {
        self.try_order().iter().map(|p| p.kind()).collect()
    }

    // =========== Active provider ===========

    pub fn active_provider(&self) -> ProviderKind {
        *self.active.read()
    }

    /// Switch the preferred provider and flush every cache.
    pub fn set_active_provider(&self, kind: ProviderKind) {
        let previous = std::mem::replace(&mut *self.active.write(), kind);
        self.clear_caches();
        tracing::info!("Weather provider switched: {} -> {}", previous, kind);
    }

    /// Drop coordinate and provider caches
    pub fn clear_caches(&self) {
        if let Some(geocoder) = &self.geocoder {
            geocoder.clear();
        }
        for provider in &self.providers {
            provider.clear_cache();
        }
    }

    // =========== Lifecycle ===========

    /// Follow `store`: adopt its current provider and react to every switch.
    ///
    /// Replaces any earlier subscription. The store only holds a weak
    /// reference to the service.
    pub fn start(self: &Arc<Self>, store: &dyn ActiveProviderStore) {
        let service = Arc::downgrade(self);
        let subscription = store.subscribe(Box::new(move |kind| {
            if let Some(service) = service.upgrade() {
                service.set_active_provider(kind);
            }
        }));

        *self.active.write() = store.current_provider();

        let previous = self.subscription.lock().replace(subscription);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        tracing::debug!("Weather service following provider store ({})", self.active_provider());
    }

    /// Stop reacting to store notifications
    pub fn stop(&self) {
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            tracing::debug!("Weather service stopped following provider store");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::store::InMemoryProviderStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behavior {
        Fail,
        Nothing,
        Answer(f64),
        CancelThenAnswer,
        Cancelled,
    }

    struct MockProvider {
        kind: ProviderKind,
        behavior: Behavior,
        log: Arc<Mutex<Vec<ProviderKind>>>,
        cleared: AtomicUsize,
    }

    #[async_trait]
    impl WeatherProvider for MockProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn fetch(&self, ctx: &ProviderContext) -> Result<Option<WeatherInfo>, WeatherError> {
            self.log.lock().push(self.kind);
            match self.behavior {
                Behavior::Fail => Err(WeatherError::Parse("boom".into())),
                Behavior::Nothing => Ok(None),
                Behavior::Answer(c) => Ok(Some(WeatherInfo::from_celsius(Some(c), None))),
                Behavior::CancelThenAnswer => {
                    ctx.cancellation().cancel();
                    Ok(Some(WeatherInfo::from_celsius(Some(1.0), None)))
                }
                Behavior::Cancelled => Err(WeatherError::Cancelled),
            }
        }

        fn clear_cache(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        service: Arc<WeatherService>,
        mocks: Vec<Arc<MockProvider>>,
        log: Arc<Mutex<Vec<ProviderKind>>>,
    }

    fn harness(behaviors: [Behavior; 3], active: ProviderKind) -> Harness {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mocks: Vec<Arc<MockProvider>> = ProviderKind::ALL
            .into_iter()
            .zip(behaviors)
            .map(|(kind, behavior)| {
                Arc::new(MockProvider {
                    kind,
                    behavior,
                    log: log.clone(),
                    cleared: AtomicUsize::new(0),
                })
            })
            .collect();
        let providers = mocks
            .iter()
            .map(|m| m.clone() as Arc<dyn WeatherProvider>)
            .collect();
        Harness {
            service: Arc::new(WeatherService::new(providers, None, active)),
            mocks,
            log,
        }
    }

    fn coords() -> RequestContext {
        RequestContext::for_coordinates(Coordinate::new(10.0, 20.0))
    }

    #[tokio::test]
    async fn test_error_and_none_fall_through() {
        let h = harness(
            [Behavior::Fail, Behavior::Nothing, Behavior::Answer(21.0)],
            ProviderKind::OpenWeather,
        );
        let info = h.service.resolve_weather(coords()).await.unwrap();
        assert_eq!(info.temperature_c, Some(21.0));
        assert_eq!(
            *h.log.lock(),
            vec![ProviderKind::OpenWeather, ProviderKind::AccuWeather, ProviderKind::WeatherApi]
        );
    }

    #[tokio::test]
    async fn test_active_provider_tried_first() {
        let h = harness(
            [Behavior::Answer(1.0), Behavior::Answer(2.0), Behavior::Answer(3.0)],
            ProviderKind::WeatherApi,
        );
        let info = h.service.resolve_weather(coords()).await.unwrap();
        assert_eq!(info.temperature_c, Some(3.0));
        assert_eq!(*h.log.lock(), vec![ProviderKind::WeatherApi]);
    }

    #[tokio::test]
    async fn test_remaining_order_is_fixed() {
        let h = harness(
            [Behavior::Nothing, Behavior::Nothing, Behavior::Nothing],
            ProviderKind::AccuWeather,
        );
        assert!(h.service.resolve_weather(coords()).await.is_none());
        assert_eq!(
            *h.log.lock(),
            vec![ProviderKind::AccuWeather, ProviderKind::OpenWeather, ProviderKind::WeatherApi]
        );
        assert_eq!(h.service.provider_order(), *h.log.lock());
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_providers() {
        let h = harness(
            [Behavior::Answer(1.0), Behavior::Answer(2.0), Behavior::Answer(3.0)],
            ProviderKind::OpenWeather,
        );
        let token = CancellationToken::new();
        token.cancel();
        assert!(h.service.resolve_weather(coords().with_cancellation(token)).await.is_none());
        assert!(h.log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_result_after_cancellation_is_discarded() {
        let h = harness(
            [Behavior::CancelThenAnswer, Behavior::Answer(2.0), Behavior::Answer(3.0)],
            ProviderKind::OpenWeather,
        );
        assert!(h.service.resolve_weather(coords()).await.is_none());
        assert_eq!(*h.log.lock(), vec![ProviderKind::OpenWeather]);
    }

    #[tokio::test]
    async fn test_cancelled_provider_stops_chain() {
        let h = harness(
            [Behavior::Cancelled, Behavior::Answer(2.0), Behavior::Answer(3.0)],
            ProviderKind::OpenWeather,
        );
        assert!(h.service.resolve_weather(coords()).await.is_none());
        assert_eq!(h.log.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_short_circuits() {
        let h = harness(
            [Behavior::Answer(1.0), Behavior::Answer(2.0), Behavior::Answer(3.0)],
            ProviderKind::OpenWeather,
        );
        assert!(h.service.resolve_by_coordinates(120.0, 0.0, None, None).await.is_none());
        assert!(h.service.resolve_by_coordinates(f64::NAN, 0.0, None, None).await.is_none());
        assert!(h.service.resolve_by_location("   ", None, None).await.is_none());
        assert!(h.log.lock().is_empty());

        let info = h.service.resolve_by_location("Paris", None, None).await.unwrap();
        assert_eq!(info.temperature_c, Some(1.0));
    }

    #[tokio::test]
    async fn test_store_switch_updates_active_and_clears_caches() {
        let h = harness(
            [Behavior::Answer(1.0), Behavior::Answer(2.0), Behavior::Answer(3.0)],
            ProviderKind::OpenWeather,
        );
        let store = InMemoryProviderStore::new(ProviderKind::AccuWeather);
        h.service.start(&store);
        assert_eq!(h.service.active_provider(), ProviderKind::AccuWeather);

        store.set_provider(ProviderKind::WeatherApi);
        assert_eq!(h.service.active_provider(), ProviderKind::WeatherApi);
        assert!(h.mocks.iter().all(|m| m.cleared.load(Ordering::SeqCst) == 1));

        let info = h.service.resolve_weather(coords()).await.unwrap();
        assert_eq!(info.temperature_c, Some(3.0));
    }

    #[test]
    fn test_start_twice_keeps_one_subscription() {
        let h = harness(
            [Behavior::Nothing, Behavior::Nothing, Behavior::Nothing],
            ProviderKind::OpenWeather,
        );
        let store = InMemoryProviderStore::default();
        h.service.start(&store);
        h.service.start(&store);
        assert_eq!(store.listener_count(), 1);

        store.set_provider(ProviderKind::WeatherApi);
        assert!(h.mocks.iter().all(|m| m.cleared.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_stop_ignores_later_switches() {
        let h = harness(
            [Behavior::Nothing, Behavior::Nothing, Behavior::Nothing],
            ProviderKind::OpenWeather,
        );
        let store = InMemoryProviderStore::default();
        h.service.start(&store);
        h.service.stop();
        assert_eq!(store.listener_count(), 0);

        store.set_provider(ProviderKind::WeatherApi);
        assert_eq!(h.service.active_provider(), ProviderKind::OpenWeather);
        assert!(h.mocks.iter().all(|m| m.cleared.load(Ordering::SeqCst) == 0));
    }

    #[test]
    fn test_dropping_service_releases_subscription() {
        let h = harness(
            [Behavior::Nothing, Behavior::Nothing, Behavior::Nothing],
            ProviderKind::OpenWeather,
        );
        let store = InMemoryProviderStore::default();
        h.service.start(&store);
        drop(h);
        assert_eq!(store.listener_count(), 0);
        store.set_provider(ProviderKind::AccuWeather);
    }

    #[test]
    fn test_from_config_builds_fixed_chain() {
        let mut config = WeatherConfig::default();
        config.default_provider = ProviderKind::WeatherApi;
        let service = WeatherService::from_config(&config).unwrap();
        assert_eq!(service.active_provider(), ProviderKind::WeatherApi);
        assert_eq!(
            service.provider_order(),
            vec![ProviderKind::WeatherApi, ProviderKind::OpenWeather, ProviderKind::AccuWeather]
        );
    }
}
