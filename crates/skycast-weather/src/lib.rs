//! Weather resolution for Skycast
//!
//! Resolves current or forecast weather for a text location or coordinate
//! through a fallback chain of providers (OpenWeather, AccuWeather,
//! WeatherAPI), with geocoding, in-memory TTL caches, per-call timeouts and
//! cancellation.

pub mod cache;
pub mod geocode;
pub mod http;
pub mod location;
pub mod nearest;
pub mod provider;
pub mod providers;
pub mod service;
pub mod store;
pub mod types;

pub use cache::TtlCache;
pub use geocode::Geocoder;
pub use location::{build_location_queries, normalize_query};
pub use nearest::pick_nearest;
pub use provider::{ProviderContext, WeatherProvider};
pub use service::WeatherService;
pub use skycast_core::ProviderKind;
pub use store::{ActiveProviderStore, InMemoryProviderStore, Subscription};
pub use types::*;
