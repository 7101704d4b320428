//! Built-in weather sources, in fallback order.

pub mod accuweather;
pub mod openweather;
pub mod weatherapi;

pub use accuweather::AccuWeatherProvider;
pub use openweather::OpenWeatherProvider;
pub use weatherapi::WeatherApiProvider;
