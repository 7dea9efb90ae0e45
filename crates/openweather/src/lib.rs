//! Client for the OpenWeather geocoding and One Call 3.0 endpoints.
//!
//! Only the calls needed to resolve a place name to coordinates and to read
//! the current conditions for a coordinate pair are implemented.

pub mod client;
pub mod error;
pub mod models;

pub use client::{ClientOptions, OpenWeatherClient, install_rustls_provider};
pub use error::OpenWeatherError;
pub use models::{CurrentConditions, Geolocation, WeatherCondition, WeatherData};
