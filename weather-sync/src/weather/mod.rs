//! Weather and geocoding provider seam.
//!
//! The scheduler and listener only see [`WeatherProvider`]; the production
//! implementation delegates to [`openweather::OpenWeatherClient`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use openweather::{CurrentConditions, Geolocation, OpenWeatherClient, OpenWeatherError};
use serde_json::Value;

use crate::{Error, Result};

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn geocode(&self, name: &str, api_key: &str) -> Result<Vec<Geolocation>>;
    async fn fetch_current(&self, lat: f64, lon: f64, api_key: &str) -> Result<CurrentConditions>;
    async fn test_authentication(&self, api_key: &str) -> Result<()>;
}

/// First geocoding hit for `name`.
pub async fn locate<P: WeatherProvider + ?Sized>(
    provider: &P,
    name: &str,
    api_key: &str,
) -> Result<Geolocation> {
    provider
        .geocode(name, api_key)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("Location", name))
}

/// Canonical display name written back to the platform.
///
/// Always `name, state, country`; an empty state leaves two adjacent commas.
pub fn format_location_name(location: &Geolocation) -> String {
    format!("{}, {}, {}", location.name, location.state, location.country)
}

/// Fields upserted for each reading.
pub fn weather_fields(current: &CurrentConditions) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("temperature".to_string(), Value::from(current.temp)),
        ("feels_like".to_string(), Value::from(current.feels_like)),
        ("pressure".to_string(), Value::from(current.pressure)),
        ("humidity".to_string(), Value::from(current.humidity)),
        ("dew_point".to_string(), Value::from(current.dew_point)),
        ("uvi".to_string(), Value::from(current.uvi)),
        ("clouds".to_string(), Value::from(current.clouds)),
        ("wind_speed".to_string(), Value::from(current.wind_speed)),
        ("wind_deg".to_string(), Value::from(current.wind_deg)),
    ])
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn geocode(&self, name: &str, api_key: &str) -> Result<Vec<Geolocation>> {
        OpenWeatherClient::geocode(self, name, api_key)
            .await
            .map_err(classify)
    }

    async fn fetch_current(&self, lat: f64, lon: f64, api_key: &str) -> Result<CurrentConditions> {
        self.one_call(lat, lon, api_key)
            .await
            .map(|data| data.current)
            .map_err(classify)
    }

    async fn test_authentication(&self, api_key: &str) -> Result<()> {
        OpenWeatherClient::test_authentication(self, api_key)
            .await
            .map_err(classify)
    }
}

fn classify(err: OpenWeatherError) -> Error {
    match err {
        OpenWeatherError::LocationNotFound(name) => Error::not_found("Location", name),
        other => Error::Weather(other),
    }
}
