use std::{sync::OnceLock, time::Duration};

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::OpenWeatherError;
use crate::models::{Geolocation, WeatherData};

pub const DEFAULT_GEO_URL: &str = "http://api.openweathermap.org/geo/1.0/direct";
pub const DEFAULT_ONE_CALL_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";

/// City used to check whether an API key is accepted.
pub const AUTH_PROBE_LOCATION: &str = "Winterthur";

const GEOCODE_LIMIT: &str = "10";
const ONE_CALL_EXCLUDE: &str = "minutely,hourly,daily,alerts";

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub geo_url: String,
    pub one_call_url: String,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            geo_url: DEFAULT_GEO_URL.to_string(),
            one_call_url: DEFAULT_ONE_CALL_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    geo_url: Url,
    one_call_url: Url,
}

impl OpenWeatherClient {
    pub fn new(options: ClientOptions) -> Result<Self, OpenWeatherError> {
        install_rustls_provider();

        let mut builder = Client::builder();
        if options.timeout > Duration::ZERO {
            builder = builder.timeout(options.timeout);
        }

        Ok(Self {
            client: builder.build()?,
            geo_url: Url::parse(&options.geo_url)?,
            one_call_url: Url::parse(&options.one_call_url)?,
        })
    }

    /// Resolves a free-form place name to candidate locations.
    pub async fn geocode(
        &self,
        query: &str,
        api_key: &str,
    ) -> Result<Vec<Geolocation>, OpenWeatherError> {
        let mut url = self.geo_url.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", GEOCODE_LIMIT)
            .append_pair("appid", api_key);

        trace!(query, "geocoding location");
        self.get_json(url).await
    }

    /// First geocoding hit for `query`, or [`OpenWeatherError::LocationNotFound`].
    pub async fn locate(
        &self,
        query: &str,
        api_key: &str,
    ) -> Result<Geolocation, OpenWeatherError> {
        self.geocode(query, api_key)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OpenWeatherError::LocationNotFound(query.to_string()))
    }

    /// Current conditions for a coordinate pair in metric units.
    pub async fn one_call(
        &self,
        lat: f64,
        lon: f64,
        api_key: &str,
    ) -> Result<WeatherData, OpenWeatherError> {
        let mut url = self.one_call_url.clone();
        url.query_pairs_mut()
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &lon.to_string())
            .append_pair("exclude", ONE_CALL_EXCLUDE)
            .append_pair("units", "metric")
            .append_pair("appid", api_key);

        trace!(lat, lon, "fetching current weather");
        self.get_json(url).await
    }

    /// Checks that `api_key` is accepted by geocoding a known city.
    pub async fn test_authentication(&self, api_key: &str) -> Result<(), OpenWeatherError> {
        self.geocode(AUTH_PROBE_LOCATION, api_key).await.map(|_| ())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, OpenWeatherError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenWeatherError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
