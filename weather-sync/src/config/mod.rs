//! Process settings read from the environment.
//!
//! `.env` files are honoured through `dotenvy` before the environment is read.

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:weather-sync.db?mode=rwc";
pub const DEFAULT_CLIENT_REFERENCE: &str = "weather-sync";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL of the platform REST API.
    pub api_endpoint: String,
    pub api_token: String,
    /// Origin tag stamped on every upsert, used to recognise echoes.
    pub client_reference: String,
    pub bind_address: String,
    pub port: u16,
    pub scheduler_tick: Duration,
    pub heartbeat_interval: Duration,
    pub listener_max_backoff: Duration,
    pub openweather_geo_url: String,
    pub openweather_one_call_url: String,
    pub log_dir: Option<PathBuf>,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            api_endpoint: String::new(),
            api_token: String::new(),
            client_reference: DEFAULT_CLIENT_REFERENCE.to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            scheduler_tick: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(120),
            listener_max_backoff: Duration::from_secs(60),
            openweather_geo_url: openweather::client::DEFAULT_GEO_URL.to_string(),
            openweather_one_call_url: openweather::client::DEFAULT_ONE_CALL_URL.to_string(),
            log_dir: None,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Loads `.env` (if present) and then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }

        config.api_endpoint = get("API_ENDPOINT")
            .map(|v| v.trim_end_matches('/').to_string())
            .ok_or_else(|| Error::config("API_ENDPOINT is not set"))?;
        config.api_token = get("API_TOKEN").ok_or_else(|| Error::config("API_TOKEN is not set"))?;

        if let Some(reference) = get("CLIENT_REFERENCE") {
            config.client_reference = reference;
        }
        if let Some(addr) = get("API_BIND_ADDRESS") {
            config.bind_address = addr;
        }
        if let Some(port) = get("API_SERVER_PORT") {
            config.port = parse_number("API_SERVER_PORT", &port)?;
        }
        if let Some(secs) = get("SCHEDULER_TICK_SECS") {
            config.scheduler_tick = parse_secs("SCHEDULER_TICK_SECS", &secs)?;
        }
        if let Some(secs) = get("HEARTBEAT_INTERVAL_SECS") {
            config.heartbeat_interval = parse_secs("HEARTBEAT_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = get("LISTENER_MAX_BACKOFF_SECS") {
            config.listener_max_backoff = parse_secs("LISTENER_MAX_BACKOFF_SECS", &secs)?;
        }
        if let Some(url) = get("OPENWEATHER_GEO_URL") {
            config.openweather_geo_url = url;
        }
        if let Some(url) = get("OPENWEATHER_DATA_URL") {
            config.openweather_one_call_url = url;
        }

        config.log_dir = get("LOG_DIR").map(PathBuf::from);
        config.log_json = get("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));

        Ok(config)
    }

    /// URL of the platform's property change stream.
    pub fn listener_url(&self) -> String {
        let ws_base = if let Some(rest) = self.api_endpoint.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.api_endpoint.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.api_endpoint.clone()
        };
        format!("{ws_base}/data-listener?dataSubtype=property")
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key} must be a number, got {value:?}")))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs: u64 = parse_number(key, value)?;
    if secs == 0 {
        return Err(Error::config(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}
