//! Configuration database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::Configuration;
use crate::{Error, Result};

/// Row of the `configuration` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ConfigurationDbModel {
    pub id: i64,
    pub api_key: String,
    pub refresh_interval_secs: i64,
    pub request_timeout_secs: i64,
    pub enabled: bool,
    pub active: bool,
    /// JSON array of project ids.
    pub project_ids: String,
    pub owner_user_id: Option<String>,
}

impl TryFrom<ConfigurationDbModel> for Configuration {
    type Error = Error;

    fn try_from(row: ConfigurationDbModel) -> Result<Self> {
        let project_ids: Vec<String> = serde_json::from_str(&row.project_ids)?;
        Ok(Configuration {
            id: row.id,
            api_key: row.api_key,
            refresh_interval_secs: u64::try_from(row.refresh_interval_secs).unwrap_or(0),
            request_timeout_secs: u64::try_from(row.request_timeout_secs).unwrap_or(0),
            enabled: row.enabled,
            active: row.active,
            project_ids,
            owner_user_id: row.owner_user_id,
        })
    }
}

impl ConfigurationDbModel {
    pub fn from_domain(config: &Configuration) -> Result<Self> {
        Ok(Self {
            id: config.id,
            api_key: config.api_key.clone(),
            refresh_interval_secs: i64::try_from(config.refresh_interval_secs)
                .map_err(|_| Error::validation("refreshInterval out of range"))?,
            request_timeout_secs: i64::try_from(config.request_timeout_secs)
                .map_err(|_| Error::validation("requestTimeout out of range"))?,
            enabled: config.enabled,
            active: config.active,
            project_ids: serde_json::to_string(&config.project_ids)?,
            owner_user_id: config.owner_user_id.clone(),
        })
    }
}
