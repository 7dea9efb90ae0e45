use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub type TenantId = i64;

/// One tenant's settings.
///
/// `enabled` is owned by the control plane; `active` is owned by the scheduler
/// and mirrors whether a collection loop is live for this id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    pub id: TenantId,
    pub api_key: String,
    #[serde(rename = "refreshInterval")]
    pub refresh_interval_secs: u64,
    #[serde(rename = "requestTimeout")]
    pub request_timeout_secs: u64,
    #[serde(rename = "enable")]
    pub enabled: bool,
    pub active: bool,
    #[serde(rename = "projectIDs")]
    pub project_ids: Vec<String>,
    #[serde(rename = "userId")]
    pub owner_user_id: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            id: 0,
            api_key: String::new(),
            refresh_interval_secs: 60,
            request_timeout_secs: 120,
            enabled: false,
            active: false,
            project_ids: Vec::new(),
            owner_user_id: None,
        }
    }
}

impl Configuration {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn snapshot(&self) -> ConfigurationSnapshot {
        ConfigurationSnapshot::from(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::validation("apiKey must not be empty"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(Error::validation("refreshInterval must be greater than zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::validation("requestTimeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Value copy of a [`Configuration`] taken at one scheduler tick.
///
/// Project ids are held as an ordered set so equality ignores insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    pub id: TenantId,
    pub api_key: String,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub enabled: bool,
    pub active: bool,
    pub project_ids: BTreeSet<String>,
    pub owner_user_id: Option<String>,
}

impl From<&Configuration> for ConfigurationSnapshot {
    fn from(config: &Configuration) -> Self {
        Self {
            id: config.id,
            api_key: config.api_key.clone(),
            refresh_interval_secs: config.refresh_interval_secs,
            request_timeout_secs: config.request_timeout_secs,
            enabled: config.enabled,
            active: config.active,
            project_ids: config.project_ids.iter().cloned().collect(),
            owner_user_id: config.owner_user_id.clone(),
        }
    }
}
