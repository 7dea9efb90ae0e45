//! Building-management platform collaborators.
//!
//! [`PlatformApi`] covers the REST calls (data upserts, asset lookup and
//! creation, user notifications); [`PushSource`] yields the stream of
//! property changes the event listener reconciles.

pub mod http;
pub mod push;

pub use http::HttpPlatformClient;
pub use push::{NotificationStream, PushSource, WebSocketPushSource};

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Asset type the listener accepts for new location assets.
pub const MANAGED_ASSET_TYPE: &str = "weather_app_weather";
/// Asset type and global identifier of the per-project root.
pub const ROOT_ASSET_TYPE: &str = "weather_app_root";
pub const ROOT_ASSET_NAME: &str = "weather_app";
pub const ROOT_ASSET_DESCRIPTION: &str = "Root asset for Weather App";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSubtype {
    Input,
    Output,
    Property,
    Status,
    Info,
}

/// One upsert of asset data. The client reference is stamped by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    pub asset_id: i64,
    pub subtype: DataSubtype,
    pub timestamp: DateTime<Utc>,
    pub data: BTreeMap<String, Value>,
}

impl DataRecord {
    pub fn new(asset_id: i64, subtype: DataSubtype, data: BTreeMap<String, Value>) -> Self {
        Self {
            asset_id,
            subtype,
            timestamp: Utc::now(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAsset {
    pub id: i64,
    pub project_id: String,
    pub asset_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetRequest {
    pub project_id: String,
    pub global_asset_identifier: String,
    pub name: String,
    pub asset_type: String,
    pub description: String,
}

impl CreateAssetRequest {
    pub fn root(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            global_asset_identifier: ROOT_ASSET_TYPE.to_string(),
            name: ROOT_ASSET_NAME.to_string(),
            asset_type: ROOT_ASSET_TYPE.to_string(),
            description: ROOT_ASSET_DESCRIPTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub de: String,
    pub en: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    pub user: String,
    pub project_id: String,
    pub message: Translation,
}

impl UserNotification {
    pub fn assets_created(user: &str, project_id: &str, count: usize) -> Self {
        Self {
            user: user.to_string(),
            project_id: project_id.to_string(),
            message: Translation {
                de: format!(
                    "Weather App hat {count} neue Assets angelegt. Diese sind nun im Asset-Management verfügbar."
                ),
                en: format!(
                    "Weather app added {count} new assets. They are now available in Asset Management."
                ),
            },
        }
    }
}

/// A property change pushed by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub asset_id: i64,
    pub subtype: DataSubtype,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
    #[serde(default)]
    pub client_reference: Option<String>,
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn upsert_data(&self, record: &DataRecord) -> Result<()>;
    async fn get_asset(&self, asset_id: i64) -> Result<PlatformAsset>;
    /// Creates (or returns the existing) asset, yielding its platform id.
    async fn create_asset(&self, request: &CreateAssetRequest) -> Result<i64>;
    async fn notify_user(&self, notification: &UserNotification) -> Result<()>;
}
