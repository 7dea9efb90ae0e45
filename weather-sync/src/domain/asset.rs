use serde::{Deserialize, Serialize};

use super::TenantId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Role of a synced asset.
///
/// The root carries heartbeat status for one project; leaves carry a
/// resolved location and receive weather readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum AssetRole {
    Root,
    Leaf(Location),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub configuration_id: TenantId,
    pub project_id: String,
    /// Identifier of the asset on the platform.
    pub external_id: i64,
    pub role: AssetRole,
}

impl Asset {
    pub fn is_root(&self) -> bool {
        matches!(self.role, AssetRole::Root)
    }

    pub fn location(&self) -> Option<&Location> {
        match &self.role {
            AssetRole::Leaf(location) => Some(location),
            AssetRole::Root => None,
        }
    }
}

/// An asset that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub configuration_id: TenantId,
    pub project_id: String,
    pub external_id: i64,
    pub role: AssetRole,
}
