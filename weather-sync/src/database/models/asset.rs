//! Asset database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{Asset, AssetRole, Location};
use crate::{Error, Result};

pub const ROLE_ROOT: &str = "root";
pub const ROLE_LEAF: &str = "leaf";

/// Row of the `asset` table. Location columns are only set for leaves.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AssetDbModel {
    pub id: i64,
    pub configuration_id: i64,
    pub project_id: String,
    pub external_id: i64,
    pub role: String,
    pub location_name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl TryFrom<AssetDbModel> for Asset {
    type Error = Error;

    fn try_from(row: AssetDbModel) -> Result<Self> {
        let role = match (row.role.as_str(), row.location_name, row.lat, row.lon) {
            (ROLE_ROOT, ..) => AssetRole::Root,
            (ROLE_LEAF, Some(name), Some(lat), Some(lon)) => {
                AssetRole::Leaf(Location { name, lat, lon })
            }
            (role, ..) => {
                return Err(Error::validation(format!(
                    "asset {} has invalid role data ({role})",
                    row.id
                )));
            }
        };

        Ok(Asset {
            id: row.id,
            configuration_id: row.configuration_id,
            project_id: row.project_id,
            external_id: row.external_id,
            role,
        })
    }
}

/// Splits a role into its column values.
pub fn role_columns(role: &AssetRole) -> (&'static str, Option<&str>, Option<f64>, Option<f64>) {
    match role {
        AssetRole::Root => (ROLE_ROOT, None, None, None),
        AssetRole::Leaf(location) => (
            ROLE_LEAF,
            Some(location.name.as_str()),
            Some(location.lat),
            Some(location.lon),
        ),
    }
}
