//! Asset repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{AssetDbModel, ROLE_LEAF, ROLE_ROOT, role_columns};
use crate::domain::{Asset, NewAsset, TenantId};
use crate::{Error, Result};

/// Asset repository trait.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn get_by_external_id(&self, external_id: i64) -> Result<Asset>;
    /// Stores a new asset. Inserting an already known external id is a no-op
    /// and returns the stored record.
    async fn insert(&self, asset: &NewAsset) -> Result<Asset>;
    async fn update_location(&self, asset: &Asset) -> Result<()>;
    async fn list_roots(&self) -> Result<Vec<Asset>>;
    async fn list_leaves(&self, configuration_id: TenantId) -> Result<Vec<Asset>>;
    async fn find_root(&self, configuration_id: TenantId, project_id: &str)
    -> Result<Option<Asset>>;
}

/// SQLx implementation of AssetRepository.
pub struct SqlxAssetRepository {
    pool: SqlitePool,
}

impl SqlxAssetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_ASSET: &str = "SELECT id, configuration_id, project_id, external_id, role, \
     location_name, lat, lon FROM asset";

#[async_trait]
impl AssetRepository for SqlxAssetRepository {
    async fn get_by_external_id(&self, external_id: i64) -> Result<Asset> {
        sqlx::query_as::<_, AssetDbModel>(&format!("{SELECT_ASSET} WHERE external_id = ?"))
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Asset", external_id.to_string()))
            .and_then(Asset::try_from)
    }

    async fn insert(&self, asset: &NewAsset) -> Result<Asset> {
        let (role, name, lat, lon) = role_columns(&asset.role);
        sqlx::query(
            r#"
            INSERT INTO asset (configuration_id, project_id, external_id, role, location_name, lat, lon)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO NOTHING
            "#,
        )
        .bind(asset.configuration_id)
        .bind(&asset.project_id)
        .bind(asset.external_id)
        .bind(role)
        .bind(name)
        .bind(lat)
        .bind(lon)
        .execute(&self.pool)
        .await?;

        self.get_by_external_id(asset.external_id).await
    }

    async fn update_location(&self, asset: &Asset) -> Result<()> {
        let Some(location) = asset.location() else {
            return Err(Error::validation(format!(
                "root asset {} has no location",
                asset.external_id
            )));
        };

        let result = sqlx::query(
            "UPDATE asset SET location_name = ?, lat = ?, lon = ? WHERE external_id = ? AND role = ?",
        )
        .bind(&location.name)
        .bind(location.lat)
        .bind(location.lon)
        .bind(asset.external_id)
        .bind(ROLE_LEAF)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Asset", asset.external_id.to_string()));
        }
        Ok(())
    }

    async fn list_roots(&self) -> Result<Vec<Asset>> {
        let rows = sqlx::query_as::<_, AssetDbModel>(&format!(
            "{SELECT_ASSET} WHERE role = ? ORDER BY configuration_id, project_id"
        ))
        .bind(ROLE_ROOT)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Asset::try_from).collect()
    }

    async fn list_leaves(&self, configuration_id: TenantId) -> Result<Vec<Asset>> {
        let rows = sqlx::query_as::<_, AssetDbModel>(&format!(
            "{SELECT_ASSET} WHERE configuration_id = ? AND role = ? ORDER BY id"
        ))
        .bind(configuration_id)
        .bind(ROLE_LEAF)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Asset::try_from).collect()
    }

    async fn find_root(
        &self,
        configuration_id: TenantId,
        project_id: &str,
    ) -> Result<Option<Asset>> {
        sqlx::query_as::<_, AssetDbModel>(&format!(
            "{SELECT_ASSET} WHERE configuration_id = ? AND project_id = ? AND role = ?"
        ))
        .bind(configuration_id)
        .bind(project_id)
        .bind(ROLE_ROOT)
        .fetch_optional(&self.pool)
        .await?
        .map(Asset::try_from)
        .transpose()
    }
}
