//! Configuration repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ConfigurationDbModel;
use crate::domain::{Configuration, TenantId};
use crate::{Error, Result};

/// Configuration repository trait.
#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Configuration>>;
    async fn get(&self, id: TenantId) -> Result<Configuration>;
    /// Inserts when `config.id` is 0 or unknown, updates otherwise.
    /// The stored `active` flag is never overwritten here.
    async fn upsert(&self, config: &Configuration) -> Result<Configuration>;
    async fn set_active(&self, id: TenantId, active: bool) -> Result<()>;
    async fn delete(&self, id: TenantId) -> Result<()>;
}

/// SQLx implementation of ConfigurationRepository.
pub struct SqlxConfigurationRepository {
    pool: SqlitePool,
}

impl SqlxConfigurationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_CONFIGURATION: &str = "SELECT id, api_key, refresh_interval_secs, request_timeout_secs, \
     enabled, active, project_ids, owner_user_id FROM configuration";

#[async_trait]
impl ConfigurationRepository for SqlxConfigurationRepository {
    async fn list(&self) -> Result<Vec<Configuration>> {
        let rows = sqlx::query_as::<_, ConfigurationDbModel>(&format!(
            "{SELECT_CONFIGURATION} ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Configuration::try_from).collect()
    }

    async fn get(&self, id: TenantId) -> Result<Configuration> {
        sqlx::query_as::<_, ConfigurationDbModel>(&format!("{SELECT_CONFIGURATION} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Configuration", id.to_string()))
            .and_then(Configuration::try_from)
    }

    async fn upsert(&self, config: &Configuration) -> Result<Configuration> {
        let row = ConfigurationDbModel::from_domain(config)?;

        let id: i64 = if row.id == 0 {
            sqlx::query_scalar(
                r#"
                INSERT INTO configuration (
                    api_key, refresh_interval_secs, request_timeout_secs,
                    enabled, project_ids, owner_user_id
                ) VALUES (?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(&row.api_key)
            .bind(row.refresh_interval_secs)
            .bind(row.request_timeout_secs)
            .bind(row.enabled)
            .bind(&row.project_ids)
            .bind(&row.owner_user_id)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                INSERT INTO configuration (
                    id, api_key, refresh_interval_secs, request_timeout_secs,
                    enabled, project_ids, owner_user_id
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    api_key = excluded.api_key,
                    refresh_interval_secs = excluded.refresh_interval_secs,
                    request_timeout_secs = excluded.request_timeout_secs,
                    enabled = excluded.enabled,
                    project_ids = excluded.project_ids,
                    owner_user_id = excluded.owner_user_id,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(row.id)
            .bind(&row.api_key)
            .bind(row.refresh_interval_secs)
            .bind(row.request_timeout_secs)
            .bind(row.enabled)
            .bind(&row.project_ids)
            .bind(&row.owner_user_id)
            .execute(&self.pool)
            .await?;
            row.id
        };

        self.get(id).await
    }

    async fn set_active(&self, id: TenantId, active: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE configuration SET active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(active)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Configuration", id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: TenantId) -> Result<()> {
        let result = sqlx::query("DELETE FROM configuration WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Configuration", id.to_string()));
        }
        Ok(())
    }
}
