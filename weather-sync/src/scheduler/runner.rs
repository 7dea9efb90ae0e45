//! One collection cycle for one tenant.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::AssetRepository;
use crate::domain::{AssetRole, Configuration, NewAsset};
use crate::platform::{CreateAssetRequest, DataRecord, DataSubtype, PlatformApi, UserNotification};
use crate::weather::{WeatherProvider, weather_fields};
use crate::{Error, Result};

/// Work the tenant scheduler drives each cycle.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Makes sure every project of the tenant has a root asset.
    async fn ensure_root(&self, config: &Configuration) -> Result<()>;

    /// Fetches and upserts weather for every location of the tenant.
    /// Cancelling `cancel` aborts the outstanding requests.
    async fn collect(&self, config: &Configuration, cancel: &CancellationToken) -> Result<()>;
}

pub struct CollectionRunner {
    assets: Arc<dyn AssetRepository>,
    weather: Arc<dyn WeatherProvider>,
    platform: Arc<dyn PlatformApi>,
}

impl CollectionRunner {
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        weather: Arc<dyn WeatherProvider>,
        platform: Arc<dyn PlatformApi>,
    ) -> Self {
        Self {
            assets,
            weather,
            platform,
        }
    }
}

#[async_trait]
impl Collector for CollectionRunner {
    async fn ensure_root(&self, config: &Configuration) -> Result<()> {
        for project_id in &config.project_ids {
            if self.assets.find_root(config.id, project_id).await?.is_some() {
                continue;
            }

            let external_id = self
                .platform
                .create_asset(&CreateAssetRequest::root(project_id))
                .await?;
            self.assets
                .insert(&NewAsset {
                    configuration_id: config.id,
                    project_id: project_id.clone(),
                    external_id,
                    role: AssetRole::Root,
                })
                .await?;
            info!(
                tenant_id = config.id,
                project_id = %project_id,
                external_id,
                "Root asset created"
            );

            // The user notification is informational only.
            if let Some(user) = &config.owner_user_id {
                let notification = UserNotification::assets_created(user, project_id, 1);
                if let Err(e) = self.platform.notify_user(&notification).await {
                    warn!(tenant_id = config.id, error = %e, "Failed to notify user about new assets");
                }
            }
        }
        Ok(())
    }

    async fn collect(&self, config: &Configuration, cancel: &CancellationToken) -> Result<()> {
        let leaves = self.assets.list_leaves(config.id).await?;
        if leaves.is_empty() {
            debug!(tenant_id = config.id, "No locations to collect");
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for asset in leaves {
            let Some(location) = asset.location().cloned() else {
                continue;
            };
            let weather = Arc::clone(&self.weather);
            let platform = Arc::clone(&self.platform);
            let api_key = config.api_key.clone();
            let timeout = config.request_timeout();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let work = async {
                    let current = weather
                        .fetch_current(location.lat, location.lon, &api_key)
                        .await?;
                    let record = DataRecord::new(
                        asset.external_id,
                        DataSubtype::Input,
                        weather_fields(&current),
                    );
                    platform.upsert_data(&record).await
                };

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::transient("collection cancelled")),
                    result = tokio::time::timeout(timeout, work) => match result {
                        Ok(inner) => inner,
                        Err(elapsed) => Err(elapsed.into()),
                    },
                };
                result.map_err(|e| (asset.external_id, e))
            });
        }

        let mut upserted = 0usize;
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => upserted += 1,
                Ok(Err((external_id, e))) => {
                    if first_error.is_none() {
                        warn!(
                            tenant_id = config.id,
                            external_id,
                            error = %e,
                            "Collection failed; cancelling remaining requests"
                        );
                        cancel.cancel();
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        cancel.cancel();
                        first_error = Some(Error::Other(format!(
                            "collection task failed: {join_err}"
                        )));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(tenant_id = config.id, upserted, "Collection cycle finished");
                Ok(())
            }
        }
    }
}
