//! Reconciliation of platform property changes.
//!
//! The platform pushes a notification whenever an asset property changes.
//! Users create a location asset and type a place name into it; the
//! listener resolves that name, writes the canonical name back and stores
//! the coordinates so the tenant's next cycle collects weather for it.

mod backoff;
mod supervisor;

pub use backoff::{BackoffConfig, ReconnectBackoff};
pub use supervisor::ListenerSupervisor;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::database::{AssetRepository, ConfigurationRepository};
use crate::domain::{Asset, AssetRole, Configuration, Location, NewAsset, ProcessStatus, StatusHandle, TenantId};
use crate::platform::{
    ChangeNotification, DataRecord, DataSubtype, MANAGED_ASSET_TYPE, NotificationStream, PlatformApi,
};
use crate::scheduler::ReloadTrigger;
use crate::weather::{WeatherProvider, format_location_name, locate};
use crate::{Error, Result};

/// Property carrying the user-entered place name.
pub const LOCATION_PROPERTY: &str = "name";

/// What [`EventListener::handle`] did with a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Caused by this process's own write; ignored.
    Echo,
    Created { tenant_id: TenantId, external_id: i64 },
    Updated { tenant_id: TenantId, external_id: i64 },
    /// Not actionable (foreign asset type, missing name, unknown place...).
    Skipped(String),
    /// A collaborator call failed; the notification is dropped.
    Failed(String),
}

pub struct EventListener {
    assets: Arc<dyn AssetRepository>,
    configs: Arc<dyn ConfigurationRepository>,
    platform: Arc<dyn PlatformApi>,
    weather: Arc<dyn WeatherProvider>,
    reload: ReloadTrigger,
    status: StatusHandle,
    client_reference: String,
}

impl EventListener {
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        configs: Arc<dyn ConfigurationRepository>,
        platform: Arc<dyn PlatformApi>,
        weather: Arc<dyn WeatherProvider>,
        reload: ReloadTrigger,
        status: StatusHandle,
        client_reference: impl Into<String>,
    ) -> Self {
        Self {
            assets,
            configs,
            platform,
            weather,
            reload,
            status,
            client_reference: client_reference.into(),
        }
    }

    /// Consumes `stream` until it fails, ends or `cancel` fires.
    ///
    /// Returns `Ok` only on cancellation. A stream error, the end of the
    /// stream or a failed asset lookup report [`ProcessStatus::Error`] and
    /// end the listener.
    pub async fn run(
        &self,
        mut stream: NotificationStream,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = stream.next() => next,
            };

            let notification = match next {
                Some(Ok(notification)) => notification,
                Some(Err(e)) => {
                    error!(error = %e, "Change stream failed");
                    self.status.report(ProcessStatus::Error);
                    return Err(e);
                }
                None => {
                    error!("Change stream ended");
                    self.status.report(ProcessStatus::Error);
                    return Err(Error::transient("change stream ended"));
                }
            };

            match self.handle(&notification).await {
                Ok(outcome) => {
                    debug!(asset_id = notification.asset_id, ?outcome, "Notification handled")
                }
                Err(e) => {
                    error!(asset_id = notification.asset_id, error = %e, "Asset lookup failed");
                    self.status.report(ProcessStatus::Error);
                    return Err(e);
                }
            }
        }
    }

    /// Reconciles one notification against the local asset records.
    pub async fn handle(&self, notification: &ChangeNotification) -> Result<ReconcileOutcome> {
        if notification.client_reference.as_deref() == Some(self.client_reference.as_str()) {
            trace!(asset_id = notification.asset_id, "Ignoring echo of own write");
            return Ok(ReconcileOutcome::Echo);
        }

        let outcome = match self.assets.get_by_external_id(notification.asset_id).await {
            Ok(asset) => self.reconcile_known(asset, notification).await,
            Err(e) if e.is_not_found() => self.reconcile_new(notification).await,
            Err(e) => return Err(e),
        };

        if let ReconcileOutcome::Created { tenant_id, .. } | ReconcileOutcome::Updated { tenant_id, .. } =
            outcome
        {
            self.reload.request(tenant_id);
        }
        Ok(outcome)
    }

    async fn reconcile_new(&self, notification: &ChangeNotification) -> ReconcileOutcome {
        let external_id = notification.asset_id;
        debug!(external_id, "Property change for unknown asset");

        let platform_asset = match self.platform.get_asset(external_id).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(external_id, error = %e, "Failed to fetch asset metadata");
                return ReconcileOutcome::Failed(e.to_string());
            }
        };
        if platform_asset.asset_type != MANAGED_ASSET_TYPE {
            debug!(external_id, asset_type = %platform_asset.asset_type, "Asset is not managed by this app");
            return ReconcileOutcome::Skipped(format!(
                "asset type {} is not managed",
                platform_asset.asset_type
            ));
        }

        let Some(name) = location_name(&notification.data) else {
            return ReconcileOutcome::Skipped("no location name in payload".into());
        };

        let config = match self.tenant_for_project(&platform_asset.project_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                warn!(external_id, project_id = %platform_asset.project_id, "No tenant serves this project");
                return ReconcileOutcome::Skipped(format!(
                    "no configuration for project {}",
                    platform_asset.project_id
                ));
            }
            Err(e) => return self.store_failure(external_id, e),
        };

        let location = match self.resolve(name, &config).await {
            Ok(location) => location,
            Err(outcome) => return outcome,
        };

        if let Err(e) = self.write_back(external_id, &location.name).await {
            return ReconcileOutcome::Failed(e.to_string());
        }

        let new_asset = NewAsset {
            configuration_id: config.id,
            project_id: platform_asset.project_id,
            external_id,
            role: AssetRole::Leaf(location),
        };
        if let Err(e) = self.assets.insert(&new_asset).await {
            return self.store_failure(external_id, e);
        }

        info!(tenant_id = config.id, external_id, "New location asset registered");
        ReconcileOutcome::Created {
            tenant_id: config.id,
            external_id,
        }
    }

    async fn reconcile_known(&self, mut asset: Asset, notification: &ChangeNotification) -> ReconcileOutcome {
        let external_id = asset.external_id;
        if asset.is_root() {
            return ReconcileOutcome::Skipped("root assets carry no location".into());
        }

        let Some(name) = location_name(&notification.data) else {
            return ReconcileOutcome::Skipped("no location name in payload".into());
        };

        let config = match self.configs.get(asset.configuration_id).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => {
                return ReconcileOutcome::Skipped(format!(
                    "configuration {} no longer exists",
                    asset.configuration_id
                ));
            }
            Err(e) => return self.store_failure(external_id, e),
        };

        let location = match self.resolve(name, &config).await {
            Ok(location) => location,
            Err(outcome) => return outcome,
        };

        if let Err(e) = self.write_back(external_id, &location.name).await {
            return ReconcileOutcome::Failed(e.to_string());
        }

        asset.role = AssetRole::Leaf(location);
        if let Err(e) = self.assets.update_location(&asset).await {
            return self.store_failure(external_id, e);
        }

        info!(tenant_id = config.id, external_id, "Location asset updated");
        ReconcileOutcome::Updated {
            tenant_id: config.id,
            external_id,
        }
    }

    /// Geocodes `name`; an unresolvable place is skipped, not an error.
    async fn resolve(
        &self,
        name: &str,
        config: &Configuration,
    ) -> std::result::Result<Location, ReconcileOutcome> {
        match locate(self.weather.as_ref(), name, &config.api_key).await {
            Ok(geo) => Ok(Location {
                name: format_location_name(&geo),
                lat: geo.lat,
                lon: geo.lon,
            }),
            Err(e) => {
                warn!(location = %name, error = %e, "Could not resolve location");
                Err(ReconcileOutcome::Skipped(format!("location {name:?} not resolved")))
            }
        }
    }

    async fn write_back(&self, external_id: i64, canonical: &str) -> Result<()> {
        let data = BTreeMap::from([(
            LOCATION_PROPERTY.to_string(),
            Value::String(canonical.to_string()),
        )]);
        let record = DataRecord::new(external_id, DataSubtype::Property, data);
        self.platform.upsert_data(&record).await.inspect_err(|e| {
            warn!(external_id, error = %e, "Failed to write canonical location name");
        })
    }

    /// The configuration serving `project_id`; the lowest id wins.
    async fn tenant_for_project(&self, project_id: &str) -> Result<Option<Configuration>> {
        let configs = self.configs.list().await?;
        Ok(configs
            .into_iter()
            .filter(|config| config.project_ids.iter().any(|p| p == project_id))
            .min_by_key(|config| config.id))
    }

    fn store_failure(&self, external_id: i64, e: Error) -> ReconcileOutcome {
        error!(external_id, error = %e, "Store operation failed during reconciliation");
        self.status.report(ProcessStatus::Error);
        ReconcileOutcome::Failed(e.to_string())
    }
}

/// The user-entered place name, if present and a plain string.
pub fn location_name(data: &Map<String, Value>) -> Option<&str> {
    match data.get(LOCATION_PROPERTY) {
        Some(Value::String(name)) => Some(name.as_str()),
        Some(other) => {
            warn!(value = %other, "Location name is not a string");
            None
        }
        None => {
            debug!("Notification carries no location name");
            None
        }
    }
}
