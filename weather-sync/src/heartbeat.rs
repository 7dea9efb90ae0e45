//! Status heartbeat to every root asset.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::AssetRepository;
use crate::domain::StatusHandle;
use crate::platform::{DataRecord, DataSubtype, PlatformApi};

/// Outcome of one [`HeartbeatReporter::beat`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct HeartbeatReporter {
    assets: Arc<dyn AssetRepository>,
    platform: Arc<dyn PlatformApi>,
    status: StatusHandle,
}

impl HeartbeatReporter {
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        platform: Arc<dyn PlatformApi>,
        status: StatusHandle,
    ) -> Self {
        Self {
            assets,
            platform,
            status,
        }
    }

    /// Upserts the current status code to every root asset.
    ///
    /// Individual upsert failures are logged and counted; only a failure to
    /// list the roots is returned as an error.
    pub async fn beat(&self) -> Result<HeartbeatReport> {
        let roots = self.assets.list_roots().await?;
        let status = self.status.get();

        let upserts = roots.iter().map(|root| {
            let record = DataRecord::new(
                root.external_id,
                DataSubtype::Status,
                BTreeMap::from([("status".to_string(), Value::from(status.code()))]),
            );
            async move { (root.external_id, self.platform.upsert_data(&record).await) }
        });

        let mut report = HeartbeatReport::default();
        for (external_id, result) in join_all(upserts).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(external_id, error = %e, "Heartbeat upsert failed");
                    report.failed += 1;
                }
            }
        }

        debug!(
            %status,
            delivered = report.delivered,
            failed = report.failed,
            "Heartbeat sent"
        );
        Ok(report)
    }

    /// Beats every `interval` and right after each status transition.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut status_rx = self.status.subscribe();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = interval.as_secs(), "Heartbeat reporter started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.beat_logged().await;
                }
                _ = ticker.tick() => self.beat_logged().await,
            }
        }
        info!("Heartbeat reporter stopped");
    }

    async fn beat_logged(&self) {
        if let Err(e) = self.beat().await {
            warn!(error = %e, "Heartbeat skipped: cannot list root assets");
        }
    }
}
