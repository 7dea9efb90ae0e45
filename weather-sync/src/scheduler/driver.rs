//! Outer scheduling loop.
//!
//! Every tick the driver lists all tenant configurations and reconciles the
//! set of running [`TenantScheduler`] loops against them:
//!
//! - `enabled = false`: the loop is asked to stop between cycles; `active` is
//!   cleared once the loop has actually exited.
//! - `enabled = true, active = false`: the loop is started and `active` set.
//! - `active = true`: changed configurations restart the loop; a missing
//!   loop (crash, process restart) is started again.
//! - tenants no longer listed are shut down and forgotten.
//!
//! A failure to list configurations is fatal for the whole scheduler.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::change_detector::ChangeDetector;
use super::in_flight::InFlightSet;
use super::runner::Collector;
use super::tenant::{TenantHandle, TenantScheduler, TenantState};
use crate::database::ConfigurationRepository;
use crate::domain::{Configuration, ProcessStatus, StatusHandle, TenantId};
use crate::{Error, Result};

/// Default capacity of the reload request queue.
pub const DEFAULT_RELOAD_CAPACITY: usize = 64;

/// Sender side of the per-tenant restart queue.
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    tx: mpsc::Sender<TenantId>,
}

impl ReloadTrigger {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TenantId>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queues a restart of `tenant_id` without waiting.
    pub fn request(&self, tenant_id: TenantId) -> bool {
        match self.tx.try_send(tenant_id) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(tenant_id, "Reload queue full; change will be picked up next interval");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(tenant_id, "Scheduler driver gone; reload request dropped");
                false
            }
        }
    }
}

/// Summary of one [`SchedulerDriver::tick`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub started: Vec<TenantId>,
    pub restarted: Vec<TenantId>,
    pub stopping: Vec<TenantId>,
    pub deactivated: Vec<TenantId>,
    pub removed: Vec<TenantId>,
}

pub struct SchedulerDriver {
    configs: Arc<dyn ConfigurationRepository>,
    collector: Arc<dyn Collector>,
    status: StatusHandle,
    detector: ChangeDetector,
    in_flight: InFlightSet,
    tenants: HashMap<TenantId, TenantHandle>,
    cancellation_token: CancellationToken,
}

impl SchedulerDriver {
    pub fn new(
        configs: Arc<dyn ConfigurationRepository>,
        collector: Arc<dyn Collector>,
        status: StatusHandle,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            configs,
            collector,
            status,
            detector: ChangeDetector::new(),
            in_flight: InFlightSet::new(),
            tenants: HashMap::new(),
            cancellation_token,
        }
    }

    /// One reconciliation pass over all configurations.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let configs = self
            .configs
            .list()
            .await
            .map_err(|e| Error::FatalStore(format!("listing configurations: {e}")))?;

        let mut report = TickReport::default();
        let mut seen = HashSet::with_capacity(configs.len());

        for config in configs {
            seen.insert(config.id);
            if !config.enabled {
                self.deactivate(&config, &mut report).await;
            } else if !config.active {
                self.activate(config, &mut report).await;
            } else {
                self.keep_alive(config, &mut report);
            }
        }

        let removed: Vec<TenantId> = self
            .tenants
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for tenant_id in removed {
            if let Some(handle) = self.tenants.remove(&tenant_id) {
                handle.shutdown();
            }
            self.detector.forget(tenant_id);
            info!(tenant_id, "Configuration removed; tenant scheduler torn down");
            report.removed.push(tenant_id);
        }

        Ok(report)
    }

    async fn deactivate(&mut self, config: &Configuration, report: &mut TickReport) {
        if let Some(handle) = self.tenants.get(&config.id) {
            if !handle.is_finished() {
                if handle.state() != TenantState::Stopped {
                    handle.request_stop();
                }
                report.stopping.push(config.id);
                return;
            }
            self.tenants.remove(&config.id);
        }

        if config.active {
            if let Err(e) = self.configs.set_active(config.id, false).await {
                warn!(tenant_id = config.id, error = %e, "Failed to clear active flag");
                self.status.report(ProcessStatus::Error);
                return;
            }
            info!(tenant_id = config.id, "Tenant deactivated");
            report.deactivated.push(config.id);
        }
        self.detector.forget(config.id);
    }

    async fn activate(&mut self, config: Configuration, report: &mut TickReport) {
        let tenant_id = config.id;
        let mut activated = config;
        activated.active = true;
        let changed = self.detector.has_changed(tenant_id, activated.snapshot());

        // A loop survives here when an earlier `set_active(true)` failed.
        if self.is_running(tenant_id) {
            if changed && let Some(handle) = self.tenants.get(&tenant_id) {
                info!(
                    tenant_id,
                    "Configuration changed before activation; restarting tenant loop"
                );
                handle.reconfigure(activated.clone());
                report.restarted.push(tenant_id);
            }
        } else {
            self.tenants.remove(&tenant_id);
            match self.spawn(activated.clone()) {
                Some(handle) => {
                    self.tenants.insert(tenant_id, handle);
                    report.started.push(tenant_id);
                }
                None => debug!(tenant_id, "Tenant loop already in flight"),
            }
        }

        if let Err(e) = self.configs.set_active(tenant_id, true).await {
            warn!(tenant_id, error = %e, "Failed to set active flag");
            self.status.report(ProcessStatus::Error);
            return;
        }

        info!(
            tenant_id,
            refresh_interval_secs = activated.refresh_interval_secs,
            project_ids = ?activated.project_ids,
            "Tenant activated"
        );
    }

    fn keep_alive(&mut self, config: Configuration, report: &mut TickReport) {
        let tenant_id = config.id;
        let changed = self.detector.has_changed(tenant_id, config.snapshot());

        if self.is_running(tenant_id) {
            if changed && let Some(handle) = self.tenants.get(&tenant_id) {
                info!(tenant_id, "Configuration changed; restarting tenant loop");
                handle.reconfigure(config);
                report.restarted.push(tenant_id);
            }
            return;
        }

        self.tenants.remove(&tenant_id);
        if let Some(handle) = self.spawn(config) {
            info!(tenant_id, "Active tenant had no running loop; started");
            self.tenants.insert(tenant_id, handle);
            report.started.push(tenant_id);
        }
    }

    fn spawn(&self, config: Configuration) -> Option<TenantHandle> {
        TenantScheduler::spawn(
            config,
            Arc::clone(&self.collector),
            self.status.clone(),
            &self.in_flight,
            &self.cancellation_token,
        )
    }

    fn is_running(&self, tenant_id: TenantId) -> bool {
        self.tenants
            .get(&tenant_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Restarts the loop of `tenant_id` if it is running.
    pub fn reload(&self, tenant_id: TenantId) -> bool {
        match self.tenants.get(&tenant_id) {
            Some(handle) if !handle.is_finished() => {
                debug!(tenant_id, "Reload requested");
                handle.restart();
                true
            }
            _ => {
                debug!(tenant_id, "Reload requested for tenant without a running loop");
                false
            }
        }
    }

    pub fn tenant_state(&self, tenant_id: TenantId) -> Option<TenantState> {
        self.tenants.get(&tenant_id).map(TenantHandle::state)
    }

    pub fn running_tenants(&self) -> Vec<TenantId> {
        let mut ids: Vec<_> = self
            .tenants
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Ticks every `tick_interval` and serves reload requests until cancelled.
    ///
    /// Returns the error that made the scheduler stop, after reporting
    /// [`ProcessStatus::Fatal`] and shutting every tenant loop down.
    pub async fn run(
        mut self,
        tick_interval: Duration,
        mut reload_rx: mpsc::Receiver<TenantId>,
    ) -> Result<()> {
        let cancellation_token = self.cancellation_token.clone();
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_secs = tick_interval.as_secs(), "Scheduler driver started");

        let result = loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => break Ok(()),
                Some(tenant_id) = reload_rx.recv() => {
                    self.reload(tenant_id);
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Scheduler driver stopping");
                        self.status.report(ProcessStatus::Fatal);
                        break Err(e);
                    }
                }
            }
        };

        self.shutdown().await;
        info!("Scheduler driver stopped");
        result
    }

    /// Cancels every tenant loop and waits for them to exit.
    pub async fn shutdown(&mut self) {
        let handles: Vec<TenantHandle> = self.tenants.drain().map(|(_, handle)| handle).collect();
        for handle in &handles {
            handle.shutdown();
        }
        for handle in handles {
            handle.join().await;
        }
    }
}
