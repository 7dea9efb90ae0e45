//! Per-tenant collection loop.
//!
//! Each enabled tenant owns one [`TenantScheduler`] task. The loop runs a
//! cycle, then waits for whichever comes first: the refresh interval, a
//! restart signal on its own channel, a graceful stop or a forced shutdown.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::in_flight::InFlightSet;
use super::runner::Collector;
use crate::Result;
use crate::domain::{Configuration, ProcessStatus, StatusHandle, TenantId};

/// Lifecycle of one tenant loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantState {
    Idle,
    Running,
    Waiting,
    Restarting,
    Stopped,
}

impl fmt::Display for TenantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantState::Idle => write!(f, "idle"),
            TenantState::Running => write!(f, "running"),
            TenantState::Waiting => write!(f, "waiting"),
            TenantState::Restarting => write!(f, "restarting"),
            TenantState::Stopped => write!(f, "stopped"),
        }
    }
}

pub struct TenantScheduler {
    tenant_id: TenantId,
    config_rx: watch::Receiver<Configuration>,
    state_tx: watch::Sender<TenantState>,
    collector: Arc<dyn Collector>,
    status: StatusHandle,
    /// Honoured only between cycles.
    stop: CancellationToken,
    /// Aborts the loop including an in-flight cycle.
    shutdown: CancellationToken,
    /// Projects whose root assets are known to exist.
    root_projects: Option<BTreeSet<String>>,
}

impl TenantScheduler {
    /// Starts the loop for `config` unless one is already in flight for the
    /// same tenant, in which case `None` is returned and nothing is spawned.
    pub fn spawn(
        config: Configuration,
        collector: Arc<dyn Collector>,
        status: StatusHandle,
        in_flight: &InFlightSet,
        parent: &CancellationToken,
    ) -> Option<TenantHandle> {
        let tenant_id = config.id;
        let guard = in_flight.try_acquire(tenant_id)?;

        let (config_tx, config_rx) = watch::channel(config);
        let (state_tx, state_rx) = watch::channel(TenantState::Idle);
        let stop = CancellationToken::new();
        let shutdown = parent.child_token();

        let scheduler = TenantScheduler {
            tenant_id,
            config_rx,
            state_tx,
            collector,
            status,
            stop: stop.clone(),
            shutdown: shutdown.clone(),
            root_projects: None,
        };

        let task = tokio::spawn(async move {
            let _guard = guard;
            scheduler.run().await;
        });

        Some(TenantHandle {
            tenant_id,
            config_tx,
            state_rx,
            stop,
            shutdown,
            task,
        })
    }

    async fn run(mut self) {
        let mut config = self.config_rx.borrow_and_update().clone();
        let shutdown = self.shutdown.clone();
        let stop = self.stop.clone();

        info!(
            tenant_id = self.tenant_id,
            refresh_interval_secs = config.refresh_interval_secs,
            request_timeout_secs = config.request_timeout_secs,
            project_ids = ?config.project_ids,
            "Tenant scheduler started"
        );

        loop {
            self.set_state(TenantState::Running);
            let cycle = shutdown.child_token();

            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                outcome = self.run_cycle(&config, &cycle) => outcome,
            };

            match outcome {
                Ok(()) => {
                    debug!(tenant_id = self.tenant_id, "Collection cycle succeeded");
                    self.status.report(ProcessStatus::Ok);
                }
                Err(e) => {
                    cycle.cancel();
                    warn!(tenant_id = self.tenant_id, error = %e, "Collection cycle failed");
                    self.status.report(ProcessStatus::Error);
                }
            }

            self.set_state(TenantState::Waiting);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = stop.cancelled() => break,
                changed = self.config_rx.changed() => {
                    if changed.is_err() {
                        debug!(tenant_id = self.tenant_id, "Tenant handle dropped");
                        break;
                    }
                    config = self.config_rx.borrow_and_update().clone();
                    self.set_state(TenantState::Restarting);
                    info!(tenant_id = self.tenant_id, "Restart signal received; starting next cycle now");
                }
                _ = tokio::time::sleep(config.refresh_interval()) => {}
            }
        }

        self.set_state(TenantState::Stopped);
        info!(tenant_id = self.tenant_id, "Tenant scheduler stopped");
    }

    async fn run_cycle(&mut self, config: &Configuration, cycle: &CancellationToken) -> Result<()> {
        let projects: BTreeSet<String> = config.project_ids.iter().cloned().collect();
        if self.root_projects.as_ref() != Some(&projects) {
            self.collector.ensure_root(config).await?;
            self.root_projects = Some(projects);
        }
        self.collector.collect(config, cycle).await
    }

    fn set_state(&self, state: TenantState) {
        self.state_tx.send_replace(state);
    }
}

/// Owner-side handle to a running [`TenantScheduler`].
#[derive(Debug)]
pub struct TenantHandle {
    tenant_id: TenantId,
    config_tx: watch::Sender<Configuration>,
    state_rx: watch::Receiver<TenantState>,
    stop: CancellationToken,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TenantHandle {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Ends the current wait early and starts the next cycle with the same
    /// configuration.
    pub fn restart(&self) {
        self.config_tx.send_modify(|_| {});
    }

    /// Replaces the configuration and restarts like [`TenantHandle::restart`].
    pub fn reconfigure(&self, config: Configuration) {
        self.config_tx.send_replace(config);
    }

    /// Asks the loop to stop once the current cycle has finished.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Stops the loop immediately, cancelling any in-flight cycle.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn state(&self) -> TenantState {
        *self.state_rx.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the loop task to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            warn!(tenant_id = self.tenant_id, "Tenant scheduler panicked");
        }
    }
}
