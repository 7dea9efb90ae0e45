use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

/// Process-wide health published to every root asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    #[default]
    Ok,
    Error,
    Fatal,
}

impl ProcessStatus {
    /// Numeric code written to the platform.
    pub fn code(self) -> u8 {
        match self {
            ProcessStatus::Ok => 0,
            ProcessStatus::Error => 1,
            ProcessStatus::Fatal => 2,
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Ok => write!(f, "ok"),
            ProcessStatus::Error => write!(f, "error"),
            ProcessStatus::Fatal => write!(f, "fatal"),
        }
    }
}

/// Shared publisher of [`ProcessStatus`].
///
/// Writes are atomic replacements on a watch channel; subscribers are woken
/// on every transition. `Fatal` is terminal.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<ProcessStatus>>,
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProcessStatus::Ok);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> ProcessStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessStatus> {
        self.tx.subscribe()
    }

    /// Publishes `status`, returning true when the value changed.
    pub fn report(&self, status: ProcessStatus) -> bool {
        let mut previous = ProcessStatus::Ok;
        let changed = self.tx.send_if_modified(|current| {
            if *current == status || *current == ProcessStatus::Fatal {
                return false;
            }
            previous = *current;
            *current = status;
            true
        });

        if changed {
            match status {
                ProcessStatus::Ok => info!(from = %previous, "Process status recovered"),
                _ => warn!(from = %previous, to = %status, "Process status changed"),
            }
        }
        changed
    }
}
