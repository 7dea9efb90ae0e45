//! Per-tenant configuration change detection.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use crate::domain::{ConfigurationSnapshot, TenantId};

/// Remembers the last snapshot seen for each tenant.
///
/// The lock covers one compare-and-record step and is never held across
/// an await point.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Mutex<HashMap<TenantId, ConfigurationSnapshot>>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `snapshot` differs from the recorded one (or none was
    /// recorded yet), recording it in that case.
    pub fn has_changed(&self, tenant_id: TenantId, snapshot: ConfigurationSnapshot) -> bool {
        let mut previous = self.previous.lock();
        match previous.get(&tenant_id) {
            Some(known) if *known == snapshot => false,
            _ => {
                trace!(tenant_id, "Configuration snapshot recorded");
                previous.insert(tenant_id, snapshot);
                true
            }
        }
    }

    /// Drops the recorded snapshot so the next observation counts as new.
    pub fn forget(&self, tenant_id: TenantId) -> bool {
        self.previous.lock().remove(&tenant_id).is_some()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.previous.lock().len()
    }
}
