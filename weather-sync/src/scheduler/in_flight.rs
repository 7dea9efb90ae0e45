//! Keyed run-once guard.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::TenantId;

/// Set of tenant ids that currently own a running loop.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    keys: Arc<Mutex<HashSet<TenantId>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `tenant_id`, or returns `None` if it is already claimed.
    /// The claim is released when the guard is dropped.
    pub fn try_acquire(&self, tenant_id: TenantId) -> Option<InFlightGuard> {
        if !self.keys.lock().insert(tenant_id) {
            return None;
        }
        Some(InFlightGuard {
            keys: Arc::clone(&self.keys),
            tenant_id,
        })
    }

    pub fn contains(&self, tenant_id: TenantId) -> bool {
        self.keys.lock().contains(&tenant_id)
    }

}

#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<TenantId>>>,
    tenant_id: TenantId,
}

impl InFlightGuard {
    #[cfg(test)]
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys.lock().remove(&self.tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let set = InFlightSet::new();
        let guard = set.try_acquire(3).unwrap();
        assert_eq!(guard.tenant_id(), 3);
        assert!(set.try_acquire(3).is_none());
        assert!(set.try_acquire(4).is_some());
    }

    #[test]
    fn test_drop_releases_key() {
        let set = InFlightSet::new();
        let guard = set.try_acquire(3).unwrap();
        assert!(set.contains(3));
        drop(guard);
        assert!(!set.contains(3));
        assert!(set.try_acquire(3).is_some());
    }

    #[tokio::test]
    async fn test_released_when_task_panics() {
        let set = InFlightSet::new();
        let guard = set.try_acquire(9).unwrap();
        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("collection blew up");
        });
        assert!(task.await.is_err());
        assert!(!set.contains(9));
    }
}
