//! Per-instance mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use store::AggregateId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes transitions of one saga instance. Different instances never
/// wait on each other.
#[derive(Default)]
pub struct InstanceLocks {
    locks: Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`; released when the guard drops.
    pub async fn lock(&self, id: AggregateId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the lock entry of a finished instance.
    pub async fn remove(&self, id: AggregateId) {
        self.locks.lock().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
