//! Per-position exclusivity.
//!
//! Every mutation of one position (tick, fill, dividend accrual or payment)
//! runs while holding that position's guard. Different positions never
//! contend with each other.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use volbal_core::PositionKey;

#[derive(Debug, Clone, Default)]
pub struct PositionLocks {
    locks: Arc<Mutex<HashMap<PositionKey, Arc<Mutex<()>>>>>,
}

/// Proof that the caller holds the lock for `key`. Released on drop.
#[derive(Debug)]
pub struct PositionGuard {
    key: PositionKey,
    _guard: OwnedMutexGuard<()>,
}

impl PositionGuard {
    #[must_use]
    pub fn key(&self) -> &PositionKey {
        &self.key
    }
}

impl PositionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn acquire(&self, key: &PositionKey) -> PositionGuard {
        let slot = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        tracing::trace!(position = %key, "position lock acquired");
        PositionGuard {
            key: key.clone(),
            _guard: guard,
        }
    }

    /// Number of positions that have ever been locked.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
