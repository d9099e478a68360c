//! Per-record locks
//!
//! Reconciliation is serialized per local record identity. The dispatch
//! worker holds the lock of the item it reconciles; ancestor promotion takes
//! each ancestor's lock while it rewrites that ancestor. Locks are only ever
//! taken child before ancestor and an ancestor lock is released before the
//! next one is taken, so no cycle can form.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock key of a local record: `(bundle, external_id)`
pub fn record_key(bundle: &str, external_id: &str) -> String {
    format!("{}/{}", bundle, external_id)
}

/// One async mutex per key, created on demand
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    /// Drop entries nobody holds or waits on
    pub fn prune(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("video/asset-1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("video/asset-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _first = locks.lock("video/asset-1").await;

        let second =
            tokio::time::timeout(Duration::from_millis(100), locks.lock("video/asset-2")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_prune_drops_released_keys() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.lock("video/asset-1").await;
            let _other = locks.lock("video/asset-2").await;
        }
        let _held = locks.lock("video/asset-3").await;

        locks.prune();

        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_record_key_separates_bundles() {
        assert_ne!(record_key("show", "1"), record_key("video", "1"));
    }
}
