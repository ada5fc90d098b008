use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A mutex that allows locking based on a key (e.g., an upload session ID).
/// Holders of different keys never contend with each other.
#[derive(Debug)]
pub struct KeyedMutex<K: Eq + Hash> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash> Clone for KeyedMutex<K> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
        }
    }
}

/// Proof that the caller holds the lock for one key; released on drop.
pub type KeyedGuard = OwnedMutexGuard<()>;

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Acquires the lock for the given key, waiting as long as necessary.
    pub async fn lock(&self, key: &K) -> KeyedGuard {
        self.slot(key).lock_owned().await
    }

    /// Acquires the lock for the given key, or returns `None` once `wait` has
    /// elapsed without the current holder releasing it.
    pub async fn lock_timeout(&self, key: &K, wait: Duration) -> Option<KeyedGuard> {
        tokio::time::timeout(wait, self.slot(key).lock_owned())
            .await
            .ok()
    }

    /// Acquires the lock for the given key only if nobody holds it right now.
    pub fn try_lock(&self, key: &K) -> Option<KeyedGuard> {
        self.slot(key).try_lock_owned().ok()
    }

    /// Returns `true` while some task holds the lock for `key`.
    pub fn is_locked(&self, key: &K) -> bool {
        self.locks
            .get(key)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Removes locks that are not currently held or awaited by any task.
    /// Returns the number of entries dropped.
    pub fn cleanup(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self::new()
    }
}
