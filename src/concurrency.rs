//! Per-collection write serialization
//!
//! At most one batch write is in flight per collection. Reads never lock: the
//! cache hands out snapshots. A write that touches two collections takes both
//! locks in id order so two opposite cross-collection moves cannot deadlock.

use crate::types::CollectionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of a write; releases every lock on drop.
pub struct WriteGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

#[derive(Default)]
pub struct CollectionLockManager {
    locks: RwLock<HashMap<CollectionId, Arc<Mutex<()>>>>,
}

impl CollectionLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_lock(&self, collection_id: &CollectionId) -> Arc<Mutex<()>> {
        {
            let map = self.locks.read();
            if let Some(lock) = map.get(collection_id) {
                return lock.clone();
            }
        }

        // Double-check under the write lock; another task may have won.
        let mut map = self.locks.write();
        map.entry(collection_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock every listed collection, in id order.
    pub async fn lock_all(&self, collections: &[CollectionId]) -> WriteGuard {
        let mut ids = collections.to_vec();
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.get_lock(id).lock_owned().await);
        }
        WriteGuard { _guards: guards }
    }

    /// Whether a write currently holds `collection_id`.
    pub fn is_locked(&self, collection_id: &CollectionId) -> bool {
        self.get_lock(collection_id).try_lock().is_err()
    }
}
