//! Record backends: raw collection and entry storage without semantics.

use crate::collection::CollectionRoot;
use crate::error::StorageError;
use crate::tree::EntryInfo;
use crate::types::{CollectionId, EntryId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Key-value persistence for collection roots and entry records.
pub trait RecordBackend: Send + Sync {
    fn collections(&self) -> Result<Vec<CollectionRoot>, StorageError>;
    fn put_collection(&self, root: &CollectionRoot) -> Result<(), StorageError>;
    /// Removes the collection and every entry it owns.
    fn remove_collection(&self, id: &CollectionId) -> Result<(), StorageError>;

    fn entries(&self, collection_id: &CollectionId) -> Result<Vec<EntryInfo>, StorageError>;
    fn put_entries(
        &self,
        collection_id: &CollectionId,
        entries: &[EntryInfo],
    ) -> Result<(), StorageError>;
    fn remove_entries(&self, collection_id: &CollectionId, ids: &[EntryId])
        -> Result<(), StorageError>;

    /// Monotonic id source shared by collections and entries.
    fn next_id(&self) -> Result<u64, StorageError>;

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Process-local backend used by tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<CollectionId, CollectionRoot>>,
    entries: RwLock<HashMap<CollectionId, BTreeMap<EntryId, EntryInfo>>>,
    ids: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordBackend for MemoryBackend {
    fn collections(&self) -> Result<Vec<CollectionRoot>, StorageError> {
        Ok(self.collections.read().values().cloned().collect())
    }

    fn put_collection(&self, root: &CollectionRoot) -> Result<(), StorageError> {
        self.collections.write().insert(root.id.clone(), root.clone());
        Ok(())
    }

    fn remove_collection(&self, id: &CollectionId) -> Result<(), StorageError> {
        self.collections.write().remove(id);
        self.entries.write().remove(id);
        Ok(())
    }

    fn entries(&self, collection_id: &CollectionId) -> Result<Vec<EntryInfo>, StorageError> {
        Ok(self
            .entries
            .read()
            .get(collection_id)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    fn put_entries(
        &self,
        collection_id: &CollectionId,
        entries: &[EntryInfo],
    ) -> Result<(), StorageError> {
        let mut map = self.entries.write();
        let stored = map.entry(collection_id.clone()).or_default();
        for entry in entries {
            stored.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    fn remove_entries(
        &self,
        collection_id: &CollectionId,
        ids: &[EntryId],
    ) -> Result<(), StorageError> {
        if let Some(stored) = self.entries.write().get_mut(collection_id) {
            for id in ids {
                stored.remove(id);
            }
        }
        Ok(())
    }

    fn next_id(&self) -> Result<u64, StorageError> {
        Ok(self.ids.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
