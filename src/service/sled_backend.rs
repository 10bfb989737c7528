//! Sled-backed record storage.
//!
//! Two trees: `collections` keyed by collection id, and `entries` keyed by
//! `<collection id> NUL <entry id>` so one prefix scan yields a collection.
//! Values are bincode-encoded.

use crate::collection::{CollectionRoot, Layout};
use crate::error::StorageError;
use crate::service::backend::RecordBackend;
use crate::tree::{EntryClass, EntryInfo, EntryKind, EntryPath};
use crate::types::{CollectionId, EntryId, Order};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const COLLECTIONS_TREE: &str = "collections";
const ENTRIES_TREE: &str = "entries";
const KEY_SEPARATOR: u8 = 0;

/// On-disk collection record.
#[derive(Serialize, Deserialize)]
struct StoredCollection {
    id: String,
    name: String,
    order: Order,
    expanded: bool,
    layout: Layout,
}

/// On-disk entry record. Kept separate from [`EntryInfo`] because bincode
/// cannot skip optional fields.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    name: String,
    kind: EntryKind,
    class: EntryClass,
    segments: Vec<String>,
    order: Order,
    expanded: bool,
    protocol: Option<String>,
}

impl From<&CollectionRoot> for StoredCollection {
    fn from(root: &CollectionRoot) -> Self {
        StoredCollection {
            id: root.id.as_str().to_string(),
            name: root.name.clone(),
            order: root.order,
            expanded: root.expanded,
            layout: root.layout,
        }
    }
}

impl From<StoredCollection> for CollectionRoot {
    fn from(stored: StoredCollection) -> Self {
        CollectionRoot {
            id: CollectionId::new(stored.id),
            name: stored.name,
            order: stored.order,
            expanded: stored.expanded,
            layout: stored.layout,
        }
    }
}

impl From<&EntryInfo> for StoredEntry {
    fn from(entry: &EntryInfo) -> Self {
        StoredEntry {
            id: entry.id.as_str().to_string(),
            name: entry.name.clone(),
            kind: entry.kind,
            class: entry.class,
            segments: entry.path.segments().to_vec(),
            order: entry.order,
            expanded: entry.expanded,
            protocol: entry.protocol.clone(),
        }
    }
}

impl From<StoredEntry> for EntryInfo {
    fn from(stored: StoredEntry) -> Self {
        EntryInfo {
            id: EntryId::new(stored.id),
            name: stored.name,
            kind: stored.kind,
            class: stored.class,
            path: EntryPath::new(stored.segments),
            order: stored.order,
            expanded: stored.expanded,
            protocol: stored.protocol,
        }
    }
}

pub struct SledBackend {
    db: sled::Db,
    collections: sled::Tree,
    entries: sled::Tree,
}

impl SledBackend {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        debug!(path = %path.display(), "Opened sled store");
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let collections = db.open_tree(COLLECTIONS_TREE)?;
        let entries = db.open_tree(ENTRIES_TREE)?;
        Ok(SledBackend {
            db,
            collections,
            entries,
        })
    }

    fn prefix(collection_id: &CollectionId) -> Vec<u8> {
        let mut key = collection_id.as_str().as_bytes().to_vec();
        key.push(KEY_SEPARATOR);
        key
    }

    fn entry_key(collection_id: &CollectionId, id: &EntryId) -> Vec<u8> {
        let mut key = Self::prefix(collection_id);
        key.extend_from_slice(id.as_str().as_bytes());
        key
    }
}

impl RecordBackend for SledBackend {
    fn collections(&self) -> Result<Vec<CollectionRoot>, StorageError> {
        let mut out = Vec::new();
        for item in self.collections.iter() {
            let (_, value) = item?;
            let stored: StoredCollection = bincode::deserialize(&value)?;
            out.push(stored.into());
        }
        Ok(out)
    }

    fn put_collection(&self, root: &CollectionRoot) -> Result<(), StorageError> {
        let value = bincode::serialize(&StoredCollection::from(root))?;
        self.collections.insert(root.id.as_str().as_bytes(), value)?;
        Ok(())
    }

    fn remove_collection(&self, id: &CollectionId) -> Result<(), StorageError> {
        self.collections.remove(id.as_str().as_bytes())?;
        let mut batch = sled::Batch::default();
        for item in self.entries.scan_prefix(Self::prefix(id)) {
            let (key, _) = item?;
            batch.remove(key);
        }
        self.entries.apply_batch(batch)?;
        Ok(())
    }

    fn entries(&self, collection_id: &CollectionId) -> Result<Vec<EntryInfo>, StorageError> {
        let mut out = Vec::new();
        for item in self.entries.scan_prefix(Self::prefix(collection_id)) {
            let (_, value) = item?;
            let stored: StoredEntry = bincode::deserialize(&value)?;
            out.push(stored.into());
        }
        Ok(out)
    }

    fn put_entries(
        &self,
        collection_id: &CollectionId,
        entries: &[EntryInfo],
    ) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        for entry in entries {
            let value = bincode::serialize(&StoredEntry::from(entry))?;
            batch.insert(Self::entry_key(collection_id, &entry.id), value);
        }
        self.entries.apply_batch(batch)?;
        Ok(())
    }

    fn remove_entries(
        &self,
        collection_id: &CollectionId,
        ids: &[EntryId],
    ) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        for id in ids {
            batch.remove(Self::entry_key(collection_id, id));
        }
        self.entries.apply_batch(batch)?;
        Ok(())
    }

    fn next_id(&self) -> Result<u64, StorageError> {
        Ok(self.db.generate_id()?)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
