//! Shared fixtures.

use async_trait::async_trait;
use orchard::collection::{CollectionRoot, CollectionUpdate, Layout};
use orchard::config::DragConfig;
use orchard::error::PersistenceError;
use orchard::service::{
    BatchUpdateOutput, EntryStore, EntryStream, MemoryBackend, PersistenceService,
};
use orchard::sync::{CreateEntry, EntryUpdate};
use orchard::tree::{CollectionTree, EntryClass, EntryInfo, EntryKind, EntryPath};
use orchard::types::{CollectionId, EntryId, Order};
use orchard::Forest;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub fn entry(id: &str, path: &str, kind: EntryKind, order: Order) -> EntryInfo {
    let path = EntryPath::parse(path);
    EntryInfo {
        id: EntryId::from(id),
        name: path.name().unwrap_or_default().to_string(),
        kind,
        class: EntryClass::Request,
        path,
        order,
        expanded: false,
        protocol: None,
    }
}

pub fn dir(id: &str, path: &str, order: Order) -> EntryInfo {
    entry(id, path, EntryKind::Dir, order)
}

pub fn item(id: &str, path: &str, order: Order) -> EntryInfo {
    entry(id, path, EntryKind::Item, order)
}

pub fn flat_tree(collection: &str, entries: Vec<EntryInfo>) -> CollectionTree {
    CollectionTree::hydrate(CollectionId::from(collection), Layout::Flat, entries)
}

pub fn memory_service() -> Arc<dyn PersistenceService> {
    Arc::new(EntryStore::new(MemoryBackend::new()))
}

pub fn forest_over(service: Arc<dyn PersistenceService>) -> Forest {
    Forest::new(service, &DragConfig::default())
}

/// Ids of a sibling list with their orders, for compact assertions.
pub fn orders(tree: &CollectionTree, ids: &[EntryId]) -> Vec<(String, Order)> {
    ids.iter()
        .map(|id| (tree.node(id).unwrap().name.clone(), tree.node(id).unwrap().order))
        .collect()
}

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` with XDG and HOME pointed into `temp_dir`. Serialized, since the
/// process environment is shared between test threads.
pub fn with_xdg_env<F: FnOnce()>(temp_dir: &TempDir, f: F) {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let saved: Vec<(&str, Option<String>)> = ["HOME", "XDG_CONFIG_HOME", "XDG_DATA_HOME"]
        .into_iter()
        .map(|key| (key, std::env::var(key).ok()))
        .collect();
    std::env::set_var("HOME", temp_dir.path());
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path().join("config"));
    std::env::set_var("XDG_DATA_HOME", temp_dir.path().join("data"));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    for (key, value) in saved {
        match value {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
    if let Err(panic) = result {
        std::panic::resume_unwind(panic);
    }
}

/// Delegates to an inner service and fails entry writes on demand.
pub struct FlakyService {
    inner: Arc<dyn PersistenceService>,
    fail_writes: AtomicBool,
    pub stream_calls: AtomicUsize,
}

impl FlakyService {
    pub fn new(inner: Arc<dyn PersistenceService>) -> Self {
        FlakyService {
            inner,
            fail_writes: AtomicBool::new(false),
            stream_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceService for FlakyService {
    async fn list_collections(&self) -> Result<Vec<CollectionRoot>, PersistenceError> {
        self.inner.list_collections().await
    }

    async fn create_collection(
        &self,
        name: &str,
        layout: Layout,
    ) -> Result<CollectionRoot, PersistenceError> {
        self.inner.create_collection(name, layout).await
    }

    async fn batch_update_collection(
        &self,
        updates: &[CollectionUpdate],
    ) -> Result<Vec<CollectionRoot>, PersistenceError> {
        self.check()?;
        self.inner.batch_update_collection(updates).await
    }

    async fn delete_collection(&self, id: &CollectionId) -> Result<CollectionId, PersistenceError> {
        self.inner.delete_collection(id).await
    }

    async fn stream_entries(
        &self,
        collection_id: &CollectionId,
        path: Option<&EntryPath>,
    ) -> Result<EntryStream, PersistenceError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.stream_entries(collection_id, path).await
    }

    async fn create_entry(
        &self,
        collection_id: &CollectionId,
        input: &CreateEntry,
    ) -> Result<EntryId, PersistenceError> {
        self.check()?;
        self.inner.create_entry(collection_id, input).await
    }

    async fn batch_create_entry(
        &self,
        collection_id: &CollectionId,
        inputs: &[CreateEntry],
    ) -> Result<Vec<EntryId>, PersistenceError> {
        self.check()?;
        self.inner.batch_create_entry(collection_id, inputs).await
    }

    async fn update_entry(
        &self,
        collection_id: &CollectionId,
        update: &EntryUpdate,
    ) -> Result<EntryInfo, PersistenceError> {
        self.check()?;
        self.inner.update_entry(collection_id, update).await
    }

    async fn batch_update_entry(
        &self,
        collection_id: &CollectionId,
        updates: &[EntryUpdate],
    ) -> Result<BatchUpdateOutput, PersistenceError> {
        self.check()?;
        self.inner.batch_update_entry(collection_id, updates).await
    }

    async fn delete_entry(
        &self,
        collection_id: &CollectionId,
        id: &EntryId,
    ) -> Result<EntryId, PersistenceError> {
        self.check()?;
        self.inner.delete_entry(collection_id, id).await
    }
}
