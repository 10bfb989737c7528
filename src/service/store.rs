//! Store semantics over a record backend.
//!
//! Entries are addressed by id; parents are located by path, compared
//! case-insensitively. Writes are read-modify-write over a whole collection
//! under one lock, and a batch is committed only when every item succeeds.

use crate::collection::{sort_collections, CollectionRoot, CollectionUpdate, Layout};
use crate::error::PersistenceError;
use crate::service::backend::RecordBackend;
use crate::service::{BatchUpdateOutput, EntryStream, PersistenceService};
use crate::sync::plan::{CreateEntry, EntryUpdate};
use crate::tree::{name_key, names_collide, validate_name, EntryClass, EntryInfo, EntryKind, EntryPath};
use crate::types::{CollectionId, EntryId, Order};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

fn path_key(path: &EntryPath) -> Vec<String> {
    path.segments().iter().map(|s| name_key(s)).collect()
}

fn conflict(message: impl Into<String>) -> PersistenceError {
    PersistenceError::Conflict(message.into())
}

/// Working copy of one collection's entries during a write.
struct Working {
    layout: Layout,
    entries: HashMap<EntryId, EntryInfo>,
    changed: HashSet<EntryId>,
    removed: Vec<EntryId>,
}

impl Working {
    fn new(layout: Layout, entries: Vec<EntryInfo>) -> Self {
        Working {
            layout,
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
            changed: HashSet::new(),
            removed: Vec::new(),
        }
    }

    fn is_category_root(&self, entry: &EntryInfo) -> bool {
        self.layout == Layout::Partitioned && entry.path.len() == 1
    }

    /// Resolve a parent directory path to its canonical form.
    fn directory(&self, path: &EntryPath) -> Result<EntryPath, PersistenceError> {
        if path.is_root() {
            if self.layout == Layout::Partitioned {
                return Err(conflict(
                    "partitioned collections only hold category roots at the top level",
                ));
            }
            return Ok(EntryPath::root());
        }
        let key = path_key(path);
        self.entries
            .values()
            .find(|e| e.kind == EntryKind::Dir && path_key(&e.path) == key)
            .map(|e| e.path.clone())
            .ok_or_else(|| conflict(format!("directory '{}' does not exist", path)))
    }

    fn collides(&self, parent: &EntryPath, name: &str, except: Option<&EntryId>) -> bool {
        let key = path_key(parent);
        self.entries.values().any(|e| {
            Some(&e.id) != except
                && path_key(&e.path.parent()) == key
                && names_collide(&e.name, name)
        })
    }

    fn create(&mut self, id: EntryId, input: &CreateEntry) -> Result<EntryInfo, PersistenceError> {
        let fields = input.fields();
        let name = validate_name(&fields.name).map_err(|e| conflict(e.to_string()))?;
        let parent = self.directory(&fields.path)?;
        if self.collides(&parent, &name, None) {
            return Err(conflict(format!("'{}' already exists in '{}'", name, parent)));
        }
        let entry = EntryInfo {
            id: id.clone(),
            path: parent.join(&name),
            name,
            kind: input.kind(),
            class: fields.class,
            order: fields.order,
            expanded: false,
            protocol: fields.protocol.clone(),
        };
        self.entries.insert(id.clone(), entry.clone());
        self.changed.insert(id);
        Ok(entry)
    }

    fn update(&mut self, update: &EntryUpdate) -> Result<EntryInfo, PersistenceError> {
        let fields = update.fields();
        let current = self
            .entries
            .get(&fields.id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(fields.id.clone()))?;
        if current.kind != update.kind() {
            return Err(conflict(format!("entry {} has a different kind", current.id)));
        }

        let relocating = fields.path.is_some() || fields.name.is_some();
        if relocating && self.is_category_root(&current) {
            return Err(conflict(format!("category root '{}' is fixed", current.name)));
        }
        let parent = match &fields.path {
            Some(path) => {
                let parent = self.directory(path)?;
                if parent.starts_with(&current.path) {
                    return Err(conflict(format!(
                        "cannot move '{}' into its own subtree",
                        current.path
                    )));
                }
                parent
            }
            None => current.path.parent(),
        };
        let name = match &fields.name {
            Some(name) => validate_name(name).map_err(|e| conflict(e.to_string()))?,
            None => current.name.clone(),
        };

        let new_path = parent.join(&name);
        if new_path != current.path {
            if self.collides(&parent, &name, Some(&current.id)) {
                return Err(conflict(format!("'{}' already exists in '{}'", name, parent)));
            }
            let moved: Vec<EntryId> = self
                .entries
                .values()
                .filter(|e| e.id == current.id || e.path.is_under(&current.path))
                .map(|e| e.id.clone())
                .collect();
            for id in moved {
                if let Some(entry) = self.entries.get_mut(&id) {
                    if let Some(path) = entry.path.replace_prefix(&current.path, &new_path) {
                        entry.path = path;
                    }
                }
                self.changed.insert(id);
            }
        }

        let entry = self
            .entries
            .get_mut(&current.id)
            .ok_or_else(|| PersistenceError::NotFound(current.id.clone()))?;
        entry.name = name;
        if let Some(order) = fields.order {
            entry.order = order;
        }
        if let Some(expanded) = fields.expanded {
            if entry.kind.is_dir() {
                entry.expanded = expanded;
            }
        }
        self.changed.insert(current.id.clone());
        Ok(entry.clone())
    }

    fn delete(&mut self, id: &EntryId) -> Result<usize, PersistenceError> {
        let target = self
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))?;
        if self.is_category_root(&target) {
            return Err(conflict(format!("category root '{}' is fixed", target.name)));
        }
        let doomed: Vec<EntryId> = self
            .entries
            .values()
            .filter(|e| e.id == target.id || e.path.is_under(&target.path))
            .map(|e| e.id.clone())
            .collect();
        for id in &doomed {
            self.entries.remove(id);
            self.changed.remove(id);
        }
        let count = doomed.len();
        self.removed.extend(doomed);
        Ok(count)
    }

    fn changed_records(&self) -> Vec<EntryInfo> {
        self.changed
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }
}

/// [`PersistenceService`] over a [`RecordBackend`].
pub struct EntryStore<B: RecordBackend> {
    backend: Arc<B>,
    write_lock: Mutex<()>,
}

impl<B: RecordBackend> EntryStore<B> {
    pub fn new(backend: B) -> Self {
        EntryStore {
            backend: Arc::new(backend),
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn collection(&self, id: &CollectionId) -> Result<CollectionRoot, PersistenceError> {
        self.backend
            .collections()?
            .into_iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| PersistenceError::UnknownCollection(id.clone()))
    }

    fn working(&self, collection_id: &CollectionId) -> Result<Working, PersistenceError> {
        let root = self.collection(collection_id)?;
        Ok(Working::new(root.layout, self.backend.entries(collection_id)?))
    }

    fn commit(&self, collection_id: &CollectionId, working: &Working) -> Result<(), PersistenceError> {
        if !working.removed.is_empty() {
            self.backend.remove_entries(collection_id, &working.removed)?;
        }
        let changed = working.changed_records();
        if !changed.is_empty() {
            self.backend.put_entries(collection_id, &changed)?;
        }
        self.backend.flush()?;
        Ok(())
    }

    fn new_entry_id(&self) -> Result<EntryId, PersistenceError> {
        Ok(EntryId::new(format!("entry-{}", self.backend.next_id()?)))
    }
}

#[async_trait]
impl<B: RecordBackend + 'static> PersistenceService for EntryStore<B> {
    async fn list_collections(&self) -> Result<Vec<CollectionRoot>, PersistenceError> {
        let mut collections = self.backend.collections()?;
        sort_collections(&mut collections);
        Ok(collections)
    }

    async fn create_collection(
        &self,
        name: &str,
        layout: Layout,
    ) -> Result<CollectionRoot, PersistenceError> {
        let name = validate_name(name).map_err(|e| conflict(e.to_string()))?;
        let _guard = self.write_lock.lock();
        let existing = self.backend.collections()?;
        let order = existing.iter().map(|c| c.order).max().unwrap_or(0) + 1;
        let root = CollectionRoot {
            id: CollectionId::new(format!("collection-{}", self.backend.next_id()?)),
            name,
            order,
            expanded: false,
            layout,
        };
        self.backend.put_collection(&root)?;

        if layout == Layout::Partitioned {
            let mut categories = Vec::with_capacity(EntryClass::ALL.len());
            for (index, class) in EntryClass::ALL.into_iter().enumerate() {
                categories.push(EntryInfo {
                    id: self.new_entry_id()?,
                    name: class.category_dir().to_string(),
                    kind: EntryKind::Dir,
                    class,
                    path: EntryPath::root().join(class.category_dir()),
                    order: index as Order + 1,
                    expanded: false,
                    protocol: None,
                });
            }
            self.backend.put_entries(&root.id, &categories)?;
        }
        self.backend.flush()?;
        info!(collection = %root.id, name = %root.name, layout = ?layout, "Created collection");
        Ok(root)
    }

    async fn batch_update_collection(
        &self,
        updates: &[CollectionUpdate],
    ) -> Result<Vec<CollectionRoot>, PersistenceError> {
        let _guard = self.write_lock.lock();
        let mut collections: HashMap<CollectionId, CollectionRoot> = self
            .backend
            .collections()?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let mut touched = Vec::with_capacity(updates.len());
        for update in updates {
            let root = collections
                .get_mut(&update.id)
                .ok_or_else(|| PersistenceError::UnknownCollection(update.id.clone()))?;
            if let Some(name) = &update.name {
                validate_name(name).map_err(|e| conflict(e.to_string()))?;
            }
            root.apply(update);
            touched.push(update.id.clone());
        }
        let mut out = Vec::with_capacity(touched.len());
        for id in touched {
            if let Some(root) = collections.get(&id) {
                self.backend.put_collection(root)?;
                out.push(root.clone());
            }
        }
        self.backend.flush()?;
        Ok(out)
    }

    async fn delete_collection(&self, id: &CollectionId) -> Result<CollectionId, PersistenceError> {
        let _guard = self.write_lock.lock();
        self.collection(id)?;
        self.backend.remove_collection(id)?;
        self.backend.flush()?;
        info!(collection = %id, "Deleted collection");
        Ok(id.clone())
    }

    async fn stream_entries(
        &self,
        collection_id: &CollectionId,
        path: Option<&EntryPath>,
    ) -> Result<EntryStream, PersistenceError> {
        self.collection(collection_id)?;
        let mut entries = self.backend.entries(collection_id)?;
        if let Some(scope) = path.filter(|p| !p.is_root()) {
            let scope = path_key(scope);
            entries.retain(|e| {
                let key = path_key(&e.path);
                key.len() > scope.len() && key[..scope.len()] == scope[..]
            });
        }
        entries.sort_by(|a, b| {
            a.path
                .len()
                .cmp(&b.path.len())
                .then_with(|| a.order.cmp(&b.order))
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!(collection = %collection_id, scope = ?path.map(|p| p.raw()), count = entries.len(), "Streaming entries");
        Ok(futures::stream::iter(entries).boxed())
    }

    async fn create_entry(
        &self,
        collection_id: &CollectionId,
        input: &CreateEntry,
    ) -> Result<EntryId, PersistenceError> {
        let mut ids = self
            .batch_create_entry(collection_id, std::slice::from_ref(input))
            .await?;
        ids.pop()
            .ok_or_else(|| conflict("create returned no id"))
    }

    async fn batch_create_entry(
        &self,
        collection_id: &CollectionId,
        inputs: &[CreateEntry],
    ) -> Result<Vec<EntryId>, PersistenceError> {
        let _guard = self.write_lock.lock();
        let mut working = self.working(collection_id)?;
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            let id = self.new_entry_id()?;
            working.create(id.clone(), input)?;
            ids.push(id);
        }
        self.commit(collection_id, &working)?;
        info!(collection = %collection_id, created = ids.len(), "Created entries");
        Ok(ids)
    }

    async fn update_entry(
        &self,
        collection_id: &CollectionId,
        update: &EntryUpdate,
    ) -> Result<EntryInfo, PersistenceError> {
        let _guard = self.write_lock.lock();
        let mut working = self.working(collection_id)?;
        working.update(update)?;
        self.commit(collection_id, &working)?;
        working
            .entries
            .get(update.id())
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(update.id().clone()))
    }

    async fn batch_update_entry(
        &self,
        collection_id: &CollectionId,
        updates: &[EntryUpdate],
    ) -> Result<BatchUpdateOutput, PersistenceError> {
        let _guard = self.write_lock.lock();
        let mut working = self.working(collection_id)?;
        for update in updates {
            working.update(update)?;
        }
        self.commit(collection_id, &working)?;
        info!(collection = %collection_id, updated = updates.len(), "Applied entry updates");
        Ok(BatchUpdateOutput {
            applied: updates.len(),
            records: working.changed_records(),
        })
    }

    async fn delete_entry(
        &self,
        collection_id: &CollectionId,
        id: &EntryId,
    ) -> Result<EntryId, PersistenceError> {
        let _guard = self.write_lock.lock();
        let mut working = self.working(collection_id)?;
        let removed = working.delete(id)?;
        self.commit(collection_id, &working)?;
        info!(collection = %collection_id, entry = %id, removed, "Deleted entry");
        Ok(id.clone())
    }
}
