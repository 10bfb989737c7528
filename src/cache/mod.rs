//! Shared tree cache.
//!
//! One [`CollectionTree`] per collection, read by every open view and written
//! only by optimistic local mutation and by the reconciler. Readers get
//! snapshots; every write publishes a [`CacheEvent`].

pub mod reconcile;

pub use reconcile::{merge_entries, MergeScope, Reconciler};

use crate::collection::{sort_collections, CollectionRoot};
use crate::tree::{CollectionTree, TreeView};
use crate::types::CollectionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{trace, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    TreeChanged(CollectionId),
    CollectionsChanged,
    CollectionRemoved(CollectionId),
}

impl CacheEvent {
    fn concerns(&self, collection_id: &CollectionId) -> bool {
        match self {
            CacheEvent::TreeChanged(id) | CacheEvent::CollectionRemoved(id) => id == collection_id,
            CacheEvent::CollectionsChanged => true,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedCollection {
    root: CollectionRoot,
    tree: CollectionTree,
}

pub struct TreeCache {
    collections: RwLock<HashMap<CollectionId, CachedCollection>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for TreeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        TreeCache {
            collections: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn publish(&self, event: CacheEvent) {
        trace!(event = ?event, "Cache event");
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(event);
    }

    /// Insert or replace a collection and its tree.
    pub fn insert(&self, root: CollectionRoot, tree: CollectionTree) {
        let id = root.id.clone();
        self.collections
            .write()
            .insert(id.clone(), CachedCollection { root, tree });
        self.publish(CacheEvent::CollectionsChanged);
        self.publish(CacheEvent::TreeChanged(id));
    }

    pub fn remove(&self, id: &CollectionId) -> bool {
        let removed = self.collections.write().remove(id).is_some();
        if removed {
            self.publish(CacheEvent::CollectionRemoved(id.clone()));
        }
        removed
    }

    pub fn contains(&self, id: &CollectionId) -> bool {
        self.collections.read().contains_key(id)
    }

    /// Collection roots in display order.
    pub fn collections(&self) -> Vec<CollectionRoot> {
        let mut roots: Vec<CollectionRoot> = self
            .collections
            .read()
            .values()
            .map(|c| c.root.clone())
            .collect();
        sort_collections(&mut roots);
        roots
    }

    pub fn collection(&self, id: &CollectionId) -> Option<CollectionRoot> {
        self.collections.read().get(id).map(|c| c.root.clone())
    }

    /// Replace collection roots that are cached. Unknown roots are ignored.
    pub fn update_roots(&self, roots: &[CollectionRoot]) {
        {
            let mut collections = self.collections.write();
            for root in roots {
                match collections.get_mut(&root.id) {
                    Some(cached) => cached.root = root.clone(),
                    None => warn!(collection = %root.id, "Ignoring update for uncached collection"),
                }
            }
        }
        self.publish(CacheEvent::CollectionsChanged);
    }

    /// Snapshot of a collection's tree.
    pub fn tree(&self, id: &CollectionId) -> Option<CollectionTree> {
        self.collections.read().get(id).map(|c| c.tree.clone())
    }

    pub fn view(&self, id: &CollectionId) -> Option<TreeView> {
        self.with_tree(id, TreeView::of)
    }

    pub fn with_tree<R>(&self, id: &CollectionId, f: impl FnOnce(&CollectionTree) -> R) -> Option<R> {
        self.collections.read().get(id).map(|c| f(&c.tree))
    }

    /// Mutate a tree in place and notify subscribers.
    pub fn update_tree<R>(
        &self,
        id: &CollectionId,
        f: impl FnOnce(&mut CollectionTree) -> R,
    ) -> Option<R> {
        let result = {
            let mut collections = self.collections.write();
            collections.get_mut(id).map(|c| f(&mut c.tree))
        };
        if result.is_some() {
            self.publish(CacheEvent::TreeChanged(id.clone()));
        }
        result
    }

    pub fn replace_tree(&self, tree: CollectionTree) -> bool {
        let id = tree.collection_id().clone();
        let replaced = {
            let mut collections = self.collections.write();
            match collections.get_mut(&id) {
                Some(cached) => {
                    cached.tree = tree;
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.publish(CacheEvent::TreeChanged(id));
        }
        replaced
    }

    /// Replace two trees under one write so no reader sees a subtree in both
    /// or in neither.
    pub fn replace_pair(&self, first: CollectionTree, second: CollectionTree) -> bool {
        let ids = [first.collection_id().clone(), second.collection_id().clone()];
        let replaced = {
            let mut collections = self.collections.write();
            if !ids.iter().all(|id| collections.contains_key(id)) {
                false
            } else {
                for tree in [first, second] {
                    if let Some(cached) = collections.get_mut(tree.collection_id()) {
                        cached.tree = tree;
                    }
                }
                true
            }
        };
        if replaced {
            for id in ids {
                self.publish(CacheEvent::TreeChanged(id));
            }
        }
        replaced
    }

    /// Subscribe to changes of one collection, or of all when `None`.
    pub fn subscribe(&self, collection_id: Option<CollectionId>) -> CacheSubscription {
        CacheSubscription {
            filter: collection_id,
            receiver: self.events.subscribe(),
        }
    }
}

pub struct CacheSubscription {
    filter: Option<CollectionId>,
    receiver: broadcast::Receiver<CacheEvent>,
}

impl CacheSubscription {
    /// Next matching event. Returns `None` once the cache is gone. A lagging
    /// subscriber skips what it missed and keeps going.
    pub async fn next(&mut self) -> Option<CacheEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Cache subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Self::next`].
    pub fn try_next(&mut self) -> Option<CacheEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    fn matches(&self, event: &CacheEvent) -> bool {
        match &self.filter {
            Some(id) => event.concerns(id),
            None => true,
        }
    }
}
