//! Cache reconciliation.
//!
//! Folds store responses back into the cache. The store is authoritative:
//! returned records replace cached ones by id, and every merge rebuilds the
//! tree from the merged flat list so paths and parent links come from one
//! consistent source.

use crate::cache::TreeCache;
use crate::collection::CollectionRoot;
use crate::tree::{name_key, CollectionTree, EntryInfo, EntryPath};
use crate::types::{CollectionId, EntryId};
use std::collections::HashMap;
use tracing::debug;

/// How much of the cached collection a response covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeScope {
    /// Everything: entries missing from the response are gone.
    Snapshot,
    /// Everything strictly below the path: cached entries there that are
    /// missing from the response are gone.
    Path(EntryPath),
    /// Only the returned records; everything else keeps its cached value.
    Records,
}

fn under(path: &EntryPath, scope: &EntryPath) -> bool {
    path.len() > scope.len()
        && path
            .segments()
            .iter()
            .zip(scope.segments())
            .all(|(a, b)| name_key(a) == name_key(b))
}

/// Merge `incoming` into `current` according to `scope`.
pub fn merge_entries(
    current: Vec<EntryInfo>,
    scope: &MergeScope,
    incoming: Vec<EntryInfo>,
) -> Vec<EntryInfo> {
    let mut merged: Vec<EntryInfo> = match scope {
        MergeScope::Snapshot => Vec::new(),
        MergeScope::Path(path) if path.is_root() => Vec::new(),
        MergeScope::Path(path) => current.into_iter().filter(|e| !under(&e.path, path)).collect(),
        MergeScope::Records => current,
    };

    let mut positions: HashMap<EntryId, usize> = merged
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.id.clone(), index))
        .collect();
    for entry in incoming {
        match positions.get(&entry.id) {
            Some(&index) => merged[index] = entry,
            None => {
                positions.insert(entry.id.clone(), merged.len());
                merged.push(entry);
            }
        }
    }
    merged
}

/// Applies store responses to a [`TreeCache`].
pub struct Reconciler<'a> {
    cache: &'a TreeCache,
}

impl<'a> Reconciler<'a> {
    pub fn new(cache: &'a TreeCache) -> Self {
        Reconciler { cache }
    }

    fn rebuild(&self, collection_id: &CollectionId, scope: MergeScope, incoming: Vec<EntryInfo>) -> bool {
        let Some(tree) = self.cache.tree(collection_id) else {
            return false;
        };
        let incoming_count = incoming.len();
        let merged = merge_entries(tree.entries(), &scope, incoming);
        let rebuilt = CollectionTree::hydrate(collection_id.clone(), tree.layout(), merged);
        debug!(
            collection = %collection_id,
            scope = ?scope,
            incoming = incoming_count,
            entries = rebuilt.len(),
            "Reconciled cache"
        );
        self.cache.replace_tree(rebuilt)
    }

    /// Replace a collection's tree with a full snapshot.
    pub fn apply_snapshot(&self, collection_id: &CollectionId, entries: Vec<EntryInfo>) -> bool {
        self.rebuild(collection_id, MergeScope::Snapshot, entries)
    }

    /// Replace everything below `path` with a scoped reload.
    pub fn apply_path(
        &self,
        collection_id: &CollectionId,
        path: &EntryPath,
        entries: Vec<EntryInfo>,
    ) -> bool {
        self.rebuild(collection_id, MergeScope::Path(path.clone()), entries)
    }

    /// Upsert canonical records returned by a write.
    pub fn merge_records(&self, collection_id: &CollectionId, records: Vec<EntryInfo>) -> bool {
        if records.is_empty() {
            return self.cache.contains(collection_id);
        }
        self.rebuild(collection_id, MergeScope::Records, records)
    }

    pub fn apply_collections(&self, roots: &[CollectionRoot]) {
        if !roots.is_empty() {
            self.cache.update_roots(roots);
        }
    }
}
