//! Persisted-field change planning.
//!
//! Turns a committed local mutation into the smallest batch of store calls
//! that makes the store agree with the new tree. Within a collection only
//! the touched sibling lists are diffed; a move across collections becomes
//! delete + sibling updates + batch create, since the store has no move
//! primitive that crosses collections.

use crate::collection::CollectionUpdate;
use crate::engine::{MoveOutcome, TransferOutcome};
use crate::tree::{CollectionTree, EntryClass, EntryInfo, EntryKind, EntryPath, ParentRef};
use crate::types::{CollectionId, EntryId, Order};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fields of a partial entry update. `path` is the destination directory,
/// not the entry's own path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFields {
    pub id: EntryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<EntryPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Partial update of one entry, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryUpdate {
    #[serde(rename = "DIR")]
    Dir(UpdateFields),
    #[serde(rename = "ITEM")]
    Item(UpdateFields),
}

impl EntryUpdate {
    pub fn new(kind: EntryKind, id: EntryId) -> Self {
        let fields = UpdateFields {
            id,
            ..UpdateFields::default()
        };
        match kind {
            EntryKind::Dir => EntryUpdate::Dir(fields),
            EntryKind::Item => EntryUpdate::Item(fields),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            EntryUpdate::Dir(_) => EntryKind::Dir,
            EntryUpdate::Item(_) => EntryKind::Item,
        }
    }

    pub fn fields(&self) -> &UpdateFields {
        match self {
            EntryUpdate::Dir(fields) | EntryUpdate::Item(fields) => fields,
        }
    }

    fn fields_mut(&mut self) -> &mut UpdateFields {
        match self {
            EntryUpdate::Dir(fields) | EntryUpdate::Item(fields) => fields,
        }
    }

    pub fn id(&self) -> &EntryId {
        &self.fields().id
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.fields_mut().order = Some(order);
        self
    }

    pub fn with_path(mut self, path: EntryPath) -> Self {
        self.fields_mut().path = Some(path);
        self
    }

    pub fn with_expanded(mut self, expanded: bool) -> Self {
        self.fields_mut().expanded = Some(expanded);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.fields_mut().name = Some(name.into());
        self
    }
}

/// Fields of a new entry. `path` is the parent directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFields {
    pub name: String,
    pub path: EntryPath,
    pub order: Order,
    pub class: EntryClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default)]
    pub configuration: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateEntry {
    #[serde(rename = "DIR")]
    Dir(CreateFields),
    #[serde(rename = "ITEM")]
    Item(CreateFields),
}

impl CreateEntry {
    pub fn new(kind: EntryKind, fields: CreateFields) -> Self {
        match kind {
            EntryKind::Dir => CreateEntry::Dir(fields),
            EntryKind::Item => CreateEntry::Item(fields),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            CreateEntry::Dir(_) => EntryKind::Dir,
            CreateEntry::Item(_) => EntryKind::Item,
        }
    }

    pub fn fields(&self) -> &CreateFields {
        match self {
            CreateEntry::Dir(fields) | CreateEntry::Item(fields) => fields,
        }
    }

    /// Full path the created entry will have.
    pub fn entry_path(&self) -> EntryPath {
        let fields = self.fields();
        fields.path.join(&fields.name)
    }
}

/// A sibling list to reload from the store after a write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefetchTarget {
    pub collection_id: CollectionId,
    pub path: EntryPath,
}

/// Delete + recreate of a subtree across collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
    pub delete: EntryId,
    pub source_updates: Vec<EntryUpdate>,
    pub target_updates: Vec<EntryUpdate>,
    /// Pre-order: every directory precedes its contents.
    pub creates: Vec<CreateEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanKind {
    Update {
        collection_id: CollectionId,
        updates: Vec<EntryUpdate>,
    },
    Create {
        collection_id: CollectionId,
        entry: CreateEntry,
    },
    Delete {
        collection_id: CollectionId,
        id: EntryId,
        sibling_updates: Vec<EntryUpdate>,
    },
    Transfer(TransferPlan),
    Collections {
        updates: Vec<CollectionUpdate>,
    },
}

/// Store calls for one local mutation, followed by targeted reloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub kind: PlanKind,
    pub refetch: Vec<RefetchTarget>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            PlanKind::Update { updates, .. } => updates.is_empty(),
            PlanKind::Collections { updates } => updates.is_empty(),
            PlanKind::Create { .. } | PlanKind::Delete { .. } | PlanKind::Transfer(_) => false,
        }
    }

    /// Collections written by this plan, sorted and deduplicated.
    pub fn collections(&self) -> Vec<CollectionId> {
        let mut ids = match &self.kind {
            PlanKind::Update { collection_id, .. }
            | PlanKind::Create { collection_id, .. }
            | PlanKind::Delete { collection_id, .. } => vec![collection_id.clone()],
            PlanKind::Transfer(plan) => vec![
                plan.source_collection.clone(),
                plan.target_collection.clone(),
            ],
            PlanKind::Collections { updates } => updates.iter().map(|u| u.id.clone()).collect(),
        };
        ids.extend(self.refetch.iter().map(|t| t.collection_id.clone()));
        ids.sort();
        ids.dedup();
        ids
    }
}

fn push_refetch(targets: &mut Vec<RefetchTarget>, collection_id: &CollectionId, path: EntryPath) {
    let target = RefetchTarget {
        collection_id: collection_id.clone(),
        path,
    };
    if !targets.contains(&target) {
        targets.push(target);
    }
}

/// Order updates for every node of `after`'s `parent` list whose order
/// differs from `before`. Ids unknown to `before` are skipped, as is `skip`.
fn diff_sibling_orders(
    before: &CollectionTree,
    after: &CollectionTree,
    parent: &ParentRef,
    skip: Option<&EntryId>,
) -> Vec<EntryUpdate> {
    after
        .child_nodes(parent)
        .filter(|node| Some(&node.id) != skip)
        .filter_map(|node| {
            let previous = before.get(&node.id)?;
            (previous.order != node.order)
                .then(|| EntryUpdate::new(node.kind, node.id.clone()).with_order(node.order))
        })
        .collect()
}

/// Plan a move inside one collection.
pub fn plan_within(
    before: &CollectionTree,
    after: &CollectionTree,
    outcome: &MoveOutcome,
) -> SyncPlan {
    let collection_id = after.collection_id();
    let reparented = outcome.from != outcome.to;
    let mut updates = Vec::new();

    let mut lists = vec![outcome.to.clone()];
    if reparented {
        lists.push(outcome.from.clone());
    }
    for parent in &lists {
        for update in diff_sibling_orders(before, after, parent, Some(&outcome.moved)) {
            updates.push(update);
        }
    }

    if let (Some(old), Some(new)) = (before.get(&outcome.moved), after.get(&outcome.moved)) {
        if reparented || old.order != new.order {
            let mut update = EntryUpdate::new(new.kind, new.id.clone()).with_order(new.order);
            if reparented {
                update = update.with_path(after.parent_path(&outcome.to));
            }
            updates.insert(0, update);
        }
    }

    let mut refetch = Vec::new();
    push_refetch(&mut refetch, collection_id, before.parent_path(&outcome.from));
    push_refetch(&mut refetch, collection_id, after.parent_path(&outcome.to));

    debug!(
        collection = %collection_id,
        moved = %outcome.moved,
        updates = updates.len(),
        "Planned in-collection move"
    );
    SyncPlan {
        kind: PlanKind::Update {
            collection_id: collection_id.clone(),
            updates,
        },
        refetch,
    }
}

/// Creation records for a captured subtree re-rooted under `destination`.
///
/// Every captured path has the moved root's former parent directory
/// stripped and the destination directory prepended. The root takes
/// `root_order`; descendants keep their orders.
pub fn relocate_captured(
    captured: &[EntryInfo],
    destination: &EntryPath,
    root_order: Order,
) -> Vec<CreateEntry> {
    let Some(root) = captured.first() else {
        return Vec::new();
    };
    let origin = root.path.parent();
    captured
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let relative = entry
                .path
                .strip_prefix(&origin)
                .unwrap_or_else(|| EntryPath::root().join(&entry.name));
            let full = destination.extend(&relative);
            CreateEntry::new(
                entry.kind,
                CreateFields {
                    name: entry.name.clone(),
                    path: full.parent(),
                    order: if index == 0 { root_order } else { entry.order },
                    class: entry.class,
                    protocol: entry.protocol.clone(),
                    configuration: serde_json::Value::Null,
                },
            )
        })
        .collect()
}

/// Plan a move from `source_before` into `target_before`.
pub fn plan_transfer(
    source_before: &CollectionTree,
    source_after: &CollectionTree,
    target_before: &CollectionTree,
    target_after: &CollectionTree,
    transfer: &TransferOutcome,
) -> SyncPlan {
    let outcome = &transfer.outcome;
    let destination = target_after.parent_path(&outcome.to);
    let root_order = target_after
        .get(&outcome.moved)
        .map(|node| node.order)
        .unwrap_or_else(|| outcome.index as Order + 1);

    let plan = TransferPlan {
        source_collection: outcome.source_collection.clone(),
        target_collection: outcome.target_collection.clone(),
        delete: outcome.moved.clone(),
        source_updates: diff_sibling_orders(source_before, source_after, &outcome.from, None),
        target_updates: diff_sibling_orders(
            target_before,
            target_after,
            &outcome.to,
            Some(&outcome.moved),
        ),
        creates: relocate_captured(&transfer.captured, &destination, root_order),
    };

    let mut refetch = Vec::new();
    push_refetch(&mut refetch, &plan.target_collection, destination);
    push_refetch(
        &mut refetch,
        &plan.source_collection,
        source_before.parent_path(&outcome.from),
    );

    debug!(
        from_collection = %plan.source_collection,
        to_collection = %plan.target_collection,
        creates = plan.creates.len(),
        "Planned cross-collection move"
    );
    SyncPlan {
        kind: PlanKind::Transfer(plan),
        refetch,
    }
}

/// Plan a cascading delete; `parent` is the list the node was removed from.
pub fn plan_delete(
    before: &CollectionTree,
    after: &CollectionTree,
    id: &EntryId,
    parent: &ParentRef,
) -> SyncPlan {
    let collection_id = after.collection_id().clone();
    let mut refetch = Vec::new();
    push_refetch(&mut refetch, &collection_id, before.parent_path(parent));
    SyncPlan {
        kind: PlanKind::Delete {
            collection_id,
            id: id.clone(),
            sibling_updates: diff_sibling_orders(before, after, parent, None),
        },
        refetch,
    }
}

pub fn plan_create(tree: &CollectionTree, parent: &ParentRef, entry: CreateEntry) -> SyncPlan {
    let collection_id = tree.collection_id().clone();
    let mut refetch = Vec::new();
    push_refetch(&mut refetch, &collection_id, tree.parent_path(parent));
    SyncPlan {
        kind: PlanKind::Create {
            collection_id,
            entry,
        },
        refetch,
    }
}

/// Plan a rename. The store rewrites descendant paths itself.
pub fn plan_rename(tree: &CollectionTree, id: &EntryId, name: &str) -> Option<SyncPlan> {
    let node = tree.get(id)?;
    let parent = tree.parent_of(id)?;
    let collection_id = tree.collection_id().clone();
    let mut refetch = Vec::new();
    push_refetch(&mut refetch, &collection_id, tree.parent_path(parent));
    Some(SyncPlan {
        kind: PlanKind::Update {
            collection_id,
            updates: vec![EntryUpdate::new(node.kind, id.clone()).with_name(name)],
        },
        refetch,
    })
}

/// Plan expanded-flag changes. Nothing moves, so nothing is reloaded.
pub fn plan_expanded(tree: &CollectionTree, ids: &[EntryId], expanded: bool) -> SyncPlan {
    let updates = ids
        .iter()
        .filter_map(|id| tree.get(id))
        .map(|node| EntryUpdate::new(node.kind, node.id.clone()).with_expanded(expanded))
        .collect();
    SyncPlan {
        kind: PlanKind::Update {
            collection_id: tree.collection_id().clone(),
            updates,
        },
        refetch: Vec::new(),
    }
}

pub fn plan_collections(updates: Vec<CollectionUpdate>) -> SyncPlan {
    SyncPlan {
        kind: PlanKind::Collections { updates },
        refetch: Vec::new(),
    }
}
