//! Drop classification.
//!
//! Decides which of reorder-before, reorder-after and combine are legal for a
//! source node over a drop target, independent of pointer position. The same
//! checks back the mutation engine's validation, so a refused move is refused
//! for the same reason whether it comes from a live drag or a direct call.

use crate::error::{IllegalMove, TreeError};
use crate::tree::{CollectionTree, ParentRef, TreeNode};
use crate::types::{CollectionId, EntryId};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Legality of one drop operation.
///
/// `Blocked` is shown to the user (e.g. a red indicator) but never commits;
/// `NotAvailable` means the operation is not offered at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    Blocked,
    NotAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    ReorderBefore,
    ReorderAfter,
    Combine,
}

impl Operation {
    pub fn is_reorder(self) -> bool {
        matches!(self, Operation::ReorderBefore | Operation::ReorderAfter)
    }
}

/// Legality set over the three operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operations {
    pub reorder_before: Availability,
    pub reorder_after: Availability,
    pub combine: Availability,
}

impl Operations {
    pub const NONE: Operations = Operations {
        reorder_before: Availability::NotAvailable,
        reorder_after: Availability::NotAvailable,
        combine: Availability::NotAvailable,
    };

    pub fn get(&self, operation: Operation) -> Availability {
        match operation {
            Operation::ReorderBefore => self.reorder_before,
            Operation::ReorderAfter => self.reorder_after,
            Operation::Combine => self.combine,
        }
    }

    pub fn set(&mut self, operation: Operation, availability: Availability) {
        match operation {
            Operation::ReorderBefore => self.reorder_before = availability,
            Operation::ReorderAfter => self.reorder_after = availability,
            Operation::Combine => self.combine = availability,
        }
    }

    /// Offered operations (available or blocked).
    pub fn offered(&self, operation: Operation) -> bool {
        self.get(operation) != Availability::NotAvailable
    }
}

/// What the pointer is over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropTarget {
    Entry {
        collection_id: CollectionId,
        entry: EntryId,
    },
    /// The collection's own row: nodes can only be combined into it.
    Collection(CollectionId),
}

impl DropTarget {
    pub fn collection_id(&self) -> &CollectionId {
        match self {
            DropTarget::Entry { collection_id, .. } => collection_id,
            DropTarget::Collection(collection_id) => collection_id,
        }
    }
}

/// The node being dragged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DragSource {
    pub collection_id: CollectionId,
    pub entry: EntryId,
}

/// Reason a specific operation is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub availability: Availability,
    pub reason: TreeError,
}

impl Refusal {
    fn not_available(reason: impl Into<TreeError>) -> Self {
        Refusal {
            availability: Availability::NotAvailable,
            reason: reason.into(),
        }
    }

    fn blocked(reason: impl Into<TreeError>) -> Self {
        Refusal {
            availability: Availability::Blocked,
            reason: reason.into(),
        }
    }
}

fn lookup<'a>(tree: &'a CollectionTree, id: &EntryId) -> Result<&'a TreeNode, Refusal> {
    tree.get(id)
        .ok_or_else(|| Refusal::not_available(TreeError::NotFound(id.clone())))
}

fn same_tree(a: &CollectionTree, b: &CollectionTree) -> bool {
    a.collection_id() == b.collection_id()
}

fn check_movable<'a>(tree: &'a CollectionTree, source: &EntryId) -> Result<&'a TreeNode, Refusal> {
    let node = lookup(tree, source)?;
    if tree.is_category_root(source) {
        return Err(Refusal::not_available(IllegalMove::RootNotMovable(
            source.clone(),
        )));
    }
    Ok(node)
}

fn class_mismatch(source: &TreeNode, target: &TreeNode) -> Refusal {
    Refusal::not_available(IllegalMove::ClassMismatch {
        source_class: source.class.to_string(),
        target_class: target.class.to_string(),
    })
}

/// Check reorder-before/after of `source` next to `target`.
pub fn check_reorder(
    source_tree: &CollectionTree,
    source: &EntryId,
    target_tree: &CollectionTree,
    target: &EntryId,
) -> Result<(), Refusal> {
    let source_node = check_movable(source_tree, source)?;
    let target_node = lookup(target_tree, target)?;
    let local = same_tree(source_tree, target_tree);

    if target_tree.is_category_root(target) {
        return Err(Refusal::not_available(IllegalMove::RootNotMovable(
            target.clone(),
        )));
    }
    if local && source == target {
        return Err(Refusal::not_available(IllegalMove::SelfDrop(source.clone())));
    }
    if source_node.class != target_node.class {
        return Err(class_mismatch(source_node, target_node));
    }
    if local && source_tree.is_descendant(source, target) {
        return Err(Refusal::blocked(IllegalMove::Cycle {
            moved: source.clone(),
            target: target.clone(),
        }));
    }
    let parent = target_tree
        .parent_of(target)
        .cloned()
        .unwrap_or(ParentRef::Root);
    let except = if local { Some(source) } else { None };
    if target_tree
        .sibling_named(&parent, &source_node.name, except)
        .is_some()
    {
        return Err(Refusal::blocked(IllegalMove::NameCollision {
            name: source_node.name.clone(),
        }));
    }
    Ok(())
}

/// Check combining `source` into the directory `target`.
pub fn check_combine(
    source_tree: &CollectionTree,
    source: &EntryId,
    target_tree: &CollectionTree,
    target: &EntryId,
) -> Result<(), Refusal> {
    let source_node = check_movable(source_tree, source)?;
    let target_node = lookup(target_tree, target)?;
    let local = same_tree(source_tree, target_tree);

    if !target_node.is_dir() {
        return Err(Refusal::not_available(IllegalMove::NotADirectory(
            target.clone(),
        )));
    }
    if local && source == target {
        return Err(Refusal::blocked(IllegalMove::SelfDrop(source.clone())));
    }
    if local && source_tree.is_self_or_descendant(source, target) {
        return Err(Refusal::blocked(IllegalMove::Cycle {
            moved: source.clone(),
            target: target.clone(),
        }));
    }
    let except = if local { Some(source) } else { None };
    if target_tree
        .sibling_named(&ParentRef::Dir(target.clone()), &source_node.name, except)
        .is_some()
    {
        return Err(Refusal::blocked(IllegalMove::NameCollision {
            name: source_node.name.clone(),
        }));
    }
    Ok(())
}

/// Container a node lands in when dropped on a collection row: the top
/// level of a flat collection, or the category root matching the node's
/// class in a partitioned one.
pub fn collection_drop_container(
    source_tree: &CollectionTree,
    source: &EntryId,
    target_tree: &CollectionTree,
) -> Result<ParentRef, Refusal> {
    let source_node = check_movable(source_tree, source)?;
    match target_tree.layout() {
        crate::collection::Layout::Flat => Ok(ParentRef::Root),
        crate::collection::Layout::Partitioned => target_tree
            .category_root(source_node.class)
            .map(|root| ParentRef::Dir(root.id.clone()))
            .ok_or_else(|| {
                Refusal::blocked(IllegalMove::ClassMismatch {
                    source_class: source_node.class.to_string(),
                    target_class: "none".to_string(),
                })
            }),
    }
}

/// Check combining `source` into a collection row.
pub fn check_collection_combine(
    source_tree: &CollectionTree,
    source: &EntryId,
    target_tree: &CollectionTree,
) -> Result<ParentRef, Refusal> {
    let container = collection_drop_container(source_tree, source, target_tree)?;
    if let ParentRef::Dir(dir) = &container {
        check_combine(source_tree, source, target_tree, dir)?;
        return Ok(container);
    }
    let source_node = lookup(source_tree, source)?;
    let except = if same_tree(source_tree, target_tree) {
        Some(source)
    } else {
        None
    };
    if target_tree
        .sibling_named(&ParentRef::Root, &source_node.name, except)
        .is_some()
    {
        return Err(Refusal::blocked(IllegalMove::NameCollision {
            name: source_node.name.clone(),
        }));
    }
    Ok(container)
}

fn availability(result: Result<(), Refusal>) -> Availability {
    match result {
        Ok(()) => Availability::Available,
        Err(refusal) => refusal.availability,
    }
}

/// Legality set for dragging `source` over `target`.
///
/// `source_tree` and `target_tree` are the same tree for moves within a
/// collection.
pub fn classify(
    source_tree: &CollectionTree,
    source: &EntryId,
    target_tree: &CollectionTree,
    target: &DropTarget,
) -> Operations {
    let operations = match target {
        DropTarget::Collection(_) => Operations {
            reorder_before: Availability::NotAvailable,
            reorder_after: Availability::NotAvailable,
            combine: availability(
                check_collection_combine(source_tree, source, target_tree).map(|_| ()),
            ),
        },
        DropTarget::Entry { entry, .. } => {
            let reorder = availability(check_reorder(source_tree, source, target_tree, entry));
            Operations {
                reorder_before: reorder,
                reorder_after: reorder,
                combine: availability(check_combine(source_tree, source, target_tree, entry)),
            }
        }
    };
    trace!(
        source = %source,
        target = ?target,
        operations = ?operations,
        "Classified drop target"
    );
    operations
}

/// Collections only reorder among themselves.
pub fn classify_collection_reorder(source: &CollectionId, target: &CollectionId) -> Operations {
    if source == target {
        return Operations::NONE;
    }
    Operations {
        reorder_before: Availability::Available,
        reorder_after: Availability::Available,
        combine: Availability::NotAvailable,
    }
}

/// Whether dropping `source` among the children of `parent` is blocked,
/// for list-level feedback on the container row.
pub fn is_child_drop_blocked(
    parent_tree: &CollectionTree,
    parent: &ParentRef,
    source_tree: &CollectionTree,
    source: &EntryId,
) -> bool {
    let Some(source_node) = source_tree.get(source) else {
        return false;
    };
    let local = same_tree(parent_tree, source_tree);
    if let ParentRef::Dir(dir) = parent {
        match parent_tree.get(dir) {
            Some(dir_node) if dir_node.class != source_node.class => return true,
            Some(_) => {}
            None => return false,
        }
        // A node cannot land inside itself or its own subtree.
        if local && source_tree.is_self_or_descendant(source, dir) {
            return true;
        }
    }
    let except = if local { Some(source) } else { None };
    parent_tree
        .sibling_named(parent, &source_node.name, except)
        .is_some()
}
