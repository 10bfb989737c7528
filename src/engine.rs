//! Mutation engine.
//!
//! Applies a resolved instruction to one tree (or moves a subtree between two
//! trees). Every move is validated with the classifier's checks before the
//! tree is touched, so a refused move leaves the tree exactly as it was.

use crate::collection::{sort_collections, CollectionRoot, CollectionUpdate};
use crate::drag::classifier::{
    check_collection_combine, check_combine, check_reorder, classify_collection_reorder,
    Availability, Operation,
};
use crate::drag::resolver::Instruction;
use crate::error::{ApiError, IllegalMove, TreeError};
use crate::tree::{CollectionTree, EntryInfo, ParentRef, Subtree};
use crate::types::{CollectionId, EntryId, Order};
use tracing::{debug, error};

/// Where the source is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    Entry(EntryId),
    /// The collection row of the destination tree.
    Collection,
}

/// What a committed move did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub moved: EntryId,
    /// `None` for the degenerate append onto a directory.
    pub operation: Option<Operation>,
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
    pub from: ParentRef,
    pub to: ParentRef,
    /// Final index in the destination list.
    pub index: usize,
}

impl MoveOutcome {
    pub fn is_transfer(&self) -> bool {
        self.source_collection != self.target_collection
    }
}

/// A cross-collection move plus the subtree as it was before the move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub outcome: MoveOutcome,
    /// Pre-order records of the moved subtree with its original paths.
    pub captured: Vec<EntryInfo>,
}

enum Anchor {
    Before(EntryId),
    After(EntryId),
    End,
}

struct Destination {
    parent: ParentRef,
    anchor: Anchor,
}

fn refused(refusal: crate::drag::classifier::Refusal) -> TreeError {
    refusal.reason
}

/// Validate and locate the destination. `Ok(None)` is a no-op drop.
fn destination(
    source_tree: &CollectionTree,
    source: &EntryId,
    target_tree: &CollectionTree,
    instruction: Option<Instruction>,
    target: &MoveTarget,
) -> Result<Option<Destination>, TreeError> {
    let Some(instruction) = instruction else {
        return match target {
            MoveTarget::Entry(id) => {
                if !target_tree.node(id)?.is_dir() {
                    return Ok(None);
                }
                check_combine(source_tree, source, target_tree, id).map_err(refused)?;
                Ok(Some(Destination {
                    parent: ParentRef::Dir(id.clone()),
                    anchor: Anchor::End,
                }))
            }
            MoveTarget::Collection => {
                let parent =
                    check_collection_combine(source_tree, source, target_tree).map_err(refused)?;
                Ok(Some(Destination {
                    parent,
                    anchor: Anchor::End,
                }))
            }
        };
    };
    if instruction.blocked {
        return Err(IllegalMove::Blocked.into());
    }

    let destination = match (instruction.operation, target) {
        (Operation::ReorderBefore | Operation::ReorderAfter, MoveTarget::Entry(id)) => {
            check_reorder(source_tree, source, target_tree, id).map_err(refused)?;
            let parent = target_tree
                .parent_of(id)
                .cloned()
                .ok_or_else(|| TreeError::NotFound(id.clone()))?;
            let anchor = if instruction.operation == Operation::ReorderBefore {
                Anchor::Before(id.clone())
            } else {
                Anchor::After(id.clone())
            };
            Destination { parent, anchor }
        }
        (Operation::Combine, MoveTarget::Entry(id)) => {
            check_combine(source_tree, source, target_tree, id).map_err(refused)?;
            Destination {
                parent: ParentRef::Dir(id.clone()),
                anchor: Anchor::End,
            }
        }
        (Operation::Combine, MoveTarget::Collection) => Destination {
            parent: check_collection_combine(source_tree, source, target_tree).map_err(refused)?,
            anchor: Anchor::End,
        },
        (_, MoveTarget::Collection) => return Err(IllegalMove::Blocked.into()),
    };
    Ok(Some(destination))
}

fn insertion_index(tree: &CollectionTree, parent: &ParentRef, anchor: &Anchor) -> usize {
    let list = tree.children(parent);
    match anchor {
        Anchor::Before(id) => list.iter().position(|c| c == id).unwrap_or(list.len()),
        Anchor::After(id) => list
            .iter()
            .position(|c| c == id)
            .map(|i| i + 1)
            .unwrap_or(list.len()),
        Anchor::End => list.len(),
    }
}

fn restore(tree: &mut CollectionTree, subtree: Subtree, parent: &ParentRef, index: usize) {
    if let Err((err, _)) = tree.attach(subtree, parent, index) {
        error!(collection = %tree.collection_id(), error = %err, "Failed to restore detached subtree");
    }
}

/// Apply a move within one tree in place.
///
/// Returns `Ok(None)` when the drop is a no-op (no instruction over an
/// item). On error the tree is unchanged.
pub fn apply_move(
    tree: &mut CollectionTree,
    instruction: Option<Instruction>,
    source: &EntryId,
    target: &MoveTarget,
) -> Result<Option<MoveOutcome>, TreeError> {
    let Some(dest) = destination(tree, source, tree, instruction, target)? else {
        debug!(source = %source, target = ?target, "Drop onto item without instruction ignored");
        return Ok(None);
    };

    let original_index = tree.index_in_parent(source).unwrap_or(0);
    let (subtree, from) = tree.detach(source)?;
    let index = insertion_index(tree, &dest.parent, &dest.anchor);
    if let Err((err, subtree)) = tree.attach(subtree, &dest.parent, index) {
        restore(tree, subtree, &from, original_index);
        return Err(err);
    }

    let outcome = MoveOutcome {
        moved: source.clone(),
        operation: instruction.map(|i| i.operation),
        source_collection: tree.collection_id().clone(),
        target_collection: tree.collection_id().clone(),
        from,
        to: dest.parent,
        index,
    };
    debug!(
        collection = %tree.collection_id(),
        moved = %outcome.moved,
        operation = ?outcome.operation,
        index = outcome.index,
        "Applied move"
    );
    Ok(Some(outcome))
}

/// Copy-on-write form of [`apply_move`]: the input tree is left untouched.
pub fn apply(
    tree: &CollectionTree,
    instruction: Option<Instruction>,
    source: &EntryId,
    target: &MoveTarget,
) -> Result<(CollectionTree, Option<MoveOutcome>), TreeError> {
    let mut next = tree.clone();
    let outcome = apply_move(&mut next, instruction, source, target)?;
    Ok((next, outcome))
}

/// Move a subtree from one collection's tree into another's.
///
/// Both trees are unchanged on error.
pub fn apply_transfer(
    source_tree: &mut CollectionTree,
    target_tree: &mut CollectionTree,
    instruction: Option<Instruction>,
    source: &EntryId,
    target: &MoveTarget,
) -> Result<Option<TransferOutcome>, TreeError> {
    let Some(dest) = destination(source_tree, source, target_tree, instruction, target)? else {
        return Ok(None);
    };

    let captured = source_tree.flatten(source);
    let original_index = source_tree.index_in_parent(source).unwrap_or(0);
    let (subtree, from) = source_tree.detach(source)?;
    let index = insertion_index(target_tree, &dest.parent, &dest.anchor);
    if let Err((err, subtree)) = target_tree.attach(subtree, &dest.parent, index) {
        restore(source_tree, subtree, &from, original_index);
        return Err(err);
    }

    let outcome = MoveOutcome {
        moved: source.clone(),
        operation: instruction.map(|i| i.operation),
        source_collection: source_tree.collection_id().clone(),
        target_collection: target_tree.collection_id().clone(),
        from,
        to: dest.parent,
        index,
    };
    debug!(
        from_collection = %outcome.source_collection,
        to_collection = %outcome.target_collection,
        moved = %outcome.moved,
        entries = captured.len(),
        "Applied cross-collection move"
    );
    Ok(Some(TransferOutcome { outcome, captured }))
}

/// Collections in their new order plus the persisted changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReorder {
    pub collections: Vec<CollectionRoot>,
    pub updates: Vec<CollectionUpdate>,
}

/// Reorder `source` before or after `target` among all collections and
/// renumber them to `1..=N`.
pub fn reorder_collections(
    collections: &[CollectionRoot],
    source: &CollectionId,
    target: &CollectionId,
    operation: Operation,
) -> Result<CollectionReorder, ApiError> {
    let mut ordered = collections.to_vec();
    sort_collections(&mut ordered);
    for id in [source, target] {
        if !ordered.iter().any(|c| &c.id == id) {
            return Err(ApiError::UnknownCollection(id.clone()));
        }
    }
    if classify_collection_reorder(source, target).get(operation) != Availability::Available {
        return Err(IllegalMove::Blocked.into());
    }

    let before: Vec<(CollectionId, Order)> =
        ordered.iter().map(|c| (c.id.clone(), c.order)).collect();
    let position = ordered
        .iter()
        .position(|c| &c.id == source)
        .ok_or_else(|| ApiError::UnknownCollection(source.clone()))?;
    let moving = ordered.remove(position);
    let target_index = ordered
        .iter()
        .position(|c| &c.id == target)
        .ok_or_else(|| ApiError::UnknownCollection(target.clone()))?;
    let index = match operation {
        Operation::ReorderAfter => target_index + 1,
        _ => target_index,
    };
    ordered.insert(index, moving);

    let mut updates = Vec::new();
    for (i, collection) in ordered.iter_mut().enumerate() {
        let order = i as Order + 1;
        let previous = before
            .iter()
            .find(|(id, _)| id == &collection.id)
            .map(|(_, order)| *order);
        if previous != Some(order) {
            updates.push(CollectionUpdate {
                id: collection.id.clone(),
                order: Some(order),
                ..CollectionUpdate::default()
            });
        }
        collection.order = order;
    }
    debug!(source = %source, target = %target, changed = updates.len(), "Reordered collections");
    Ok(CollectionReorder {
        collections: ordered,
        updates,
    })
}
