//! Property tests for tree mutations.
//!
//! 1. Every sibling list holds exactly 1..N after any committed move.
//! 2. Structural invariants (acyclic, paths, unique names) always hold.
//! 3. Moves preserve the set of ids.
//! 4. A refused move leaves the tree identical.
//! 5. Moving a node under its own descendant is always refused.
//! 6. Renaming onto a sibling's name is refused and changes nothing.

use orchard::collection::Layout;
use orchard::drag::{Instruction, Operation};
use orchard::engine::{apply_move, MoveTarget};
use orchard::error::{IllegalMove, TreeError, ValidationError};
use orchard::tree::{CollectionTree, EntryClass, NewEntry, ParentRef};
use orchard::types::{CollectionId, EntryId};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

/// Build a tree from (parent choice, is_dir) pairs. Node `i` goes under the
/// root or one of the directories created before it; names are unique.
fn build(shape: &[(usize, bool)]) -> CollectionTree {
    let mut tree = CollectionTree::new(CollectionId::from("c1"), Layout::Flat);
    let mut dirs: Vec<EntryId> = Vec::new();
    for (i, &(choice, is_dir)) in shape.iter().enumerate() {
        let parent = match choice % (dirs.len() + 1) {
            0 => ParentRef::Root,
            n => ParentRef::Dir(dirs[n - 1].clone()),
        };
        let id = EntryId::new(format!("e{}", i));
        let entry = if is_dir {
            NewEntry::dir(format!("n{}", i), EntryClass::Request)
        } else {
            NewEntry::item(format!("n{}", i), EntryClass::Request)
        };
        tree.add(id.clone(), entry, &parent).unwrap();
        if is_dir {
            dirs.push(id);
        }
    }
    tree
}

fn shape() -> impl Strategy<Value = Vec<(usize, bool)>> {
    proptest::collection::vec((0usize..16, any::<bool>()), 2..24)
}

fn moves() -> impl Strategy<Value = Vec<(usize, usize, u8)>> {
    proptest::collection::vec((0usize..64, 0usize..65, 0u8..4), 1..20)
}

fn operation(code: u8) -> Option<Instruction> {
    match code {
        0 => Some(Instruction::available(Operation::ReorderBefore)),
        1 => Some(Instruction::available(Operation::ReorderAfter)),
        2 => Some(Instruction::available(Operation::Combine)),
        _ => None,
    }
}

fn sorted_ids(tree: &CollectionTree) -> Vec<EntryId> {
    let mut ids: Vec<EntryId> = tree.ids().into_iter().collect();
    ids.sort();
    ids
}

// ═════════════════════════════════════════════════════════════════════════
// 1-4. Random move sequences
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn random_moves_keep_every_invariant(shape in shape(), moves in moves()) {
        let mut tree = build(&shape);
        let ids = sorted_ids(&tree);
        let n = ids.len();

        for (source, target, code) in moves {
            let source = ids[source % n].clone();
            let target = if target % (n + 1) == n {
                MoveTarget::Collection
            } else {
                MoveTarget::Entry(ids[target % (n + 1)].clone())
            };
            let before = tree.clone();
            match apply_move(&mut tree, operation(code), &source, &target) {
                Ok(Some(outcome)) => {
                    prop_assert_eq!(&outcome.moved, &source);
                    prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
                    prop_assert!(tree.check_contiguous_orders().is_ok());
                    prop_assert_eq!(sorted_ids(&tree), ids.clone());
                }
                Ok(None) | Err(_) => prop_assert_eq!(&tree, &before),
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. No node ends up under itself
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn moving_under_a_descendant_is_refused(shape in shape(), pick in 0usize..64) {
        let mut tree = build(&shape);
        let ids = sorted_ids(&tree);
        let mut pairs: Vec<(EntryId, EntryId)> = Vec::new();
        for a in &ids {
            for b in &ids {
                if tree.is_descendant(a, b) {
                    pairs.push((a.clone(), b.clone()));
                }
            }
        }
        prop_assume!(!pairs.is_empty());
        let (ancestor, descendant) = pairs[pick % pairs.len()].clone();
        let before = tree.clone();

        for code in 0..3u8 {
            let result = apply_move(
                &mut tree,
                operation(code),
                &ancestor,
                &MoveTarget::Entry(descendant.clone()),
            );
            prop_assert!(result.is_err());
            prop_assert_eq!(&tree, &before);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Rename collisions
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn renaming_onto_a_sibling_name_changes_nothing(shape in shape(), upper in any::<bool>()) {
        let mut tree = build(&shape);
        let roots = tree.roots().to_vec();
        prop_assume!(roots.len() >= 2);
        let taken = tree.node(&roots[1]).unwrap().name.clone();
        let taken = if upper { taken.to_uppercase() } else { taken };
        let before = tree.clone();

        let result = tree.rename(&roots[0], &taken);
        prop_assert!(
            matches!(result, Err(TreeError::Validation(ValidationError::DuplicateName { .. }))),
            "unexpected {:?}",
            result
        );
        prop_assert_eq!(&tree, &before);
    }
}

#[test]
fn descendant_check_is_strict_and_cycle_guard_includes_self() {
    let tree = build(&[(0, true), (1, true), (2, false)]);
    let outer = EntryId::from("e0");
    let inner = EntryId::from("e1");

    assert!(tree.is_descendant(&outer, &inner));
    assert!(!tree.is_descendant(&outer, &outer));
    assert!(tree.is_self_or_descendant(&outer, &outer));
    assert!(!tree.is_descendant(&inner, &outer));

    let mut moved = tree.clone();
    let err = apply_move(
        &mut moved,
        Some(Instruction::available(Operation::Combine)),
        &outer,
        &MoveTarget::Entry(inner.clone()),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TreeError::IllegalMove(IllegalMove::Cycle { .. })
    ));
    assert_eq!(moved, tree);
}
