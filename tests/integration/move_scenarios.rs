//! Move scenarios through the forest, checked against both the cache and a
//! fresh load from the store.

use crate::integration::support::{forest_over, memory_service, orders};
use orchard::collection::Layout;
use orchard::drag::{DragSource, DropTarget, Instruction, Operation};
use orchard::tree::{CollectionTree, EntryClass, NewEntry, ParentRef};
use orchard::types::{CollectionId, EntryId};
use orchard::Forest;
use std::sync::Arc;
use std::time::Duration;

async fn add(forest: &Forest, cid: &CollectionId, parent: &ParentRef, entry: NewEntry) -> EntryId {
    forest.add_entry(cid, parent, entry).await.unwrap()
}

fn dir(name: &str) -> NewEntry {
    NewEntry::dir(name, EntryClass::Request)
}

fn item(name: &str) -> NewEntry {
    NewEntry::item(name, EntryClass::Request)
}

fn by_path(tree: &CollectionTree, raw: &str) -> Option<EntryId> {
    tree.entries()
        .into_iter()
        .find(|e| e.path.raw() == raw)
        .map(|e| e.id)
}

/// The cache after a write must match what a fresh reader loads.
async fn assert_store_agrees(forest: &Forest, cid: &CollectionId) {
    let fresh = forest_over(forest.service().clone());
    fresh.load().await.unwrap();
    let stored = fresh.get_tree(cid).unwrap();
    let cached = forest.get_tree(cid).unwrap();
    assert_eq!(stored.entries().len(), cached.entries().len());
    let mut stored = stored.entries();
    let mut cached = cached.entries();
    stored.sort_by(|a, b| a.id.cmp(&b.id));
    cached.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(stored, cached);
}

#[tokio::test]
async fn reorder_before_first_sibling_renumbers_the_folder() {
    let forest = forest_over(memory_service());
    let cid = forest.create_collection("One", Layout::Flat).await.unwrap().id;
    let a = add(&forest, &cid, &ParentRef::Root, dir("A")).await;
    let folder = ParentRef::Dir(a.clone());
    let b = add(&forest, &cid, &folder, item("B")).await;
    let c = add(&forest, &cid, &folder, item("C")).await;

    let outcome = forest
        .apply_instruction(
            &DragSource {
                collection_id: cid.clone(),
                entry: c.clone(),
            },
            &DropTarget::Entry {
                collection_id: cid.clone(),
                entry: b.clone(),
            },
            Some(Instruction::available(Operation::ReorderBefore)),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.from, outcome.to);

    let tree = forest.get_tree(&cid).unwrap();
    assert_eq!(
        orders(&tree, tree.children(&folder)),
        [("C".to_string(), 1), ("B".to_string(), 2)]
    );
    assert_eq!(tree.node(&a).unwrap().order, 1);
    assert_eq!(tree.node(&c).unwrap().path.raw(), "A/C");
    assert_store_agrees(&forest, &cid).await;
}

#[tokio::test]
async fn combine_into_another_collection_recreates_the_item() {
    let forest = forest_over(memory_service());
    let one = forest.create_collection("One", Layout::Flat).await.unwrap().id;
    let two = forest.create_collection("Two", Layout::Flat).await.unwrap().id;

    let p = add(&forest, &one, &ParentRef::Root, dir("P")).await;
    let p_list = ParentRef::Dir(p.clone());
    add(&forest, &one, &p_list, item("W")).await;
    let x = add(
        &forest,
        &one,
        &p_list,
        NewEntry::item("X", EntryClass::Request).with_protocol("Get"),
    )
    .await;
    add(&forest, &one, &p_list, item("Z")).await;
    let y = add(&forest, &two, &ParentRef::Root, dir("Y")).await;
    add(&forest, &two, &ParentRef::Dir(y.clone()), item("K")).await;

    let mut source_view = forest.register_view(one.clone());
    let mut target_view = forest.register_view(two.clone());

    let outcome = forest
        .apply_instruction(
            &DragSource {
                collection_id: one.clone(),
                entry: x.clone(),
            },
            &DropTarget::Entry {
                collection_id: two.clone(),
                entry: y.clone(),
            },
            Some(Instruction::available(Operation::Combine)),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.is_transfer());
    assert_eq!(outcome.index, 1);

    let source = forest.get_tree(&one).unwrap();
    assert!(!source.contains(&x));
    assert_eq!(
        orders(&source, source.children(&p_list)),
        [("W".to_string(), 1), ("Z".to_string(), 2)]
    );

    let target = forest.get_tree(&two).unwrap();
    let recreated = by_path(&target, "Y/X").expect("X recreated under Y");
    let node = target.node(&recreated).unwrap();
    assert_eq!(node.order, 2);
    assert_eq!(node.protocol.as_deref(), Some("Get"));
    assert_eq!(target.children(&ParentRef::Dir(y)).last(), Some(&recreated));

    // The returned id and the published one name the recreated root.
    assert_ne!(outcome.moved, x);
    assert_eq!(outcome.moved, recreated);
    assert!(target.contains(&outcome.moved));
    assert_eq!(source_view.try_recv().unwrap().moved, recreated);
    assert_eq!(target_view.try_recv().unwrap().moved, recreated);

    assert_store_agrees(&forest, &one).await;
    assert_store_agrees(&forest, &two).await;
}

#[tokio::test]
async fn moving_a_folder_across_collections_carries_its_subtree() {
    let forest = forest_over(memory_service());
    let one = forest.create_collection("One", Layout::Flat).await.unwrap().id;
    let two = forest.create_collection("Two", Layout::Flat).await.unwrap().id;

    let auth = add(&forest, &one, &ParentRef::Root, dir("Auth")).await;
    let tokens = add(&forest, &one, &ParentRef::Dir(auth.clone()), dir("Tokens")).await;
    add(&forest, &one, &ParentRef::Dir(tokens), item("Refresh")).await;
    add(&forest, &one, &ParentRef::Dir(auth.clone()), item("Login")).await;

    let first = add(&forest, &two, &ParentRef::Root, item("First")).await;
    add(&forest, &two, &ParentRef::Root, item("Second")).await;

    forest
        .apply_instruction(
            &DragSource {
                collection_id: one.clone(),
                entry: auth,
            },
            &DropTarget::Entry {
                collection_id: two.clone(),
                entry: first,
            },
            Some(Instruction::available(Operation::ReorderBefore)),
        )
        .await
        .unwrap()
        .unwrap();

    assert!(forest.get_tree(&one).unwrap().is_empty());
    let target = forest.get_tree(&two).unwrap();
    let names: Vec<(String, u32)> = target
        .child_nodes(&ParentRef::Root)
        .map(|n| (n.name.clone(), n.order))
        .collect();
    assert_eq!(
        names,
        [
            ("Auth".to_string(), 1),
            ("First".to_string(), 2),
            ("Second".to_string(), 3)
        ]
    );
    for raw in ["Auth/Tokens", "Auth/Tokens/Refresh", "Auth/Login"] {
        assert!(by_path(&target, raw).is_some(), "missing {}", raw);
    }
    target.check_invariants().unwrap();
    target.check_contiguous_orders().unwrap();
    assert_store_agrees(&forest, &two).await;
}

#[tokio::test]
async fn folder_moves_rewrite_descendant_paths() {
    let forest = forest_over(memory_service());
    let cid = forest.create_collection("One", Layout::Flat).await.unwrap().id;
    let auth = add(&forest, &cid, &ParentRef::Root, dir("Auth")).await;
    let v1 = add(&forest, &cid, &ParentRef::Dir(auth.clone()), dir("V1")).await;
    let login = add(&forest, &cid, &ParentRef::Dir(v1.clone()), item("Login")).await;
    let archive = add(&forest, &cid, &ParentRef::Root, dir("Archive")).await;

    forest
        .apply_instruction(
            &DragSource {
                collection_id: cid.clone(),
                entry: v1.clone(),
            },
            &DropTarget::Entry {
                collection_id: cid.clone(),
                entry: archive.clone(),
            },
            None,
        )
        .await
        .unwrap()
        .unwrap();

    let tree = forest.get_tree(&cid).unwrap();
    assert_eq!(tree.node(&login).unwrap().path.raw(), "Archive/V1/Login");
    assert!(tree.children(&ParentRef::Dir(auth)).is_empty());
    assert_store_agrees(&forest, &cid).await;
}

#[tokio::test]
async fn rename_and_delete_keep_the_store_in_step() {
    let forest = forest_over(memory_service());
    let cid = forest.create_collection("One", Layout::Flat).await.unwrap().id;
    let auth = add(&forest, &cid, &ParentRef::Root, dir("Auth")).await;
    let login = add(&forest, &cid, &ParentRef::Dir(auth.clone()), item("Login")).await;
    let users = add(&forest, &cid, &ParentRef::Root, dir("Users")).await;
    let notes = add(&forest, &cid, &ParentRef::Root, item("Notes")).await;

    forest.rename_entry(&cid, &auth, "Session").await.unwrap();
    let tree = forest.get_tree(&cid).unwrap();
    assert_eq!(tree.node(&login).unwrap().path.raw(), "Session/Login");

    let err = forest.rename_entry(&cid, &users, "notes").await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(forest.get_tree(&cid).unwrap(), tree);

    forest.delete_entry(&cid, &auth).await.unwrap();
    let tree = forest.get_tree(&cid).unwrap();
    assert!(!tree.contains(&login));
    assert_eq!(
        orders(&tree, tree.roots()),
        [("Users".to_string(), 1), ("Notes".to_string(), 2)]
    );
    assert_eq!(tree.node(&notes).unwrap().order, 2);
    assert_store_agrees(&forest, &cid).await;
}

#[tokio::test]
async fn collections_reorder_among_themselves() {
    let forest = forest_over(memory_service());
    let mut ids = Vec::new();
    for name in ["One", "Two", "Three"] {
        ids.push(forest.create_collection(name, Layout::Flat).await.unwrap().id);
    }

    let collections = forest
        .reorder_collection(&ids[2], &ids[0], Operation::ReorderBefore)
        .await
        .unwrap();
    let names: Vec<(&str, u32)> = collections
        .iter()
        .map(|c| (c.name.as_str(), c.order))
        .collect();
    assert_eq!(names, [("Three", 1), ("One", 2), ("Two", 3)]);

    let err = forest
        .reorder_collection(&ids[0], &ids[0], Operation::ReorderAfter)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("blocked"));

    let fresh = forest_over(Arc::clone(forest.service()));
    let reloaded = fresh.load().await.unwrap();
    let names: Vec<&str> = reloaded.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Three", "One", "Two"]);
}

#[tokio::test]
async fn collection_reorder_waits_for_held_locks_before_reading() {
    let forest = forest_over(memory_service());
    let mut ids = Vec::new();
    for name in ["One", "Two", "Three"] {
        ids.push(forest.create_collection(name, Layout::Flat).await.unwrap().id);
    }

    // "Two" is neither source nor target but still gets renumbered.
    let guard = forest.locks().lock_all(std::slice::from_ref(&ids[1])).await;
    let pending = forest.reorder_collection(&ids[2], &ids[0], Operation::ReorderBefore);
    tokio::pin!(pending);
    assert!(tokio::time::timeout(Duration::from_millis(50), &mut pending)
        .await
        .is_err());
    let names: Vec<String> = forest.collections().into_iter().map(|c| c.name).collect();
    assert_eq!(names, ["One", "Two", "Three"]);

    drop(guard);
    let collections = pending.await.unwrap();
    let names: Vec<(&str, u32)> = collections
        .iter()
        .map(|c| (c.name.as_str(), c.order))
        .collect();
    assert_eq!(names, [("Three", 1), ("One", 2), ("Two", 3)]);
}
