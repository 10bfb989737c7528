//! Write/reconcile protocol: failures, refetches and lock ordering.

use crate::integration::support::{forest_over, memory_service, orders, FlakyService};
use orchard::collection::{CollectionUpdate, Layout};
use orchard::config::DragConfig;
use orchard::drag::{DragSource, DropTarget, Instruction, Operation};
use orchard::error::{ApiError, PersistenceError};
use orchard::service::PersistenceService;
use orchard::sync::{plan_collections, EntryUpdate, Synchronizer};
use orchard::tree::{EntryClass, EntryKind, NewEntry, ParentRef};
use orchard::types::{CollectionId, EntryId};
use orchard::Forest;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

async fn seed_root(forest: &Forest, cid: &CollectionId, names: &[&str]) -> Vec<EntryId> {
    let mut ids = Vec::new();
    for name in names {
        ids.push(
            forest
                .add_entry(cid, &ParentRef::Root, NewEntry::item(*name, EntryClass::Request))
                .await
                .unwrap(),
        );
    }
    ids
}

fn reorder(cid: &CollectionId, moved: &EntryId, anchor: &EntryId) -> (DragSource, DropTarget) {
    (
        DragSource {
            collection_id: cid.clone(),
            entry: moved.clone(),
        },
        DropTarget::Entry {
            collection_id: cid.clone(),
            entry: anchor.clone(),
        },
    )
}

#[tokio::test]
async fn failed_write_converges_on_the_store() {
    let flaky = Arc::new(FlakyService::new(memory_service()));
    let forest = forest_over(flaky.clone());
    let cid = forest.create_collection("One", Layout::Flat).await.unwrap().id;
    let ids = seed_root(&forest, &cid, &["A", "B", "C"]).await;

    flaky.fail_writes(true);
    let streams_before = flaky.stream_calls.load(Ordering::SeqCst);
    let (source, target) = reorder(&cid, &ids[2], &ids[0]);
    let err = forest
        .apply_instruction(
            &source,
            &target,
            Some(Instruction::available(Operation::ReorderBefore)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Persistence(PersistenceError::Unavailable(_))
    ));
    assert!(flaky.stream_calls.load(Ordering::SeqCst) > streams_before);

    let tree = forest.get_tree(&cid).unwrap();
    assert_eq!(
        orders(&tree, tree.roots()),
        [
            ("A".to_string(), 1),
            ("B".to_string(), 2),
            ("C".to_string(), 3)
        ]
    );
}

#[tokio::test]
async fn failed_transfer_puts_the_subtree_back() {
    let flaky = Arc::new(FlakyService::new(memory_service()));
    let forest = forest_over(flaky.clone());
    let one = forest.create_collection("One", Layout::Flat).await.unwrap().id;
    let two = forest.create_collection("Two", Layout::Flat).await.unwrap().id;
    let moved = seed_root(&forest, &one, &["Moved", "Stays"]).await;
    seed_root(&forest, &two, &["Other"]).await;

    flaky.fail_writes(true);
    let err = forest
        .apply_instruction(
            &DragSource {
                collection_id: one.clone(),
                entry: moved[0].clone(),
            },
            &DropTarget::Collection(two.clone()),
            Some(Instruction::available(Operation::Combine)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Persistence(_)));

    let source = forest.get_tree(&one).unwrap();
    assert!(source.contains(&moved[0]));
    assert_eq!(source.len(), 2);
    let target = forest.get_tree(&two).unwrap();
    let names: Vec<String> = target
        .child_nodes(&ParentRef::Root)
        .map(|n| n.name.clone())
        .collect();
    assert_eq!(names, ["Other"]);
}

#[tokio::test]
async fn without_failure_refetch_the_cache_waits_for_a_refresh() {
    let flaky = Arc::new(FlakyService::new(memory_service()));
    let config = DragConfig {
        refetch_on_failure: false,
        ..DragConfig::default()
    };
    let forest = Forest::new(flaky.clone(), &config);
    let cid = forest.create_collection("One", Layout::Flat).await.unwrap().id;
    let ids = seed_root(&forest, &cid, &["A", "B"]).await;

    flaky.fail_writes(true);
    let (source, target) = reorder(&cid, &ids[1], &ids[0]);
    assert!(forest
        .apply_instruction(
            &source,
            &target,
            Some(Instruction::available(Operation::ReorderBefore)),
        )
        .await
        .is_err());
    let tree = forest.get_tree(&cid).unwrap();
    assert_eq!(tree.roots(), [ids[1].clone(), ids[0].clone()]);

    forest.refresh(&cid).await.unwrap();
    let tree = forest.get_tree(&cid).unwrap();
    assert_eq!(tree.roots(), [ids[0].clone(), ids[1].clone()]);
}

#[test]
fn entry_updates_are_tagged_by_kind_with_only_changed_fields() {
    let update = EntryUpdate::new(EntryKind::Item, EntryId::from("entry-3")).with_order(2);
    assert_eq!(
        serde_json::to_value(&update).unwrap(),
        json!({ "ITEM": { "id": "entry-3", "order": 2 } })
    );

    let update = EntryUpdate::new(EntryKind::Dir, EntryId::from("entry-1"))
        .with_path(orchard::tree::EntryPath::parse("Auth/V1"))
        .with_expanded(true);
    assert_eq!(
        serde_json::to_value(&update).unwrap(),
        json!({
            "DIR": {
                "id": "entry-1",
                "path": { "raw": "Auth/V1", "segments": ["Auth", "V1"] },
                "expanded": true
            }
        })
    );
}

#[tokio::test]
async fn a_held_collection_lock_delays_the_write() {
    let service = memory_service();
    let root = service.create_collection("One", Layout::Flat).await.unwrap();
    let synchronizer = Synchronizer::new(service.clone(), true);

    let guard = synchronizer
        .locks()
        .lock_all(std::slice::from_ref(&root.id))
        .await;
    assert!(synchronizer.locks().is_locked(&root.id));

    let plan = plan_collections(vec![CollectionUpdate {
        id: root.id.clone(),
        expanded: Some(true),
        ..Default::default()
    }]);
    let pending = synchronizer.execute(&plan);
    tokio::pin!(pending);
    assert!(tokio::time::timeout(Duration::from_millis(50), &mut pending)
        .await
        .is_err());

    drop(guard);
    let report = pending.await.unwrap();
    assert!(report.collections.iter().any(|c| c.id == root.id && c.expanded));
    assert!(!synchronizer.locks().is_locked(&root.id));
}

#[tokio::test]
async fn opposite_transfers_do_not_deadlock() {
    let forest = forest_over(memory_service());
    let one = forest.create_collection("One", Layout::Flat).await.unwrap().id;
    let two = forest.create_collection("Two", Layout::Flat).await.unwrap().id;
    let left = seed_root(&forest, &one, &["Left"]).await;
    let right = seed_root(&forest, &two, &["Right"]).await;

    let combine = Some(Instruction::available(Operation::Combine));
    let to_two = DropTarget::Collection(two.clone());
    let to_one = DropTarget::Collection(one.clone());
    let left_source = DragSource {
        collection_id: one.clone(),
        entry: left[0].clone(),
    };
    let right_source = DragSource {
        collection_id: two.clone(),
        entry: right[0].clone(),
    };

    let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            forest.apply_instruction(&left_source, &to_two, combine),
            forest.apply_instruction(&right_source, &to_one, combine),
        )
    })
    .await
    .expect("transfers finished");
    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_some());

    let names = |cid: &CollectionId| -> Vec<String> {
        forest
            .get_tree(cid)
            .unwrap()
            .child_nodes(&ParentRef::Root)
            .map(|n| n.name.clone())
            .collect()
    };
    assert_eq!(names(&one), ["Right"]);
    assert_eq!(names(&two), ["Left"]);
}
