//! Drag gestures end to end: classification, pointer bands, masking and
//! drop outcomes over a forest.

use crate::integration::support::{forest_over, memory_service};
use orchard::collection::Layout;
use orchard::drag::{
    Availability, DragSource, DropTarget, Instruction, Operation, Operations, Point, Rect,
    Resolver,
};
use orchard::error::{ApiError, IllegalMove, TreeError};
use orchard::tree::{EntryClass, NewEntry, ParentRef};
use orchard::types::{CollectionId, EntryId};
use orchard::Forest;

const ROW: Rect = Rect {
    left: 0.0,
    top: 100.0,
    width: 300.0,
    height: 20.0,
};

fn at(fraction: f64) -> Point {
    Point::new(50.0, ROW.top + ROW.height * fraction)
}

fn source(collection_id: &CollectionId, entry: &EntryId) -> DragSource {
    DragSource {
        collection_id: collection_id.clone(),
        entry: entry.clone(),
    }
}

fn over(collection_id: &CollectionId, entry: &EntryId) -> DropTarget {
    DropTarget::Entry {
        collection_id: collection_id.clone(),
        entry: entry.clone(),
    }
}

/// Api: Auth/{Login, Logout}, Users, Notes
async fn fixture() -> (Forest, CollectionId, Vec<EntryId>) {
    let forest = forest_over(memory_service());
    let cid = forest.create_collection("Api", Layout::Flat).await.unwrap().id;
    let add = |parent: ParentRef, entry: NewEntry| {
        let forest = &forest;
        let cid = cid.clone();
        async move { forest.add_entry(&cid, &parent, entry).await.unwrap() }
    };
    let auth = add(ParentRef::Root, NewEntry::dir("Auth", EntryClass::Request)).await;
    let login = add(
        ParentRef::Dir(auth.clone()),
        NewEntry::item("Login", EntryClass::Request),
    )
    .await;
    let logout = add(
        ParentRef::Dir(auth.clone()),
        NewEntry::item("Logout", EntryClass::Request),
    )
    .await;
    let users = add(ParentRef::Root, NewEntry::dir("Users", EntryClass::Request)).await;
    let notes = add(ParentRef::Root, NewEntry::item("Notes", EntryClass::Request)).await;
    (forest, cid, vec![auth, login, logout, users, notes])
}

#[tokio::test]
async fn pointer_bands_over_a_directory_row() {
    let (forest, cid, ids) = fixture().await;
    let (auth, notes) = (&ids[0], &ids[4]);
    // Auth is the first root and collapsed: reorder-after is masked.
    let mut session = forest.begin_drag(source(&cid, notes)).unwrap();

    let top = forest.hover(&mut session, over(&cid, auth), at(0.1), ROW).unwrap();
    assert_eq!(top, Some(Instruction::available(Operation::ReorderBefore)));
    let middle = forest.hover(&mut session, over(&cid, auth), at(0.6), ROW).unwrap();
    assert_eq!(middle, Some(Instruction::available(Operation::Combine)));
    let bottom = forest.hover(&mut session, over(&cid, auth), at(0.95), ROW).unwrap();
    assert_eq!(bottom, Some(Instruction::available(Operation::Combine)));

    let outside = forest
        .hover(&mut session, over(&cid, auth), Point::new(50.0, 10.0), ROW)
        .unwrap();
    assert_eq!(outside, None);
    session.cancel();
}

#[tokio::test]
async fn last_item_offers_reorder_after() {
    let (forest, cid, ids) = fixture().await;
    let (login, notes) = (&ids[1], &ids[4]);
    let mut session = forest.begin_drag(source(&cid, login)).unwrap();

    let low = forest.hover(&mut session, over(&cid, notes), at(0.8), ROW).unwrap();
    assert_eq!(low, Some(Instruction::available(Operation::ReorderAfter)));
    let high = forest.hover(&mut session, over(&cid, notes), at(0.2), ROW).unwrap();
    assert_eq!(high, Some(Instruction::available(Operation::ReorderBefore)));

    let outcome = forest.drop(session).await.unwrap().unwrap();
    assert_eq!(outcome.to, ParentRef::Root);
    let tree = forest.get_tree(&cid).unwrap();
    let names: Vec<&str> = tree
        .child_nodes(&ParentRef::Root)
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(names, ["Auth", "Users", "Login", "Notes"]);
}

#[test]
fn a_custom_edge_fraction_widens_the_reorder_bands() {
    let resolver = Resolver::new(0.4);
    let operations = Operations {
        reorder_before: Availability::Available,
        reorder_after: Availability::Available,
        combine: Availability::Available,
    };
    let last = orchard::drag::RowContext {
        is_last_child: true,
        is_expanded_dir: false,
    };
    assert_eq!(
        resolver.resolve(at(0.35), ROW, operations, last).map(|i| i.operation),
        Some(Operation::ReorderBefore)
    );
    assert_eq!(
        Resolver::default()
            .resolve(at(0.35), ROW, operations, last)
            .map(|i| i.operation),
        Some(Operation::Combine)
    );
}

#[tokio::test]
async fn dropping_a_folder_into_itself_is_blocked_and_changes_nothing() {
    let (forest, cid, ids) = fixture().await;
    let (auth, login) = (&ids[0], &ids[1]);
    let before = forest.get_tree(&cid).unwrap();

    let mut session = forest.begin_drag(source(&cid, auth)).unwrap();
    let instruction = forest
        .hover(&mut session, over(&cid, login), at(0.1), ROW)
        .unwrap()
        .unwrap();
    assert!(instruction.blocked);
    let err = forest.drop(session).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Tree(TreeError::IllegalMove(IllegalMove::Blocked))
    ));
    assert_eq!(forest.get_tree(&cid).unwrap(), before);
}

#[tokio::test]
async fn dropping_nowhere_is_a_no_op() {
    let (forest, cid, ids) = fixture().await;
    let before = forest.get_tree(&cid).unwrap();
    let mut session = forest.begin_drag(source(&cid, &ids[4])).unwrap();
    forest
        .hover(&mut session, over(&cid, &ids[3]), at(0.5), ROW)
        .unwrap();
    session.leave();
    assert!(forest.drop(session).await.unwrap().is_none());
    assert_eq!(forest.get_tree(&cid).unwrap(), before);
}

#[tokio::test]
async fn partitioned_collections_route_drops_by_class() {
    let forest = forest_over(memory_service());
    let flat = forest.create_collection("Scratch", Layout::Flat).await.unwrap().id;
    let parts = forest
        .create_collection("Spec", Layout::Partitioned)
        .await
        .unwrap()
        .id;
    let schema = forest
        .add_entry(&flat, &ParentRef::Root, NewEntry::item("Pet", EntryClass::Schema))
        .await
        .unwrap();

    let tree = forest.get_tree(&parts).unwrap();
    let schemas = tree.category_root(EntryClass::Schema).unwrap().id.clone();
    let requests = tree.category_root(EntryClass::Request).unwrap().id.clone();

    // Category roots never move and never act as reorder anchors.
    let operations = forest
        .begin_drag(source(&parts, &schemas))
        .and_then(|_| forest.legal_operations(&source(&parts, &schemas), &over(&parts, &requests)))
        .unwrap();
    assert_eq!(operations.reorder_before, Availability::NotAvailable);
    assert_eq!(operations.combine, Availability::NotAvailable);

    let into_requests = forest
        .legal_operations(&source(&flat, &schema), &over(&parts, &requests))
        .unwrap();
    // Combining ignores class; only reordering needs a matching one.
    assert_eq!(into_requests.combine, Availability::Available);
    assert_eq!(into_requests.reorder_before, Availability::NotAvailable);

    let row = DropTarget::Collection(parts.clone());
    let operations = forest
        .legal_operations(&source(&flat, &schema), &row)
        .unwrap();
    assert_eq!(operations.combine, Availability::Available);

    let outcome = forest
        .apply_instruction(&source(&flat, &schema), &row, None)
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.is_transfer());
    assert_eq!(outcome.to, ParentRef::Dir(schemas.clone()));

    let tree = forest.get_tree(&parts).unwrap();
    let moved: Vec<String> = tree
        .child_nodes(&ParentRef::Dir(schemas))
        .map(|n| n.path.raw())
        .collect();
    assert_eq!(moved, ["schemas/Pet"]);
    assert!(forest.get_tree(&flat).unwrap().is_empty());
}

#[tokio::test]
async fn child_drop_feedback_for_container_rows() {
    let (forest, cid, ids) = fixture().await;
    let (auth, login, users) = (&ids[0], &ids[1], &ids[3]);
    // Login already lives in Auth, so dropping among Auth's children is fine.
    assert!(!forest
        .child_drop_blocked(&cid, &ParentRef::Dir(auth.clone()), &source(&cid, login))
        .unwrap());

    let other = forest.create_collection("Other", Layout::Flat).await.unwrap().id;
    forest
        .add_entry(&other, &ParentRef::Root, NewEntry::item("login", EntryClass::Request))
        .await
        .unwrap();
    let stranger = forest.get_tree(&other).unwrap().roots()[0].clone();
    assert!(forest
        .child_drop_blocked(&cid, &ParentRef::Dir(auth.clone()), &source(&other, &stranger))
        .unwrap());
    assert!(!forest
        .child_drop_blocked(&cid, &ParentRef::Dir(users.clone()), &source(&other, &stranger))
        .unwrap());
}

fn ops(reorder: Availability, combine: Availability) -> Operations {
    Operations {
        reorder_before: reorder,
        reorder_after: reorder,
        combine,
    }
}

#[tokio::test]
async fn each_refusal_cause_maps_to_its_availability() {
    use Availability::{Available, Blocked, NotAvailable};

    let (forest, cid, ids) = fixture().await;
    let (auth, login, users, notes) = (&ids[0], &ids[1], &ids[3], &ids[4]);
    let add = |cid: &CollectionId, parent: ParentRef, entry: NewEntry| {
        let forest = &forest;
        let cid = cid.clone();
        async move { forest.add_entry(&cid, &parent, entry).await.unwrap() }
    };
    let tokens = add(&cid, ParentRef::Dir(auth.clone()), NewEntry::dir("Tokens", EntryClass::Request)).await;
    add(&cid, ParentRef::Dir(auth.clone()), NewEntry::item("notes", EntryClass::Request)).await;
    let models = add(&cid, ParentRef::Root, NewEntry::dir("Models", EntryClass::Schema)).await;

    let spec = forest
        .create_collection("Spec", Layout::Partitioned)
        .await
        .unwrap()
        .id;
    let tree = forest.get_tree(&spec).unwrap();
    let requests = tree.category_root(EntryClass::Request).unwrap().id.clone();
    let schemas = tree.category_root(EntryClass::Schema).unwrap().id.clone();

    let cases = [
        ("class mismatch", source(&cid, notes), over(&cid, &models), ops(NotAvailable, Available)),
        ("other category", source(&cid, notes), over(&spec, &schemas), ops(NotAvailable, Available)),
        ("combine onto item", source(&cid, login), over(&cid, notes), ops(Available, NotAvailable)),
        ("into own item", source(&cid, auth), over(&cid, login), ops(Blocked, NotAvailable)),
        ("into own folder", source(&cid, auth), over(&cid, &tokens), ops(Blocked, Blocked)),
        ("name taken beside", source(&cid, notes), over(&cid, login), ops(Blocked, NotAvailable)),
        ("name taken inside", source(&cid, notes), over(&cid, auth), ops(Available, Blocked)),
        ("onto itself", source(&cid, users), over(&cid, users), ops(NotAvailable, Blocked)),
        ("fixed source", source(&spec, &requests), over(&spec, &schemas), ops(NotAvailable, NotAvailable)),
        ("fixed anchor", source(&cid, notes), over(&spec, &requests), ops(NotAvailable, Available)),
    ];
    for (cause, from, onto, expected) in cases {
        let actual = forest.legal_operations(&from, &onto).unwrap();
        assert_eq!(actual, expected, "{}", cause);
    }
}

#[tokio::test]
async fn a_folder_cannot_receive_children_inside_its_own_subtree() {
    let (forest, cid, ids) = fixture().await;
    let auth = &ids[0];
    let tokens = forest
        .add_entry(&cid, &ParentRef::Dir(auth.clone()), NewEntry::dir("Tokens", EntryClass::Request))
        .await
        .unwrap();
    let dragged = source(&cid, auth);
    assert!(forest
        .child_drop_blocked(&cid, &ParentRef::Dir(auth.clone()), &dragged)
        .unwrap());
    assert!(forest
        .child_drop_blocked(&cid, &ParentRef::Dir(tokens), &dragged)
        .unwrap());
    assert!(!forest
        .child_drop_blocked(&cid, &ParentRef::Dir(ids[3].clone()), &dragged)
        .unwrap());
}
