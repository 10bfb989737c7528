//! The forest over the on-disk store survives a reopen.

use orchard::collection::Layout;
use orchard::config::DragConfig;
use orchard::drag::{DragSource, DropTarget, Instruction, Operation};
use orchard::service::{EntryStore, PersistenceService, SledBackend};
use orchard::tree::{EntryClass, NewEntry, ParentRef};
use orchard::Forest;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn open(path: &Path) -> Forest {
    let backend = SledBackend::open(path).unwrap();
    let service: Arc<dyn PersistenceService> = Arc::new(EntryStore::new(backend));
    Forest::new(service, &DragConfig::default())
}

#[tokio::test]
async fn moves_and_expansion_survive_a_reopen() {
    let temp = TempDir::new().unwrap();
    let store = temp.path().join("store");

    let (cid, folder) = {
        let forest = open(&store);
        let cid = forest
            .create_collection("Petstore", Layout::Partitioned)
            .await
            .unwrap()
            .id;
        let tree = forest.get_tree(&cid).unwrap();
        let requests = tree.category_root(EntryClass::Request).unwrap().id.clone();

        let folder = forest
            .add_entry(
                &cid,
                &ParentRef::Dir(requests.clone()),
                NewEntry::dir("Pets", EntryClass::Request),
            )
            .await
            .unwrap();
        let list = forest
            .add_entry(
                &cid,
                &ParentRef::Dir(requests),
                NewEntry::item("List pets", EntryClass::Request).with_protocol("Get"),
            )
            .await
            .unwrap();
        forest
            .apply_instruction(
                &DragSource {
                    collection_id: cid.clone(),
                    entry: list,
                },
                &DropTarget::Entry {
                    collection_id: cid.clone(),
                    entry: folder.clone(),
                },
                Some(Instruction::available(Operation::Combine)),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(forest.set_expanded(&cid, &folder, true).await.unwrap());
        (cid, folder)
    };

    let forest = open(&store);
    let collections = forest.load().await.unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].name, "Petstore");
    assert_eq!(collections[0].layout, Layout::Partitioned);

    let tree = forest.get_tree(&cid).unwrap();
    let node = tree.node(&folder).unwrap();
    assert!(node.expanded);
    assert_eq!(node.path.raw(), "requests/Pets");
    let children: Vec<_> = tree.child_nodes(&ParentRef::Dir(folder)).collect();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].path.raw(), "requests/Pets/List pets");
    assert_eq!(children[0].order, 1);
    assert_eq!(children[0].protocol.as_deref(), Some("Get"));
    tree.check_invariants().unwrap();
}

#[tokio::test]
async fn deleted_collections_stay_deleted() {
    let temp = TempDir::new().unwrap();
    let store = temp.path().join("store");
    {
        let forest = open(&store);
        let keep = forest.create_collection("Keep", Layout::Flat).await.unwrap();
        let doomed = forest.create_collection("Drop", Layout::Flat).await.unwrap();
        forest
            .add_entry(&doomed.id, &ParentRef::Root, NewEntry::item("Gone", EntryClass::Request))
            .await
            .unwrap();
        forest.delete_collection(&doomed.id).await.unwrap();
        assert_eq!(forest.collections().len(), 1);
        assert_eq!(forest.collections()[0].id, keep.id);
    }

    let forest = open(&store);
    let names: Vec<String> = forest
        .load()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, ["Keep"]);
}
