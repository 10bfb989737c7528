//! Nested, serializable snapshot of a collection tree for presentation layers.

use crate::tree::arena::{CollectionTree, ParentRef};
use crate::tree::node::{EntryClass, EntryKind};
use crate::types::{CollectionId, EntryId, Order};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub id: EntryId,
    pub name: String,
    pub kind: EntryKind,
    pub class: EntryClass,
    pub order: Order,
    pub path: String,
    pub expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub child_nodes: Vec<NodeView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeView {
    pub collection_id: CollectionId,
    pub child_nodes: Vec<NodeView>,
}

impl TreeView {
    pub fn of(tree: &CollectionTree) -> Self {
        TreeView {
            collection_id: tree.collection_id().clone(),
            child_nodes: build(tree, &ParentRef::Root),
        }
    }

    /// Depth-first search by id.
    pub fn find(&self, id: &EntryId) -> Option<&NodeView> {
        let mut stack: Vec<&NodeView> = self.child_nodes.iter().collect();
        while let Some(node) = stack.pop() {
            if &node.id == id {
                return Some(node);
            }
            stack.extend(node.child_nodes.iter());
        }
        None
    }
}

fn build(tree: &CollectionTree, parent: &ParentRef) -> Vec<NodeView> {
    tree.child_nodes(parent)
        .map(|node| NodeView {
            id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind,
            class: node.class,
            order: node.order,
            path: node.path.raw(),
            expanded: node.expanded,
            protocol: node.protocol.clone(),
            child_nodes: build(tree, &ParentRef::Dir(node.id.clone())),
        })
        .collect()
}
