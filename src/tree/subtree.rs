//! Detached subtrees.
//!
//! A subtree is what [`CollectionTree::detach`](super::CollectionTree::detach)
//! hands back: the moved root plus every descendant, owned and ready to be
//! attached somewhere else (possibly in another collection's tree).

use crate::tree::node::TreeNode;
use crate::types::EntryId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtree {
    pub(crate) root: EntryId,
    pub(crate) nodes: HashMap<EntryId, TreeNode>,
}

impl Subtree {
    pub fn root_id(&self) -> &EntryId {
        &self.root
    }

    pub fn root(&self) -> &TreeNode {
        // The root is inserted on construction and never removed.
        &self.nodes[&self.root]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntryId> {
        self.nodes.keys()
    }
}
