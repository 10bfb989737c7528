//! Collection tree storage.
//!
//! Nodes live in an arena keyed by id, with a reverse `id -> parent` index so
//! parent lookups are O(1) and ancestor walks are O(depth). Reparenting only
//! touches the two sibling lists involved and the moved subtree's paths.

use crate::collection::Layout;
use crate::error::{IllegalMove, TreeError, ValidationError};
use crate::tree::names::{name_key, names_collide, validate_name};
use crate::tree::node::{EntryClass, EntryInfo, EntryKind, NewEntry, TreeNode};
use crate::tree::path::EntryPath;
use crate::tree::subtree::Subtree;
use crate::types::{CollectionId, EntryId, Order};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Container of a sibling list: the collection itself or a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentRef {
    Root,
    Dir(EntryId),
}

impl ParentRef {
    pub fn dir_id(&self) -> Option<&EntryId> {
        match self {
            ParentRef::Root => None,
            ParentRef::Dir(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTree {
    collection_id: CollectionId,
    layout: Layout,
    nodes: HashMap<EntryId, TreeNode>,
    parents: HashMap<EntryId, ParentRef>,
    roots: Vec<EntryId>,
}

impl CollectionTree {
    pub fn new(collection_id: CollectionId, layout: Layout) -> Self {
        CollectionTree {
            collection_id,
            layout,
            nodes: HashMap::new(),
            parents: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Build a tree from a flat snapshot.
    ///
    /// Parents are located by path. Entries whose parent directory is missing,
    /// duplicate ids and case-insensitive sibling duplicates are dropped with
    /// a warning. Sibling lists are sorted by `order` but not renumbered: the
    /// store's orders are authoritative.
    pub fn hydrate(collection_id: CollectionId, layout: Layout, entries: Vec<EntryInfo>) -> Self {
        let mut tree = CollectionTree::new(collection_id, layout);
        let mut entries = entries;
        entries.sort_by(|a, b| {
            a.path
                .len()
                .cmp(&b.path.len())
                .then_with(|| a.order.cmp(&b.order))
        });

        let mut dirs_by_path: HashMap<Vec<String>, EntryId> = HashMap::new();
        for entry in entries {
            if entry.path.is_empty() {
                warn!(id = %entry.id, "Dropping entry with empty path");
                continue;
            }
            if tree.nodes.contains_key(&entry.id) {
                warn!(id = %entry.id, "Dropping duplicate entry id from snapshot");
                continue;
            }
            let parent_key: Vec<String> = entry
                .path
                .parent()
                .segments()
                .iter()
                .map(|s| name_key(s))
                .collect();
            let parent = if parent_key.is_empty() {
                ParentRef::Root
            } else {
                match dirs_by_path.get(&parent_key) {
                    Some(dir) => ParentRef::Dir(dir.clone()),
                    None => {
                        warn!(
                            id = %entry.id,
                            path = %entry.path,
                            "Dropping orphaned entry: parent directory not in snapshot"
                        );
                        continue;
                    }
                }
            };
            if tree.sibling_named(&parent, &entry.name, None).is_some() {
                warn!(id = %entry.id, name = %entry.name, "Dropping entry with duplicate sibling name");
                continue;
            }

            let parent_path = tree.parent_path(&parent);
            let mut node = TreeNode::from_info(entry);
            node.path = parent_path.join(&node.name);
            if node.is_dir() {
                let key = node.path.segments().iter().map(|s| name_key(s)).collect();
                dirs_by_path.insert(key, node.id.clone());
            }
            let id = node.id.clone();
            tree.nodes.insert(id.clone(), node);
            tree.push_child(&parent, id);
        }

        tree.sort_all_children();
        debug!(
            collection = %tree.collection_id,
            entries = tree.nodes.len(),
            "Hydrated collection tree"
        );
        tree
    }

    pub fn collection_id(&self) -> &CollectionId {
        &self.collection_id
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &EntryId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn node(&self, id: &EntryId) -> Result<&TreeNode, TreeError> {
        self.nodes
            .get(id)
            .ok_or_else(|| TreeError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn roots(&self) -> &[EntryId] {
        &self.roots
    }

    pub fn parent_of(&self, id: &EntryId) -> Option<&ParentRef> {
        self.parents.get(id)
    }

    /// Ids of a sibling list, in display order. Unknown or non-directory
    /// parents have no children.
    pub fn children(&self, parent: &ParentRef) -> &[EntryId] {
        match parent {
            ParentRef::Root => &self.roots,
            ParentRef::Dir(id) => self
                .nodes
                .get(id)
                .map(|node| node.children.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub fn child_nodes<'a>(&'a self, parent: &ParentRef) -> impl Iterator<Item = &'a TreeNode> + 'a {
        self.children(parent)
            .iter()
            .filter_map(move |id| self.nodes.get(id))
    }

    /// Path of the container: the empty path for the collection root.
    pub fn parent_path(&self, parent: &ParentRef) -> EntryPath {
        match parent {
            ParentRef::Root => EntryPath::root(),
            ParentRef::Dir(id) => self
                .nodes
                .get(id)
                .map(|node| node.path.clone())
                .unwrap_or_default(),
        }
    }

    pub fn index_in_parent(&self, id: &EntryId) -> Option<usize> {
        let parent = self.parents.get(id)?;
        self.children(parent).iter().position(|child| child == id)
    }

    pub fn is_last_child(&self, id: &EntryId) -> bool {
        match self.parents.get(id) {
            Some(parent) => self.children(parent).last() == Some(id),
            None => false,
        }
    }

    /// Top-level directory of a partitioned collection.
    pub fn is_category_root(&self, id: &EntryId) -> bool {
        self.layout == Layout::Partitioned && self.parents.get(id) == Some(&ParentRef::Root)
    }

    pub fn category_root(&self, class: EntryClass) -> Option<&TreeNode> {
        if self.layout != Layout::Partitioned {
            return None;
        }
        self.child_nodes(&ParentRef::Root)
            .find(|node| node.is_dir() && node.class == class)
    }

    /// Ancestors of `id`, nearest first. Empty for top-level nodes.
    pub fn ancestors(&self, id: &EntryId) -> Vec<EntryId> {
        let mut out = Vec::new();
        let mut current = self.parents.get(id);
        while let Some(ParentRef::Dir(parent)) = current {
            out.push(parent.clone());
            current = self.parents.get(parent);
        }
        out
    }

    /// True when `node` is strictly below `ancestor`. A node is never its own
    /// descendant; see [`Self::is_self_or_descendant`].
    pub fn is_descendant(&self, ancestor: &EntryId, node: &EntryId) -> bool {
        let mut current = self.parents.get(node);
        while let Some(ParentRef::Dir(parent)) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parents.get(parent);
        }
        false
    }

    pub fn is_self_or_descendant(&self, ancestor: &EntryId, node: &EntryId) -> bool {
        ancestor == node || self.is_descendant(ancestor, node)
    }

    /// Sibling in `parent` whose name collides with `name`, ignoring `except`.
    pub fn sibling_named(
        &self,
        parent: &ParentRef,
        name: &str,
        except: Option<&EntryId>,
    ) -> Option<&TreeNode> {
        self.child_nodes(parent)
            .find(|node| Some(&node.id) != except && names_collide(&node.name, name))
    }

    /// Order for a node appended to `parent`: one past the current maximum.
    pub fn next_order(&self, parent: &ParentRef) -> Order {
        self.child_nodes(parent)
            .map(|node| node.order)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn ensure_container(&self, parent: &ParentRef) -> Result<(), TreeError> {
        if let ParentRef::Dir(id) = parent {
            let node = self.node(id)?;
            if !node.is_dir() {
                return Err(TreeError::NotADirectory(id.clone()));
            }
        }
        Ok(())
    }

    /// Add a new node as the last child of `parent`, with `order = max + 1`.
    pub fn add(
        &mut self,
        id: EntryId,
        entry: NewEntry,
        parent: &ParentRef,
    ) -> Result<&TreeNode, TreeError> {
        let name = validate_name(&entry.name)?;
        self.ensure_container(parent)?;
        if self.nodes.contains_key(&id) {
            return Err(TreeError::Invariant(format!("duplicate entry id {}", id)));
        }
        match parent {
            ParentRef::Root if self.layout == Layout::Partitioned => {
                return Err(TreeError::Invariant(
                    "partitioned collections only hold category roots at the top level"
                        .to_string(),
                ));
            }
            ParentRef::Dir(dir) => {
                let dir_class = self.node(dir)?.class;
                if dir_class != entry.class {
                    return Err(IllegalMove::ClassMismatch {
                        source_class: entry.class.to_string(),
                        target_class: dir_class.to_string(),
                    }
                    .into());
                }
            }
            ParentRef::Root => {}
        }
        if self.sibling_named(parent, &name, None).is_some() {
            return Err(ValidationError::DuplicateName { name }.into());
        }

        let order = self.next_order(parent);
        let path = self.parent_path(parent).join(&name);
        let node = TreeNode {
            id: id.clone(),
            name,
            kind: entry.kind,
            class: entry.class,
            order,
            path,
            expanded: false,
            protocol: entry.protocol,
            children: Vec::new(),
        };
        self.nodes.insert(id.clone(), node);
        self.push_child(parent, id.clone());
        self.node(&id)
    }

    /// Rename a node and rewrite the paths of its whole subtree.
    pub fn rename(&mut self, id: &EntryId, new_name: &str) -> Result<EntryPath, TreeError> {
        let name = validate_name(new_name)?;
        if self.is_category_root(id) {
            return Err(IllegalMove::RootNotMovable(id.clone()).into());
        }
        let parent = self
            .parents
            .get(id)
            .cloned()
            .ok_or_else(|| TreeError::NotFound(id.clone()))?;
        if self.sibling_named(&parent, &name, Some(id)).is_some() {
            return Err(ValidationError::DuplicateName { name }.into());
        }

        let old_path = self.node(id)?.path.clone();
        let new_path = self.parent_path(&parent).join(&name);
        if let Some(node) = self.nodes.get_mut(id) {
            node.name = name;
        }
        self.rewrite_paths(id, &old_path, &new_path);
        Ok(old_path)
    }

    /// Set a directory's expanded flag. Returns whether it changed.
    pub fn set_expanded(&mut self, id: &EntryId, expanded: bool) -> Result<bool, TreeError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NotFound(id.clone()))?;
        if !node.is_dir() {
            return Err(TreeError::NotADirectory(id.clone()));
        }
        let changed = node.expanded != expanded;
        node.expanded = expanded;
        Ok(changed)
    }

    /// Set every directory's expanded flag; returns the ids that changed.
    pub fn set_all_expanded(&mut self, expanded: bool) -> Vec<EntryId> {
        let mut changed: Vec<EntryId> = self
            .nodes
            .values_mut()
            .filter(|node| node.is_dir() && node.expanded != expanded)
            .map(|node| {
                node.expanded = expanded;
                node.id.clone()
            })
            .collect();
        changed.sort();
        changed
    }

    pub fn all_expanded(&self) -> bool {
        self.nodes
            .values()
            .filter(|node| node.is_dir())
            .all(|node| node.expanded)
    }

    pub fn all_collapsed(&self) -> bool {
        self.nodes
            .values()
            .filter(|node| node.is_dir())
            .all(|node| !node.expanded)
    }

    /// Remove a node and all of its descendants, renumbering the siblings it
    /// leaves behind.
    pub fn detach(&mut self, id: &EntryId) -> Result<(Subtree, ParentRef), TreeError> {
        let parent = self
            .parents
            .get(id)
            .cloned()
            .ok_or_else(|| TreeError::NotFound(id.clone()))?;

        if let Some(list) = self.children_mut(&parent) {
            list.retain(|child| child != id);
        }

        let mut nodes = HashMap::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            self.parents.remove(&current);
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children.iter().cloned());
                nodes.insert(current, node);
            }
        }

        self.renumber(&parent);
        Ok((
            Subtree {
                root: id.clone(),
                nodes,
            },
            parent,
        ))
    }

    /// Insert a detached subtree into `parent` at `index` (clamped to the
    /// list length), renumber that list and re-root the subtree's paths.
    ///
    /// Validation happens before anything is touched: on error the tree is
    /// unchanged and the subtree is handed back.
    pub fn attach(
        &mut self,
        subtree: Subtree,
        parent: &ParentRef,
        index: usize,
    ) -> Result<(), (TreeError, Subtree)> {
        if let Err(err) = self.check_attach(&subtree, parent) {
            return Err((err, subtree));
        }

        let Subtree { root, nodes } = subtree;
        let old_path = nodes[&root].path.clone();
        let new_path = self.parent_path(parent).join(&nodes[&root].name);

        for (id, node) in &nodes {
            for child in &node.children {
                self.parents.insert(child.clone(), ParentRef::Dir(id.clone()));
            }
        }
        self.nodes.extend(nodes);
        self.parents.insert(root.clone(), parent.clone());

        if let Some(list) = self.children_mut(parent) {
            let index = index.min(list.len());
            list.insert(index, root.clone());
        }

        self.renumber(parent);
        self.rewrite_paths(&root, &old_path, &new_path);
        Ok(())
    }

    fn check_attach(&self, subtree: &Subtree, parent: &ParentRef) -> Result<(), TreeError> {
        self.ensure_container(parent)?;
        if let ParentRef::Dir(dir) = parent {
            if subtree.contains(dir) {
                return Err(IllegalMove::Cycle {
                    moved: subtree.root_id().clone(),
                    target: dir.clone(),
                }
                .into());
            }
        }
        if let Some(existing) = subtree.ids().find(|id| self.nodes.contains_key(*id)) {
            return Err(TreeError::Invariant(format!(
                "entry {} already present in collection {}",
                existing, self.collection_id
            )));
        }
        let name = &subtree.root().name;
        if self.sibling_named(parent, name, None).is_some() {
            return Err(IllegalMove::NameCollision { name: name.clone() }.into());
        }
        Ok(())
    }

    /// Rewrite a sibling list's orders to `1..=N`.
    fn renumber(&mut self, parent: &ParentRef) {
        let ids = self.children(parent).to_vec();
        for (index, id) in ids.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.order = index as Order + 1;
            }
        }
    }

    /// Replace `old` with `new` as the path prefix of `id` and every
    /// descendant.
    fn rewrite_paths(&mut self, id: &EntryId, old: &EntryPath, new: &EntryPath) {
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            let path = match node.path.replace_prefix(old, new) {
                Some(path) => path,
                None => {
                    // Stale path: rebuild from the parent chain instead.
                    let base = match self.parents.get(&current) {
                        Some(parent) => self.parent_path(parent),
                        None => EntryPath::root(),
                    };
                    base.join(&node.name)
                }
            };
            stack.extend(node.children.iter().cloned());
            if let Some(node) = self.nodes.get_mut(&current) {
                node.path = path;
            }
        }
    }

    /// Pre-order flat records of the subtree rooted at `id`.
    pub fn flatten(&self, id: &EntryId) -> Vec<EntryInfo> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                out.push(node.info());
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Pre-order flat records of the whole tree.
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.roots.iter().flat_map(|id| self.flatten(id)).collect()
    }

    pub fn ids(&self) -> HashSet<EntryId> {
        self.nodes.keys().cloned().collect()
    }

    fn children_mut(&mut self, parent: &ParentRef) -> Option<&mut Vec<EntryId>> {
        match parent {
            ParentRef::Root => Some(&mut self.roots),
            ParentRef::Dir(dir) => self.nodes.get_mut(dir).map(|node| &mut node.children),
        }
    }

    fn push_child(&mut self, parent: &ParentRef, id: EntryId) {
        self.parents.insert(id.clone(), parent.clone());
        if let Some(list) = self.children_mut(parent) {
            list.push(id);
        }
    }

    fn sort_all_children(&mut self) {
        let key = |nodes: &HashMap<EntryId, TreeNode>, id: &EntryId| {
            nodes
                .get(id)
                .map(|n| (n.order, name_key(&n.name)))
                .unwrap_or((Order::MAX, String::new()))
        };
        let mut roots = std::mem::take(&mut self.roots);
        roots.sort_by_cached_key(|id| key(&self.nodes, id));
        self.roots = roots;

        let dir_ids: Vec<EntryId> = self
            .nodes
            .values()
            .filter(|n| !n.children.is_empty())
            .map(|n| n.id.clone())
            .collect();
        for dir in dir_ids {
            let mut children = self
                .nodes
                .get_mut(&dir)
                .map(|n| std::mem::take(&mut n.children))
                .unwrap_or_default();
            children.sort_by_cached_key(|id| key(&self.nodes, id));
            if let Some(node) = self.nodes.get_mut(&dir) {
                node.children = children;
            }
        }
    }

    /// Verify the structural invariants. Orders are only required to be
    /// strictly increasing here; contiguity is checked by
    /// [`Self::check_contiguous_orders`] since hydrated snapshots may carry gaps.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        let invariant = |msg: String| -> Result<(), TreeError> { Err(TreeError::Invariant(msg)) };
        let mut seen = HashSet::new();
        let mut lists: Vec<ParentRef> = vec![ParentRef::Root];
        lists.extend(
            self.nodes
                .values()
                .filter(|n| n.is_dir())
                .map(|n| ParentRef::Dir(n.id.clone())),
        );

        for parent in &lists {
            let parent_path = self.parent_path(parent);
            let mut keys = HashSet::new();
            let mut last_order: Option<Order> = None;
            for id in self.children(parent) {
                if !seen.insert(id.clone()) {
                    return invariant(format!("{} appears in more than one list", id));
                }
                let Some(node) = self.nodes.get(id) else {
                    return invariant(format!("dangling child id {}", id));
                };
                if self.parents.get(id) != Some(parent) {
                    return invariant(format!("parent index out of sync for {}", id));
                }
                if node.path != parent_path.join(&node.name) {
                    return invariant(format!("stale path {} for {}", node.path, id));
                }
                if !keys.insert(name_key(&node.name)) {
                    return invariant(format!("duplicate sibling name {}", node.name));
                }
                if let Some(prev) = last_order {
                    if node.order <= prev {
                        return invariant(format!("order not increasing at {}", id));
                    }
                }
                last_order = Some(node.order);
            }
        }

        for node in self.nodes.values() {
            if node.kind == EntryKind::Item && (!node.children.is_empty() || node.expanded) {
                return invariant(format!("item {} has children or is expanded", node.id));
            }
            if self.is_descendant(&node.id, &node.id) {
                return invariant(format!("{} is its own ancestor", node.id));
            }
        }
        if seen.len() != self.nodes.len() {
            return invariant("unreachable nodes in arena".to_string());
        }
        Ok(())
    }

    /// Every sibling list holds exactly `1..=N`.
    pub fn check_contiguous_orders(&self) -> Result<(), TreeError> {
        let mut lists: Vec<ParentRef> = vec![ParentRef::Root];
        lists.extend(
            self.nodes
                .values()
                .filter(|n| n.is_dir())
                .map(|n| ParentRef::Dir(n.id.clone())),
        );
        for parent in lists {
            for (index, node) in self.child_nodes(&parent).enumerate() {
                if node.order != index as Order + 1 {
                    return Err(TreeError::Invariant(format!(
                        "order {} at position {} for {}",
                        node.order,
                        index + 1,
                        node.id
                    )));
                }
            }
        }
        Ok(())
    }
}
