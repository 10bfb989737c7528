//! Collection tree model
//!
//! Ordered, path-addressed trees of directories and items. Every mutation
//! keeps the tree acyclic and single-owner, sibling orders strictly
//! increasing, paths equal to the ancestor name chain, and sibling names
//! unique (case-insensitive).

pub mod arena;
pub mod names;
pub mod node;
pub mod path;
pub mod subtree;
pub mod view;

pub use arena::{CollectionTree, ParentRef};
pub use names::{name_key, names_collide, validate_name};
pub use node::{EntryClass, EntryInfo, EntryKind, NewEntry, TreeNode};
pub use path::EntryPath;
pub use subtree::Subtree;
pub use view::{NodeView, TreeView};
