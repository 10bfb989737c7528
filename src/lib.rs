//! Orchard: ordered, path-addressed collection trees
//!
//! Collections hold trees of directories and items. Nodes are rearranged by
//! drag and drop: a classifier decides which drops are legal, a resolver
//! turns the pointer position into one instruction, the engine applies it to
//! the tree, and the synchronizer persists the resulting order and path
//! changes before the reconciler folds the store's answer back into the
//! shared cache. [`forest::Forest`] ties these together.

pub mod cache;
pub mod collection;
pub mod concurrency;
pub mod config;
pub mod coordinator;
pub mod drag;
pub mod edit;
pub mod engine;
pub mod error;
pub mod forest;
pub mod logging;
pub mod service;
pub mod sync;
pub mod tooling;
pub mod tree;
pub mod types;

pub use collection::{CollectionRoot, Layout};
pub use error::ApiError;
pub use forest::Forest;
pub use types::{CollectionId, EntryId, Order};
