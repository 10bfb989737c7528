//! Collection roots: named containers that own one tree each.

use crate::types::{CollectionId, Order};
use serde::{Deserialize, Serialize};

/// How a collection arranges its top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Layout {
    /// Top-level entries sit directly under the collection; paths exclude
    /// the collection itself.
    #[default]
    Flat,
    /// One fixed category directory per class; paths start with the
    /// category name and category roots cannot be moved.
    Partitioned,
}

/// Collection metadata as kept by the store and the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRoot {
    pub id: CollectionId,
    pub name: String,
    pub order: Order,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub layout: Layout,
}

/// Partial collection update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionUpdate {
    pub id: CollectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CollectionRoot {
    pub fn apply(&mut self, update: &CollectionUpdate) {
        if let Some(order) = update.order {
            self.order = order;
        }
        if let Some(expanded) = update.expanded {
            self.expanded = expanded;
        }
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
    }
}

/// Sort collections by order, ties broken by id.
pub fn sort_collections(collections: &mut [CollectionRoot]) {
    collections.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}
