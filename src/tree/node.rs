//! Tree node types and the flat entry record exchanged with the store.

use crate::tree::path::EntryPath;
use crate::types::{EntryId, Order};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entry kind. Only directories can hold children or be expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Dir,
    Item,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        matches!(self, EntryKind::Dir)
    }
}

/// Domain category. Entries of different classes never reorder among each
/// other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryClass {
    Request,
    Endpoint,
    Component,
    Schema,
}

impl EntryClass {
    pub const ALL: [EntryClass; 4] = [
        EntryClass::Request,
        EntryClass::Endpoint,
        EntryClass::Component,
        EntryClass::Schema,
    ];

    /// Name of the category root directory in a partitioned collection.
    pub fn category_dir(self) -> &'static str {
        match self {
            EntryClass::Request => "requests",
            EntryClass::Endpoint => "endpoints",
            EntryClass::Component => "components",
            EntryClass::Schema => "schemas",
        }
    }

    pub fn from_category_dir(name: &str) -> Option<EntryClass> {
        EntryClass::ALL
            .into_iter()
            .find(|class| class.category_dir() == name)
    }
}

impl fmt::Display for EntryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryClass::Request => "Request",
            EntryClass::Endpoint => "Endpoint",
            EntryClass::Component => "Component",
            EntryClass::Schema => "Schema",
        };
        f.write_str(s)
    }
}

/// Flat entry record: the unit streamed by and written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub id: EntryId,
    pub name: String,
    pub kind: EntryKind,
    pub class: EntryClass,
    pub path: EntryPath,
    pub order: Order,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// A node in a collection tree.
///
/// Children are referenced by id and owned by the tree's arena; the list is
/// kept in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: EntryId,
    pub name: String,
    pub kind: EntryKind,
    pub class: EntryClass,
    pub order: Order,
    pub path: EntryPath,
    pub expanded: bool,
    pub protocol: Option<String>,
    pub(crate) children: Vec<EntryId>,
}

impl TreeNode {
    pub fn from_info(info: EntryInfo) -> Self {
        let expanded = info.kind.is_dir() && info.expanded;
        TreeNode {
            id: info.id,
            name: info.name,
            kind: info.kind,
            class: info.class,
            order: info.order,
            path: info.path,
            expanded,
            protocol: info.protocol,
            children: Vec::new(),
        }
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            class: self.class,
            path: self.path.clone(),
            order: self.order,
            expanded: self.expanded,
            protocol: self.protocol.clone(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn children(&self) -> &[EntryId] {
        &self.children
    }
}

/// Input for creating a node locally or in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub name: String,
    pub kind: EntryKind,
    pub class: EntryClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl NewEntry {
    pub fn dir(name: impl Into<String>, class: EntryClass) -> Self {
        NewEntry {
            name: name.into(),
            kind: EntryKind::Dir,
            class,
            protocol: None,
        }
    }

    pub fn item(name: impl Into<String>, class: EntryClass) -> Self {
        NewEntry {
            name: name.into(),
            kind: EntryKind::Item,
            class,
            protocol: None,
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }
}
