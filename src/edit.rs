//! Add and rename forms.
//!
//! A pending edit holds the draft name while the user types. It validates
//! against the live tree on every keystroke and on commit; cancelling drops
//! it with no effect on the tree.

use crate::error::{TreeError, ValidationError};
use crate::tree::{validate_name, CollectionTree, EntryClass, EntryKind, NewEntry, ParentRef};
use crate::types::{CollectionId, EntryId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    Add {
        parent: ParentRef,
        kind: EntryKind,
        class: EntryClass,
        protocol: Option<String>,
    },
    Rename {
        id: EntryId,
    },
}

/// A validated edit, ready for the forest to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    Add {
        collection_id: CollectionId,
        parent: ParentRef,
        entry: NewEntry,
    },
    Rename {
        collection_id: CollectionId,
        id: EntryId,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    collection_id: CollectionId,
    kind: EditKind,
    draft: String,
}

impl PendingEdit {
    pub fn add(
        collection_id: CollectionId,
        parent: ParentRef,
        kind: EntryKind,
        class: EntryClass,
    ) -> Self {
        PendingEdit {
            collection_id,
            kind: EditKind::Add {
                parent,
                kind,
                class,
                protocol: None,
            },
            draft: String::new(),
        }
    }

    /// Start a rename with the current name as the draft.
    pub fn rename(tree: &CollectionTree, id: &EntryId) -> Result<Self, TreeError> {
        let node = tree.node(id)?;
        Ok(PendingEdit {
            collection_id: tree.collection_id().clone(),
            kind: EditKind::Rename { id: id.clone() },
            draft: node.name.clone(),
        })
    }

    pub fn with_protocol(mut self, value: impl Into<String>) -> Self {
        if let EditKind::Add { protocol, .. } = &mut self.kind {
            *protocol = Some(value.into());
        }
        self
    }

    pub fn collection_id(&self) -> &CollectionId {
        &self.collection_id
    }

    pub fn kind(&self) -> &EditKind {
        &self.kind
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Check the draft against `tree` without committing.
    pub fn validate(&self, tree: &CollectionTree) -> Result<String, ValidationError> {
        let name = validate_name(&self.draft)?;
        let (parent, except) = match &self.kind {
            EditKind::Add { parent, .. } => (parent.clone(), None),
            EditKind::Rename { id } => match tree.parent_of(id) {
                Some(parent) => (parent.clone(), Some(id)),
                None => return Ok(name),
            },
        };
        if tree.sibling_named(&parent, &name, except).is_some() {
            return Err(ValidationError::DuplicateName { name });
        }
        Ok(name)
    }

    /// Escape: discard the draft.
    pub fn cancel(self) {}

    pub fn commit(self, tree: &CollectionTree) -> Result<EditCommand, ValidationError> {
        let name = self.validate(tree)?;
        Ok(match self.kind {
            EditKind::Add {
                parent,
                kind,
                class,
                protocol,
            } => EditCommand::Add {
                collection_id: self.collection_id,
                parent,
                entry: NewEntry {
                    name,
                    kind,
                    class,
                    protocol,
                },
            },
            EditKind::Rename { id } => EditCommand::Rename {
                collection_id: self.collection_id,
                id,
                name,
            },
        })
    }
}
