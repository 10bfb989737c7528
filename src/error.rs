//! Error types for the tree model, the persistence layer and the public API.

use crate::types::{CollectionId, EntryId};
use thiserror::Error;

/// Rejected add/rename input. Detected before any mutation is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("An entry named '{name}' already exists in this folder")]
    DuplicateName { name: String },
}

/// Why a move was refused by the drop classifier or the mutation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IllegalMove {
    #[error("Cannot drop entry {0} onto itself")]
    SelfDrop(EntryId),

    #[error("Entry {0} is a category root and cannot be moved")]
    RootNotMovable(EntryId),

    #[error("Cannot move a {source_class} entry next to or into a {target_class} entry")]
    ClassMismatch {
        source_class: String,
        target_class: String,
    },

    #[error("Moving {moved} under {target} would create a cycle")]
    Cycle { moved: EntryId, target: EntryId },

    #[error("Destination already contains an entry named '{name}'")]
    NameCollision { name: String },

    #[error("Entry {0} is not a directory")]
    NotADirectory(EntryId),

    #[error("Instruction is blocked")]
    Blocked,
}

/// Tree model errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    IllegalMove(#[from] IllegalMove),

    #[error("Entry not found: {0}")]
    NotFound(EntryId),

    #[error("Entry {0} is not a directory")]
    NotADirectory(EntryId),

    #[error("Tree invariant violated: {0}")]
    Invariant(String),
}

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures reported by the persistence service.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Unknown collection: {0}")]
    UnknownCollection(CollectionId),

    #[error("Entry not found: {0}")]
    NotFound(EntryId),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error returned by the forest facade and the CLI.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Unknown collection: {0}")]
    UnknownCollection(CollectionId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Tree(TreeError::Validation(err))
    }
}

impl From<IllegalMove> for ApiError {
    fn from(err: IllegalMove) -> Self {
        ApiError::Tree(TreeError::IllegalMove(err))
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Persistence(PersistenceError::Storage(err))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
