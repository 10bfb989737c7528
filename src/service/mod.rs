//! Persistence service contract and implementations.
//!
//! [`PersistenceService`] is the request/response contract the synchronizer
//! talks to. [`EntryStore`] implements it over any [`RecordBackend`]; the
//! crate ships an in-memory backend and a sled-backed one.

pub mod backend;
pub mod sled_backend;
pub mod store;

pub use backend::{MemoryBackend, RecordBackend};
pub use sled_backend::SledBackend;
pub use store::EntryStore;

use crate::collection::{CollectionRoot, CollectionUpdate, Layout};
use crate::error::PersistenceError;
use crate::sync::plan::{CreateEntry, EntryUpdate};
use crate::tree::{EntryInfo, EntryPath};
use crate::types::{CollectionId, EntryId};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// Entries of a collection, ordered by depth then sibling order.
pub type EntryStream = BoxStream<'static, EntryInfo>;

/// Result of a batch update: the canonical records after the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdateOutput {
    pub applied: usize,
    pub records: Vec<EntryInfo>,
}

/// Store-side operations on collections and their entries.
///
/// Entry `path` fields in [`CreateEntry`] and [`EntryUpdate`] name the
/// parent directory. Deleting a directory deletes its whole subtree.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<CollectionRoot>, PersistenceError>;

    async fn create_collection(
        &self,
        name: &str,
        layout: Layout,
    ) -> Result<CollectionRoot, PersistenceError>;

    async fn batch_update_collection(
        &self,
        updates: &[CollectionUpdate],
    ) -> Result<Vec<CollectionRoot>, PersistenceError>;

    async fn delete_collection(&self, id: &CollectionId) -> Result<CollectionId, PersistenceError>;

    /// Full snapshot when `path` is `None`, otherwise everything strictly
    /// below `path`.
    async fn stream_entries(
        &self,
        collection_id: &CollectionId,
        path: Option<&EntryPath>,
    ) -> Result<EntryStream, PersistenceError>;

    async fn create_entry(
        &self,
        collection_id: &CollectionId,
        input: &CreateEntry,
    ) -> Result<EntryId, PersistenceError>;

    /// Creates in input order; directories must precede their contents.
    async fn batch_create_entry(
        &self,
        collection_id: &CollectionId,
        inputs: &[CreateEntry],
    ) -> Result<Vec<EntryId>, PersistenceError>;

    async fn update_entry(
        &self,
        collection_id: &CollectionId,
        update: &EntryUpdate,
    ) -> Result<EntryInfo, PersistenceError>;

    /// All-or-nothing.
    async fn batch_update_entry(
        &self,
        collection_id: &CollectionId,
        updates: &[EntryUpdate],
    ) -> Result<BatchUpdateOutput, PersistenceError>;

    async fn delete_entry(
        &self,
        collection_id: &CollectionId,
        id: &EntryId,
    ) -> Result<EntryId, PersistenceError>;
}

/// Drain [`PersistenceService::stream_entries`] into a list.
pub async fn collect_entries(
    service: &dyn PersistenceService,
    collection_id: &CollectionId,
    path: Option<&EntryPath>,
) -> Result<Vec<EntryInfo>, PersistenceError> {
    let stream = service.stream_entries(collection_id, path).await?;
    Ok(stream.collect().await)
}
