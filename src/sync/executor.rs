//! Plan execution against the persistence service.

use crate::collection::CollectionRoot;
use crate::concurrency::{CollectionLockManager, WriteGuard};
use crate::error::PersistenceError;
use crate::service::{collect_entries, PersistenceService};
use crate::sync::plan::{EntryUpdate, PlanKind, RefetchTarget, SyncPlan};
use crate::tree::{EntryInfo, EntryPath};
use crate::types::{CollectionId, EntryId};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A sibling list reloaded after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refetched {
    pub collection_id: CollectionId,
    pub path: EntryPath,
    pub entries: Vec<EntryInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Canonical records returned by updates, per collection.
    pub records: Vec<(CollectionId, Vec<EntryInfo>)>,
    pub created: Vec<EntryId>,
    pub collections: Vec<CollectionRoot>,
    pub refetched: Vec<Refetched>,
}

/// A write failed part-way. Whatever could be reloaded is attached so the
/// cache can converge on what the store actually holds.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SyncFailure {
    #[source]
    pub error: PersistenceError,
    pub refetched: Vec<Refetched>,
}

pub struct Synchronizer {
    service: Arc<dyn PersistenceService>,
    locks: Arc<CollectionLockManager>,
    refetch_on_failure: bool,
}

impl Synchronizer {
    pub fn new(service: Arc<dyn PersistenceService>, refetch_on_failure: bool) -> Self {
        Synchronizer {
            service,
            locks: Arc::new(CollectionLockManager::new()),
            refetch_on_failure,
        }
    }

    pub fn service(&self) -> &Arc<dyn PersistenceService> {
        &self.service
    }

    pub fn locks(&self) -> &Arc<CollectionLockManager> {
        &self.locks
    }

    /// Run a plan while holding the write lock of every collection it
    /// touches, then reload its refetch targets.
    pub async fn execute(&self, plan: &SyncPlan) -> Result<SyncReport, SyncFailure> {
        let guard = self.locks.lock_all(&plan.collections()).await;
        self.execute_locked(plan, &guard).await
    }

    /// Run a plan under a guard the caller already holds, so a local
    /// mutation and its write happen under the same lock.
    pub async fn execute_locked(
        &self,
        plan: &SyncPlan,
        _guard: &WriteGuard,
    ) -> Result<SyncReport, SyncFailure> {
        let collections = plan.collections();
        let started = Instant::now();
        let mut report = SyncReport::default();

        match self.write(&plan.kind, &mut report).await {
            Ok(()) => {
                report.refetched = self.refetch(&plan.refetch).await;
                info!(
                    collections = ?collections,
                    created = report.created.len(),
                    refetched = report.refetched.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Synchronized plan"
                );
                Ok(report)
            }
            Err(error) => {
                warn!(collections = ?collections, error = %error, "Synchronization failed");
                let refetched = if self.refetch_on_failure {
                    self.refetch(&plan.refetch).await
                } else {
                    Vec::new()
                };
                Err(SyncFailure { error, refetched })
            }
        }
    }

    async fn update(
        &self,
        collection_id: &CollectionId,
        updates: &[EntryUpdate],
        report: &mut SyncReport,
    ) -> Result<(), PersistenceError> {
        let records = match updates {
            [] => return Ok(()),
            [single] => vec![self.service.update_entry(collection_id, single).await?],
            many => self.service.batch_update_entry(collection_id, many).await?.records,
        };
        debug!(collection = %collection_id, updates = updates.len(), "Persisted entry updates");
        report.records.push((collection_id.clone(), records));
        Ok(())
    }

    async fn write(&self, kind: &PlanKind, report: &mut SyncReport) -> Result<(), PersistenceError> {
        match kind {
            PlanKind::Update {
                collection_id,
                updates,
            } => self.update(collection_id, updates, report).await,
            PlanKind::Create {
                collection_id,
                entry,
            } => {
                let id = self.service.create_entry(collection_id, entry).await?;
                report.created.push(id);
                Ok(())
            }
            PlanKind::Delete {
                collection_id,
                id,
                sibling_updates,
            } => {
                self.service.delete_entry(collection_id, id).await?;
                self.update(collection_id, sibling_updates, report).await
            }
            PlanKind::Transfer(plan) => {
                self.service
                    .delete_entry(&plan.source_collection, &plan.delete)
                    .await?;
                self.update(&plan.source_collection, &plan.source_updates, report)
                    .await?;
                self.update(&plan.target_collection, &plan.target_updates, report)
                    .await?;
                let ids = self
                    .service
                    .batch_create_entry(&plan.target_collection, &plan.creates)
                    .await?;
                report.created.extend(ids);
                Ok(())
            }
            PlanKind::Collections { updates } => {
                if !updates.is_empty() {
                    report.collections = self.service.batch_update_collection(updates).await?;
                }
                Ok(())
            }
        }
    }

    async fn refetch(&self, targets: &[RefetchTarget]) -> Vec<Refetched> {
        let mut out = Vec::with_capacity(targets.len());
        for target in targets {
            match collect_entries(self.service.as_ref(), &target.collection_id, Some(&target.path)).await {
                Ok(entries) => out.push(Refetched {
                    collection_id: target.collection_id.clone(),
                    path: target.path.clone(),
                    entries,
                }),
                Err(err) => warn!(
                    collection = %target.collection_id,
                    path = %target.path,
                    error = %err,
                    "Refetch failed"
                ),
            }
        }
        out
    }
}
