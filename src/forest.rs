//! Forest: the facade over every collection a workspace holds.
//!
//! Views read snapshots from the shared [`TreeCache`] and subscribe to its
//! events. Every local change follows the same path: take the write lock of
//! the collections involved, mutate a copy of the cached tree, publish the
//! copy optimistically, persist the planned store calls, then reconcile the
//! cache with what the store returned. A failed write is reconciled with
//! whatever could be reloaded before the error is surfaced.

use crate::cache::{CacheSubscription, Reconciler, TreeCache};
use crate::collection::{CollectionRoot, CollectionUpdate, Layout};
use crate::concurrency::{CollectionLockManager, WriteGuard};
use crate::config::DragConfig;
use crate::coordinator::{MoveCoordinator, MoveEndpoint, MoveNotification, ViewHandle};
use crate::drag::{
    classify, classify_collection_reorder, is_child_drop_blocked, DragSession, DragSource,
    DropOutcome, DropTarget, Instruction, Operation, Operations, Point, Rect, Resolver,
    RowContext,
};
use crate::edit::EditCommand;
use crate::engine::{self, MoveOutcome, MoveTarget};
use crate::error::{ApiError, IllegalMove, PersistenceError, TreeError};
use crate::service::{collect_entries, PersistenceService};
use crate::sync::{
    plan_collections, plan_create, plan_delete, plan_expanded, plan_rename, plan_transfer,
    plan_within, CreateEntry, CreateFields, SyncPlan, SyncReport, Synchronizer,
};
use crate::tree::{validate_name, CollectionTree, NewEntry, ParentRef, TreeView};
use crate::types::{CollectionId, EntryId};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct Forest {
    cache: Arc<TreeCache>,
    synchronizer: Synchronizer,
    coordinator: MoveCoordinator,
    resolver: Resolver,
    pending: AtomicU64,
}

impl Forest {
    pub fn new(service: Arc<dyn PersistenceService>, config: &DragConfig) -> Self {
        Forest {
            cache: Arc::new(TreeCache::new()),
            synchronizer: Synchronizer::new(service, config.refetch_on_failure),
            coordinator: MoveCoordinator::new(),
            resolver: Resolver::from_config(config),
            pending: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<TreeCache> {
        &self.cache
    }

    pub fn service(&self) -> &Arc<dyn PersistenceService> {
        self.synchronizer.service()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Per-collection write locks shared by every write path.
    pub fn locks(&self) -> &Arc<CollectionLockManager> {
        self.synchronizer.locks()
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.cache)
    }

    fn tree(&self, collection_id: &CollectionId) -> Result<CollectionTree, ApiError> {
        self.cache
            .tree(collection_id)
            .ok_or_else(|| ApiError::UnknownCollection(collection_id.clone()))
    }

    // ----- reads -----

    /// Load every collection from the store, replacing the cache.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Vec<CollectionRoot>, ApiError> {
        let service = self.service().clone();
        let roots = service.list_collections().await?;
        for root in &roots {
            let entries = collect_entries(service.as_ref(), &root.id, None).await?;
            let tree = CollectionTree::hydrate(root.id.clone(), root.layout, entries);
            self.cache.insert(root.clone(), tree);
        }
        for cached in self.cache.collections() {
            if !roots.iter().any(|root| root.id == cached.id) {
                self.cache.remove(&cached.id);
            }
        }
        info!(collections = roots.len(), "Loaded collections");
        Ok(self.cache.collections())
    }

    /// Reload one collection with a full snapshot.
    pub async fn refresh(&self, collection_id: &CollectionId) -> Result<(), ApiError> {
        if !self.cache.contains(collection_id) {
            return Err(ApiError::UnknownCollection(collection_id.clone()));
        }
        let entries = collect_entries(self.service().as_ref(), collection_id, None).await?;
        self.reconciler().apply_snapshot(collection_id, entries);
        Ok(())
    }

    pub fn collections(&self) -> Vec<CollectionRoot> {
        self.cache.collections()
    }

    pub fn get_tree(&self, collection_id: &CollectionId) -> Result<CollectionTree, ApiError> {
        self.tree(collection_id)
    }

    pub fn view(&self, collection_id: &CollectionId) -> Result<TreeView, ApiError> {
        self.cache
            .view(collection_id)
            .ok_or_else(|| ApiError::UnknownCollection(collection_id.clone()))
    }

    /// Cache events for one collection, or for all of them.
    pub fn subscribe(&self, collection_id: Option<CollectionId>) -> CacheSubscription {
        self.cache.subscribe(collection_id)
    }

    /// Move notifications for a view of `collection_id`.
    pub fn register_view(&self, collection_id: CollectionId) -> ViewHandle {
        self.coordinator.register(collection_id)
    }

    // ----- drag and drop -----

    pub fn begin_drag(&self, source: DragSource) -> Result<DragSession, ApiError> {
        let tree = self.tree(&source.collection_id)?;
        tree.node(&source.entry)?;
        Ok(DragSession::start(source))
    }

    pub fn legal_operations(
        &self,
        source: &DragSource,
        target: &DropTarget,
    ) -> Result<Operations, ApiError> {
        let source_tree = self.tree(&source.collection_id)?;
        let operations = if target.collection_id() == &source.collection_id {
            classify(&source_tree, &source.entry, &source_tree, target)
        } else {
            let target_tree = self.tree(target.collection_id())?;
            classify(&source_tree, &source.entry, &target_tree, target)
        };
        Ok(operations)
    }

    /// Re-resolve the session's instruction for a pointer over `target`.
    pub fn hover(
        &self,
        session: &mut DragSession,
        target: DropTarget,
        pointer: Point,
        rect: Rect,
    ) -> Result<Option<Instruction>, ApiError> {
        let operations = self.legal_operations(session.source(), &target)?;
        let row = match &target {
            DropTarget::Entry {
                collection_id,
                entry,
            } => self
                .cache
                .with_tree(collection_id, |tree| RowContext::of(tree, entry))
                .ok_or_else(|| ApiError::UnknownCollection(collection_id.clone()))?,
            DropTarget::Collection(_) => RowContext::collection(),
        };
        Ok(session.update(&self.resolver, target, operations, row, pointer, rect))
    }

    /// Whether dropping `source` among `parent`'s children is blocked.
    pub fn child_drop_blocked(
        &self,
        collection_id: &CollectionId,
        parent: &ParentRef,
        source: &DragSource,
    ) -> Result<bool, ApiError> {
        let parent_tree = self.tree(collection_id)?;
        if collection_id == &source.collection_id {
            return Ok(is_child_drop_blocked(
                &parent_tree,
                parent,
                &parent_tree,
                &source.entry,
            ));
        }
        let source_tree = self.tree(&source.collection_id)?;
        Ok(is_child_drop_blocked(
            &parent_tree,
            parent,
            &source_tree,
            &source.entry,
        ))
    }

    /// Finish a gesture. A drop outside any target is a no-op; a drop on a
    /// blocked instruction is refused.
    pub async fn drop(&self, session: DragSession) -> Result<Option<MoveOutcome>, ApiError> {
        match session.drop() {
            DropOutcome::NoTarget => Ok(None),
            DropOutcome::Blocked(_) => Err(IllegalMove::Blocked.into()),
            DropOutcome::Commit(command) => {
                self.apply_instruction(&command.source, &command.target, command.instruction)
                    .await
            }
        }
    }

    /// Apply a resolved instruction, persist it and reconcile.
    ///
    /// A move into another collection returns the id the store gave the
    /// recreated root. `Ok(None)` means the drop changed nothing. On a refused move the cache
    /// is untouched; on a failed write the cache holds the store's state for
    /// the affected lists and the persistence error is returned.
    #[instrument(skip_all, fields(collection = %source.collection_id, entry = %source.entry))]
    pub async fn apply_instruction(
        &self,
        source: &DragSource,
        target: &DropTarget,
        instruction: Option<Instruction>,
    ) -> Result<Option<MoveOutcome>, ApiError> {
        let guard = self
            .synchronizer
            .locks()
            .lock_all(&[source.collection_id.clone(), target.collection_id().clone()])
            .await;
        let move_target = match target {
            DropTarget::Entry { entry, .. } => MoveTarget::Entry(entry.clone()),
            DropTarget::Collection(_) => MoveTarget::Collection,
        };
        let source_before = self.tree(&source.collection_id)?;

        if target.collection_id() == &source.collection_id {
            let (after, outcome) =
                engine::apply(&source_before, instruction, &source.entry, &move_target)?;
            let Some(outcome) = outcome else {
                return Ok(None);
            };
            self.cache.replace_tree(after.clone());
            self.notify(&outcome, &source_before, &after);
            let plan = plan_within(&source_before, &after, &outcome);
            self.persist(&plan, &guard).await?;
            return Ok(Some(outcome));
        }

        let target_before = self.tree(target.collection_id())?;
        let mut source_after = source_before.clone();
        let mut target_after = target_before.clone();
        let Some(transfer) = engine::apply_transfer(
            &mut source_after,
            &mut target_after,
            instruction,
            &source.entry,
            &move_target,
        )?
        else {
            return Ok(None);
        };
        self.cache
            .replace_pair(source_after.clone(), target_after.clone());
        let plan = plan_transfer(
            &source_before,
            &source_after,
            &target_before,
            &target_after,
            &transfer,
        );
        let report = self.persist(&plan, &guard).await?;

        // The store recreates the subtree under fresh ids, root first.
        let mut outcome = transfer.outcome;
        if let Some(created) = report.created.first() {
            outcome.moved = created.clone();
        }
        self.notify(&outcome, &source_before, &target_after);
        Ok(Some(outcome))
    }

    fn notify(&self, outcome: &MoveOutcome, from_tree: &CollectionTree, to_tree: &CollectionTree) {
        let notification = MoveNotification {
            moved: outcome.moved.clone(),
            operation: outcome.operation,
            from: MoveEndpoint {
                collection_id: outcome.source_collection.clone(),
                parent_path: from_tree.parent_path(&outcome.from),
            },
            to: MoveEndpoint {
                collection_id: outcome.target_collection.clone(),
                parent_path: to_tree.parent_path(&outcome.to),
            },
            at: Utc::now(),
        };
        self.coordinator.publish(&notification);
    }

    /// Write a plan under `guard` and fold the response into the cache.
    async fn persist(&self, plan: &SyncPlan, guard: &WriteGuard) -> Result<SyncReport, ApiError> {
        if plan.is_empty() {
            debug!("Nothing to persist");
            return Ok(SyncReport::default());
        }
        let reconciler = self.reconciler();
        match self.synchronizer.execute_locked(plan, guard).await {
            Ok(report) => {
                for (collection_id, records) in &report.records {
                    reconciler.merge_records(collection_id, records.clone());
                }
                for refetched in &report.refetched {
                    reconciler.apply_path(
                        &refetched.collection_id,
                        &refetched.path,
                        refetched.entries.clone(),
                    );
                }
                reconciler.apply_collections(&report.collections);
                Ok(report)
            }
            Err(failure) => {
                for refetched in failure.refetched {
                    reconciler.apply_path(
                        &refetched.collection_id,
                        &refetched.path,
                        refetched.entries,
                    );
                }
                Err(ApiError::Persistence(failure.error))
            }
        }
    }

    // ----- collections -----

    /// Resolve a pointer over another collection's row while dragging
    /// `source`. Collections only reorder among themselves.
    pub fn resolve_collection_drop(
        &self,
        source: &CollectionId,
        target: &CollectionId,
        pointer: Point,
        rect: Rect,
    ) -> Option<Instruction> {
        let operations = classify_collection_reorder(source, target);
        self.resolver
            .resolve(pointer, rect, operations, RowContext::collection())
    }

    pub async fn reorder_collection(
        &self,
        source: &CollectionId,
        target: &CollectionId,
        operation: Operation,
    ) -> Result<Vec<CollectionRoot>, ApiError> {
        // Renumbering touches every collection, so hold all of them while
        // the order is read and rewritten.
        let ids: Vec<CollectionId> = self.cache.collections().into_iter().map(|c| c.id).collect();
        let guard = self.synchronizer.locks().lock_all(&ids).await;
        let reorder =
            engine::reorder_collections(&self.cache.collections(), source, target, operation)?;
        self.cache.update_roots(&reorder.collections);
        let plan = plan_collections(reorder.updates);
        self.persist(&plan, &guard).await?;
        Ok(self.cache.collections())
    }

    pub async fn create_collection(
        &self,
        name: &str,
        layout: Layout,
    ) -> Result<CollectionRoot, ApiError> {
        let name = validate_name(name)?;
        let service = self.service().clone();
        let root = service.create_collection(&name, layout).await?;
        let entries = collect_entries(service.as_ref(), &root.id, None).await?;
        self.cache.insert(
            root.clone(),
            CollectionTree::hydrate(root.id.clone(), root.layout, entries),
        );
        info!(collection = %root.id, name = %root.name, layout = ?root.layout, "Created collection");
        Ok(root)
    }

    pub async fn delete_collection(&self, collection_id: &CollectionId) -> Result<(), ApiError> {
        let _guard = self
            .synchronizer
            .locks()
            .lock_all(std::slice::from_ref(collection_id))
            .await;
        self.service().delete_collection(collection_id).await?;
        self.cache.remove(collection_id);
        info!(collection = %collection_id, "Deleted collection");
        Ok(())
    }

    pub async fn set_collection_expanded(
        &self,
        collection_id: &CollectionId,
        expanded: bool,
    ) -> Result<(), ApiError> {
        let mut root = self
            .cache
            .collection(collection_id)
            .ok_or_else(|| ApiError::UnknownCollection(collection_id.clone()))?;
        if root.expanded == expanded {
            return Ok(());
        }
        root.expanded = expanded;
        self.cache.update_roots(std::slice::from_ref(&root));
        let plan = plan_collections(vec![CollectionUpdate {
            id: collection_id.clone(),
            expanded: Some(expanded),
            ..Default::default()
        }]);
        let guard = self.synchronizer.locks().lock_all(&plan.collections()).await;
        self.persist(&plan, &guard).await?;
        Ok(())
    }

    // ----- entries -----

    async fn lock(&self, collection_id: &CollectionId) -> WriteGuard {
        self.synchronizer
            .locks()
            .lock_all(std::slice::from_ref(collection_id))
            .await
    }

    /// Add an entry as the last child of `parent`; returns the store's id.
    pub async fn add_entry(
        &self,
        collection_id: &CollectionId,
        parent: &ParentRef,
        entry: NewEntry,
    ) -> Result<EntryId, ApiError> {
        let guard = self.lock(collection_id).await;
        let tree = self.tree(collection_id)?;
        let provisional = EntryId::new(format!(
            "pending-{}",
            self.pending.fetch_add(1, Ordering::Relaxed)
        ));
        let mut after = tree.clone();
        let node = after.add(provisional, entry, parent)?;
        let create = CreateEntry::new(
            node.kind,
            CreateFields {
                name: node.name.clone(),
                path: tree.parent_path(parent),
                order: node.order,
                class: node.class,
                protocol: node.protocol.clone(),
                configuration: serde_json::Value::Null,
            },
        );
        self.cache.replace_tree(after);

        let plan = plan_create(&tree, parent, create);
        let report = self.persist(&plan, &guard).await?;
        report.created.into_iter().next().ok_or_else(|| {
            ApiError::Persistence(PersistenceError::Conflict(
                "store returned no id for created entry".to_string(),
            ))
        })
    }

    pub async fn rename_entry(
        &self,
        collection_id: &CollectionId,
        id: &EntryId,
        name: &str,
    ) -> Result<(), ApiError> {
        let guard = self.lock(collection_id).await;
        let tree = self.tree(collection_id)?;
        let mut after = tree.clone();
        after.rename(id, name)?;
        let name = after.node(id)?.name.clone();
        if tree.node(id)?.name == name {
            return Ok(());
        }
        let plan = plan_rename(&tree, id, &name).ok_or_else(|| TreeError::NotFound(id.clone()))?;
        self.cache.replace_tree(after);
        self.persist(&plan, &guard).await?;
        Ok(())
    }

    /// Commit a validated add/rename form.
    pub async fn apply_edit(&self, command: EditCommand) -> Result<EntryId, ApiError> {
        match command {
            EditCommand::Add {
                collection_id,
                parent,
                entry,
            } => self.add_entry(&collection_id, &parent, entry).await,
            EditCommand::Rename {
                collection_id,
                id,
                name,
            } => {
                self.rename_entry(&collection_id, &id, &name).await?;
                Ok(id)
            }
        }
    }

    /// Delete an entry and everything below it.
    pub async fn delete_entry(
        &self,
        collection_id: &CollectionId,
        id: &EntryId,
    ) -> Result<(), ApiError> {
        let guard = self.lock(collection_id).await;
        let tree = self.tree(collection_id)?;
        if tree.is_category_root(id) {
            return Err(IllegalMove::RootNotMovable(id.clone()).into());
        }
        let mut after = tree.clone();
        let (removed, parent) = after.detach(id)?;
        debug!(collection = %collection_id, id = %id, entries = removed.len(), "Deleting subtree");
        self.cache.replace_tree(after.clone());
        let plan = plan_delete(&tree, &after, id, &parent);
        self.persist(&plan, &guard).await?;
        Ok(())
    }

    /// Expand or collapse one directory. Returns whether anything changed.
    pub async fn set_expanded(
        &self,
        collection_id: &CollectionId,
        id: &EntryId,
        expanded: bool,
    ) -> Result<bool, ApiError> {
        let guard = self.lock(collection_id).await;
        let mut after = self.tree(collection_id)?;
        if !after.set_expanded(id, expanded)? {
            return Ok(false);
        }
        let plan = plan_expanded(&after, std::slice::from_ref(id), expanded);
        self.cache.replace_tree(after);
        self.persist(&plan, &guard).await?;
        Ok(true)
    }

    /// Expand or collapse every directory of a collection.
    pub async fn set_all_expanded(
        &self,
        collection_id: &CollectionId,
        expanded: bool,
    ) -> Result<Vec<EntryId>, ApiError> {
        let guard = self.lock(collection_id).await;
        let mut after = self.tree(collection_id)?;
        let changed = after.set_all_expanded(expanded);
        if changed.is_empty() {
            return Ok(changed);
        }
        let plan = plan_expanded(&after, &changed, expanded);
        self.cache.replace_tree(after);
        if let Err(err) = self.persist(&plan, &guard).await {
            warn!(collection = %collection_id, error = %err, "Failed to persist expanded state");
            return Err(err);
        }
        Ok(changed)
    }

    pub fn all_expanded(&self, collection_id: &CollectionId) -> Result<bool, ApiError> {
        self.cache
            .with_tree(collection_id, CollectionTree::all_expanded)
            .ok_or_else(|| ApiError::UnknownCollection(collection_id.clone()))
    }

    pub fn all_collapsed(&self, collection_id: &CollectionId) -> Result<bool, ApiError> {
        self.cache
            .with_tree(collection_id, CollectionTree::all_collapsed)
            .ok_or_else(|| ApiError::UnknownCollection(collection_id.clone()))
    }
}
