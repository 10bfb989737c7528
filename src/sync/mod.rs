//! Order/path synchronization between the local tree and the store.

pub mod executor;
pub mod plan;

pub use executor::{Refetched, SyncFailure, SyncReport, Synchronizer};
pub use plan::{
    plan_collections, plan_create, plan_delete, plan_expanded, plan_rename, plan_transfer,
    plan_within, relocate_captured, CreateEntry, CreateFields, EntryUpdate, PlanKind,
    RefetchTarget, SyncPlan, TransferPlan, UpdateFields,
};
