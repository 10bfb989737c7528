//! Integration tests for the collection tree, drag and drop, synchronization
//! and the CLI

mod drag_rules;
mod move_scenarios;
mod sled_store;
mod support;
mod sync_protocol;
mod tree_properties;
