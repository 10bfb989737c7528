//! Drag and drop: legality classification, pointer resolution and gesture
//! state.

pub mod classifier;
pub mod resolver;
pub mod session;

pub use classifier::{
    classify, classify_collection_reorder, is_child_drop_blocked, Availability, DragSource,
    DropTarget, Operation, Operations, Refusal,
};
pub use resolver::{Instruction, Point, Rect, Resolver, RowContext};
pub use session::{DragSession, DropCommand, DropOutcome};
