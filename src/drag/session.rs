//! Drag gesture state.
//!
//! A session tracks the hovered target and the instruction resolved for it.
//! Pointer moves may re-resolve any number of times; `drop` consumes the
//! session, so a gesture yields at most one command.

use crate::drag::classifier::{DragSource, DropTarget, Operations};
use crate::drag::resolver::{Instruction, Point, Rect, Resolver, RowContext};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
struct Hover {
    target: DropTarget,
    instruction: Option<Instruction>,
}

/// The committed result of a gesture, handed to the mutation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DropCommand {
    pub source: DragSource,
    pub target: DropTarget,
    pub instruction: Option<Instruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// The pointer was not over a target when released.
    NoTarget,
    /// The resolved instruction is blocked; nothing commits.
    Blocked(DropTarget),
    Commit(DropCommand),
}

#[derive(Debug, Clone)]
pub struct DragSession {
    source: DragSource,
    hover: Option<Hover>,
}

impl DragSession {
    pub fn start(source: DragSource) -> Self {
        debug!(collection = %source.collection_id, entry = %source.entry, "Drag started");
        DragSession {
            source,
            hover: None,
        }
    }

    pub fn source(&self) -> &DragSource {
        &self.source
    }

    /// Current instruction, for drop indicators.
    pub fn instruction(&self) -> Option<Instruction> {
        self.hover.as_ref().and_then(|hover| hover.instruction)
    }

    /// Record a pointer move over `target` and re-resolve.
    pub fn update(
        &mut self,
        resolver: &Resolver,
        target: DropTarget,
        operations: Operations,
        row: RowContext,
        pointer: Point,
        rect: Rect,
    ) -> Option<Instruction> {
        let instruction = resolver.resolve(pointer, rect, operations, row);
        self.hover = Some(Hover {
            target,
            instruction,
        });
        instruction
    }

    /// The pointer left every drop target.
    pub fn leave(&mut self) {
        self.hover = None;
    }

    /// Abandon the gesture with no effect.
    pub fn cancel(self) {
        debug!(entry = %self.source.entry, "Drag cancelled");
    }

    pub fn drop(self) -> DropOutcome {
        let Some(hover) = self.hover else {
            debug!(entry = %self.source.entry, "Dropped outside any target");
            return DropOutcome::NoTarget;
        };
        if hover.instruction.map(|i| i.blocked).unwrap_or(false) {
            debug!(entry = %self.source.entry, target = ?hover.target, "Dropped on blocked target");
            return DropOutcome::Blocked(hover.target);
        }
        DropOutcome::Commit(DropCommand {
            source: self.source,
            target: hover.target,
            instruction: hover.instruction,
        })
    }
}
