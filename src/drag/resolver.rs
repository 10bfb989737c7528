//! Instruction resolution from pointer position.

use crate::config::DragConfig;
use crate::drag::classifier::{Availability, Operation, Operations};
use crate::tree::CollectionTree;
use crate::types::EntryId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// Bounding box of a drop target row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }

    /// Vertical position of `point` as a fraction of the height, in `[0, 1]`.
    fn relative_y(&self, point: Point) -> f64 {
        if self.height <= 0.0 {
            return 0.5;
        }
        ((point.y - self.top) / self.height).clamp(0.0, 1.0)
    }
}

/// Position of the target row within its list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowContext {
    pub is_last_child: bool,
    pub is_expanded_dir: bool,
}

impl RowContext {
    pub fn of(tree: &CollectionTree, id: &EntryId) -> Self {
        RowContext {
            is_last_child: tree.is_last_child(id),
            is_expanded_dir: tree.get(id).map(|n| n.is_dir() && n.expanded).unwrap_or(false),
        }
    }

    /// Collection rows are never masked: entries only combine into them and
    /// collections reorder freely among themselves.
    pub fn collection() -> Self {
        RowContext {
            is_last_child: true,
            is_expanded_dir: false,
        }
    }
}

/// A resolved drop outcome. `blocked` instructions are shown but never
/// committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub operation: Operation,
    pub blocked: bool,
}

impl Instruction {
    pub fn available(operation: Operation) -> Self {
        Instruction {
            operation,
            blocked: false,
        }
    }

    pub fn blocked(operation: Operation) -> Self {
        Instruction {
            operation,
            blocked: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolver {
    edge_fraction: f64,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new(DragConfig::default().edge_fraction)
    }
}

impl Resolver {
    /// `edge_fraction` is the height share of each reorder band when combine
    /// is also offered. Clamped to `(0, 0.5]`.
    pub fn new(edge_fraction: f64) -> Self {
        let edge_fraction = if edge_fraction.is_finite() && edge_fraction > 0.0 {
            edge_fraction.min(0.5)
        } else {
            0.25
        };
        Resolver { edge_fraction }
    }

    pub fn from_config(config: &DragConfig) -> Self {
        Resolver::new(config.edge_fraction)
    }

    pub fn edge_fraction(&self) -> f64 {
        self.edge_fraction
    }

    /// Apply the row overrides: reorder-after is only offered on the last
    /// row of a list, and never on an expanded directory (its "after" gap
    /// is visually its first child).
    pub fn mask(&self, operations: Operations, row: RowContext) -> Operations {
        let mut masked = operations;
        if row.is_expanded_dir || !row.is_last_child {
            masked.reorder_after = Availability::NotAvailable;
        }
        masked
    }

    /// Resolve the pointer over `rect` to a single instruction, or `None`
    /// when the pointer is outside the row or nothing is offered.
    pub fn resolve(
        &self,
        pointer: Point,
        rect: Rect,
        operations: Operations,
        row: RowContext,
    ) -> Option<Instruction> {
        if !rect.contains(pointer) {
            return None;
        }
        let operations = self.mask(operations, row);
        let y = rect.relative_y(pointer);
        let before = operations.offered(Operation::ReorderBefore);
        let after = operations.offered(Operation::ReorderAfter);
        let combine = operations.offered(Operation::Combine);

        let operation = match (before, combine, after) {
            (false, false, false) => return None,
            (true, true, true) => {
                if y < self.edge_fraction {
                    Operation::ReorderBefore
                } else if y > 1.0 - self.edge_fraction {
                    Operation::ReorderAfter
                } else {
                    Operation::Combine
                }
            }
            (true, true, false) => {
                if y < 0.5 {
                    Operation::ReorderBefore
                } else {
                    Operation::Combine
                }
            }
            (false, true, true) => {
                if y > 0.5 {
                    Operation::ReorderAfter
                } else {
                    Operation::Combine
                }
            }
            (false, true, false) => Operation::Combine,
            (true, false, true) => {
                if y < 0.5 {
                    Operation::ReorderBefore
                } else {
                    Operation::ReorderAfter
                }
            }
            (true, false, false) => Operation::ReorderBefore,
            (false, false, true) => Operation::ReorderAfter,
        };

        Some(Instruction {
            operation,
            blocked: operations.get(operation) == Availability::Blocked,
        })
    }
}
