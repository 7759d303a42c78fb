//! One simulation step: structural survival rules plus newborn coloring,
//! producing the minimal diff against the pre-tick board.
//!
//! The liveness rule is the classic B3/S23 lookup — a live cell with 2 or 3
//! live neighbors survives, a dead cell with exactly 3 is born — counted
//! structurally (color-agnostic) and inlined here; it is too small to
//! warrant a dependency.

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::color::Color;
use crate::resolver;

/// A single position whose color after the tick differs from its color
/// before it. `color: None` means the cell died (or stays a changed-to-empty
/// slot on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellChange {
    pub x: usize,
    pub y: usize,
    pub color: Option<Color>,
}

/// Outcome of one tick: the diff and the generation it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Changed positions in row-major order. Empty on a quiescent board.
    pub changes: Vec<CellChange>,
    /// The generation counter after the advance.
    pub generation: u64,
}

/// Advance the board by one generation.
///
/// Every position is evaluated independently against the pre-tick grid:
/// survivors retain their exact color, newborns take the resolver's color
/// (also evaluated against the pre-tick grid), everything else is empty.
/// The next grid is swapped in whole, then the generation advances. Pure
/// function of the pre-tick board — feed a board, assert on the changes.
pub fn step(board: &mut Board) -> StepResult {
    let (width, height) = (board.width(), board.height());
    let mut next = vec![None; width * height];
    let mut changes = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let current = board.cells()[idx];
            let neighbors = resolver::live_neighbors(board, x, y);

            let cell: Option<Color> = match (current, neighbors) {
                (Some(color), 2) | (Some(color), 3) => Some(color),
                (None, 3) => Some(resolver::resolve(board, x, y)),
                _ => None,
            };

            if cell != current {
                changes.push(CellChange { x, y, color: cell });
            }
            next[idx] = cell;
        }
    }

    board.replace_cells(next);
    let generation = board.advance_generation();
    log::trace!("step -> generation {generation}, {} changes", changes.len());

    StepResult { changes, generation }
}
