//! Validated application of draw submissions to the authoritative board.
//!
//! A draw is written immediately, independent of the tick boundary: it is
//! visible to any read after `apply` returns and is picked up as previous
//! state by whichever tick runs next. Per-cell last-write-wins; the caller
//! holds the board write guard for the whole batch.

use mosaic_core::board::Board;

use crate::protocol::CellDraw;

/// Apply a batch of cell writes, silently discarding entries whose
/// coordinates fall outside the grid. One bad entry never aborts the batch.
///
/// Returns the accepted subset, in submission order — these are the cells to
/// echo to observers; the applied count is their length.
pub fn apply(board: &mut Board, cells: &[CellDraw]) -> Vec<CellDraw> {
    let mut accepted = Vec::with_capacity(cells.len());
    for cell in cells {
        if cell.x < 0 || cell.y < 0 {
            log::debug!("discarding draw at ({}, {}): negative coordinate", cell.x, cell.y);
            continue;
        }
        match board.set(cell.x as usize, cell.y as usize, Some(cell.color)) {
            Ok(()) => accepted.push(cell.clone()),
            Err(e) => log::debug!("discarding draw: {e}"),
        }
    }
    accepted
}
