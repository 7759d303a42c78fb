//! Color inheritance for newborn cells.
//!
//! A cell born on this tick takes its color from the live cells around it in
//! the *previous* generation's board — never the in-progress next grid, so
//! the result is independent of evaluation order within a tick.

use std::collections::HashMap;

use crate::board::Board;
use crate::color::Color;

/// Moore neighborhood: the 8 positions touching a cell.
const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Colors of the live in-bounds neighbors of `(x, y)`.
pub fn neighbor_colors(board: &Board, x: usize, y: usize) -> Vec<Color> {
    let (w, h) = (board.width() as i64, board.height() as i64);
    let cells = board.cells();
    let mut colors = Vec::new();
    for (dx, dy) in NEIGHBOR_OFFSETS {
        let (nx, ny) = (x as i64 + dx, y as i64 + dy);
        if nx < 0 || ny < 0 || nx >= w || ny >= h {
            continue;
        }
        if let Some(color) = cells[(ny * w + nx) as usize] {
            colors.push(color);
        }
    }
    colors
}

/// Number of live in-bounds neighbors of `(x, y)`. Structural — colors are
/// ignored.
pub fn live_neighbors(board: &Board, x: usize, y: usize) -> usize {
    let (w, h) = (board.width() as i64, board.height() as i64);
    let cells = board.cells();
    let mut count = 0;
    for (dx, dy) in NEIGHBOR_OFFSETS {
        let (nx, ny) = (x as i64 + dx, y as i64 + dy);
        if nx < 0 || ny < 0 || nx >= w || ny >= h {
            continue;
        }
        if cells[(ny * w + nx) as usize].is_some() {
            count += 1;
        }
    }
    count
}

/// Color for a cell born at `(x, y)`.
///
/// Dominant-color rule: the single most frequent neighbor color wins. On a
/// tie the distinct colors sharing the max tally are averaged channel-wise
/// (round-half-up) — summing is commutative, so the result does not depend
/// on tally iteration order. With zero live neighbors the average of an
/// empty set is undefined and the fallback is pure white.
pub fn resolve(board: &Board, x: usize, y: usize) -> Color {
    let colors = neighbor_colors(board, x, y);
    if colors.is_empty() {
        return Color::WHITE;
    }

    let mut tally: HashMap<Color, usize> = HashMap::new();
    for color in &colors {
        *tally.entry(*color).or_insert(0) += 1;
    }

    let max = tally.values().copied().max().unwrap_or(0);
    let tied: Vec<Color> = tally
        .iter()
        .filter(|(_, &count)| count == max)
        .map(|(&color, _)| color)
        .collect();

    if tied.len() == 1 {
        tied[0]
    } else {
        Color::average(&tied).unwrap_or(Color::WHITE)
    }
}
