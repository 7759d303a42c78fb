//! # mosaic-core — authoritative board model for Mosaic
//!
//! The simulation side of the system: a fixed-size grid of optional colors,
//! a monotonic generation counter, the per-generation update rule (B3/S23
//! liveness plus color inheritance for newborn cells), and the minimal diff
//! a step produces.
//!
//! Everything here is synchronous and pure — no I/O, no async. The sync
//! layer (`mosaic-collab`) owns locking and fan-out.

pub mod board;
pub mod color;
pub mod engine;
pub mod resolver;

pub use board::{Board, BoardError, BoardSnapshot};
pub use color::{Color, ColorParseError};
pub use engine::{step, CellChange, StepResult};
