//! Tagged JSON wire protocol for board synchronization.
//!
//! Every frame is one JSON object with an explicit `type` discriminant; the
//! set of variants is closed and anything outside it fails decode as
//! malformed input — it never reaches the board.
//!
//! ```text
//! {"type":"snapshot","board":[["#ff0000",null,...],...],"generation":12}
//! {"type":"delta","changes":[{"x":3,"y":1,"color":null}],"generation":13}
//! {"type":"immediate_draw","cells":[{"x":3,"y":1,"color":"#00ff00"}],"submitterId":"u-7"}
//! {"type":"draw","cells":[{"x":3,"y":1,"color":"#00ff00"}],"submitterId":"u-7"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use mosaic_core::board::BoardSnapshot;
use mosaic_core::color::Color;
use mosaic_core::engine::CellChange;

/// A client's request to set one board position to a color.
///
/// Coordinates are signed on the wire so out-of-range submissions (negative
/// included) survive decoding and are discarded by validation instead of
/// killing the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDraw {
    pub x: i64,
    pub y: i64,
    pub color: Color,
}

impl CellDraw {
    pub fn new(x: i64, y: i64, color: Color) -> Self {
        Self { x, y, color }
    }
}

/// The closed set of protocol frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Full board state served to a newly joined observer; `board` is
    /// `height` rows of `width` entries.
    Snapshot {
        board: Vec<Vec<Option<Color>>>,
        generation: u64,
    },
    /// Minimal diff of one simulation tick, stamped with the generation it
    /// produced. Never sent for a quiescent tick.
    Delta {
        changes: Vec<CellChange>,
        generation: u64,
    },
    /// Immediate echo of an accepted draw submission, tagged with the
    /// submitter's opaque id so its own canvas can reconcile.
    ImmediateDraw {
        cells: Vec<CellDraw>,
        #[serde(
            rename = "submitterId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        submitter_id: Option<String>,
    },
    /// Client → server draw submission.
    Draw {
        cells: Vec<CellDraw>,
        #[serde(
            rename = "submitterId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        submitter_id: Option<String>,
    },
}

impl WireMessage {
    /// Build a snapshot frame from a board snapshot.
    pub fn snapshot(snapshot: &BoardSnapshot) -> Self {
        Self::Snapshot {
            board: snapshot.rows(),
            generation: snapshot.generation,
        }
    }

    /// Build a delta frame.
    pub fn delta(changes: Vec<CellChange>, generation: u64) -> Self {
        Self::Delta { changes, generation }
    }

    /// Build an immediate-draw echo frame.
    pub fn immediate_draw(cells: Vec<CellDraw>, submitter_id: Option<String>) -> Self {
        Self::ImmediateDraw { cells, submitter_id }
    }

    /// Build a draw submission frame.
    pub fn draw(cells: Vec<CellDraw>, submitter_id: Option<String>) -> Self {
        Self::Draw { cells, submitter_id }
    }

    /// Serialize to the JSON wire form.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from the JSON wire form. Unknown discriminants and
    /// structurally invalid frames are `Malformed`.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    /// Frame could not be serialized.
    Serialization(String),
    /// Unparseable or structurally invalid frame. Recovered at the
    /// transport boundary.
    Malformed(String),
    /// The connection is gone.
    ConnectionClosed,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "serialization error: {e}"),
            Self::Malformed(e) => write!(f, "malformed frame: {e}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
