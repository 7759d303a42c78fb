//! # mosaic-collab — real-time sync layer for the shared board
//!
//! Keeps many independently-connected observers consistent with one
//! authoritative board via a full snapshot on join plus incremental deltas
//! per simulation tick.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌──────────────┐
//! │ SyncClient  │ ◄─────────────────► │ SyncServer   │
//! │ (per user)  │     JSON frames     │ (central)    │
//! └──────┬──────┘                     └──────┬───────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌─────────────┐                     ┌──────────────┐
//! │ Board       │                     │ Board        │
//! │ (mirror)    │       draws ──────► │ (authority)  │
//! └─────────────┘                     └──────┬───────┘
//!                                            │ tick
//!                                    ┌───────┴───────┐
//!                                    │ TickLoop      │
//!                                    │ step + delta  │
//!                                    └───────┬───────┘
//!                                    ┌───────┴───────┐
//!                                    │ ObserverGroup │
//!                                    │ (fan-out)     │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — tagged JSON wire protocol (snapshot / delta / draw)
//! - [`broadcast`] — observer registry and frame fan-out with backpressure
//! - [`ingest`] — validated application of draw submissions to the board
//! - [`ticker`] — the periodic simulation step and delta broadcast
//! - [`server`] — WebSocket sync server
//! - [`client`] — WebSocket sync client with board mirror and draw queue

pub mod broadcast;
pub mod client;
pub mod ingest;
pub mod protocol;
pub mod server;
pub mod ticker;

// Re-exports for convenience
pub use broadcast::{BroadcastStats, ObserverGroup, ObserverInfo};
pub use client::{ConnectionState, DrawQueue, SyncClient, SyncEvent};
pub use protocol::{CellDraw, ProtocolError, WireMessage};
pub use server::{ServerConfig, ServerStats, SyncServer};
pub use ticker::TickLoop;
