//! WebSocket sync client for connecting to the board server.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - A local board mirror built from the join snapshot and kept consistent
//!   by applying deltas strictly in generation order
//! - Draw submission with an offline queue replayed on connect
//!
//! The ordering contract lives here: a delta is applied iff its generation
//! is ahead of the mirror's; duplicates and stale frames are discarded. A
//! forward gap is normal — quiescent ticks advance the server's generation
//! without broadcasting anything — and is safe to span because suppressed
//! ticks changed no cells. The server never re-orders for us.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};

use mosaic_core::board::{Board, BoardSnapshot};
use mosaic_core::engine::CellChange;

use crate::protocol::{CellDraw, ProtocolError, WireMessage};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// Initial snapshot received; the mirror is now live
    SnapshotReceived { generation: u64 },
    /// A tick delta was applied to the mirror
    Delta {
        changes: Vec<CellChange>,
        generation: u64,
    },
    /// Another submitter's draw (or our own echo) was applied to the mirror
    ImmediateDraw {
        cells: Vec<CellDraw>,
        submitter_id: Option<String>,
    },
}

/// Queue of draw batches made while disconnected, replayed on connect.
pub struct DrawQueue {
    queue: VecDeque<Vec<CellDraw>>,
    max_size: usize,
}

impl DrawQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Queue a batch for later replay. Returns false when full.
    pub fn enqueue(&mut self, cells: Vec<CellDraw>) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(cells);
        true
    }

    /// Drain all queued batches for replay.
    pub fn drain(&mut self) -> Vec<Vec<CellDraw>> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Total cells across all queued batches.
    pub fn total_cells(&self) -> usize {
        self.queue.iter().map(Vec::len).sum()
    }
}

/// Apply a delta to the mirror iff its generation is ahead of the mirror's.
///
/// Returns whether it was applied. Stale and duplicate deltas are discarded.
/// A forward jump spans quiescent ticks the server never broadcast.
fn apply_delta(board: &mut Board, changes: &[CellChange], generation: u64) -> bool {
    if generation <= board.generation() {
        return false;
    }
    for change in changes {
        if let Err(e) = board.set(change.x, change.y, change.color) {
            // Dimension mismatch with the server; should not happen after a
            // well-formed snapshot.
            log::warn!("delta change dropped: {e}");
        }
    }
    board.fast_forward_generation(generation);
    true
}

/// The sync client.
///
/// Manages a WebSocket connection to the board server, maintains a local
/// mirror of the board, and submits draws tagged with our submitter id.
pub struct SyncClient {
    /// Opaque id attached to our draw submissions
    submitter_id: String,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Local mirror; `None` until the first snapshot arrives
    mirror: Arc<RwLock<Option<Board>>>,

    /// Draw batches queued while disconnected
    draw_queue: Arc<Mutex<DrawQueue>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<String>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<SyncEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<SyncEvent>,

    /// Server URL
    server_url: String,
}

impl SyncClient {
    /// Create a new sync client.
    pub fn new(submitter_id: impl Into<String>, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            submitter_id: submitter_id.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            mirror: Arc::new(RwLock::new(None)),
            draw_queue: Arc::new(Mutex::new(DrawQueue::new(1_000))),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let (ws_stream, _) = match tokio_tungstenite::connect_async(&self.server_url).await {
            Ok(ok) => ok,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                log::warn!("connect to {} failed: {e}", self.server_url);
                return Err(ProtocolError::ConnectionClosed);
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer
                    .send(tokio_tungstenite::tungstenite::Message::Text(text.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SyncEvent::Connected).await;

        // Replay draws queued while offline.
        {
            let mut queue = self.draw_queue.lock().await;
            let queued = queue.drain();
            if !queued.is_empty() {
                log::info!("replaying {} queued draw batches", queued.len());
                for cells in queued {
                    let msg = WireMessage::draw(cells, Some(self.submitter_id.clone()));
                    if let Ok(encoded) = msg.encode() {
                        if let Some(ref tx) = self.outgoing_tx {
                            let _ = tx.send(encoded).await;
                        }
                    }
                }
            }
        }

        // Reader task: decode frames, keep the mirror consistent, emit events.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let mirror = self.mirror.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(tokio_tungstenite::tungstenite::Message::Text(text)) => {
                        let frame = match WireMessage::decode(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                log::warn!("dropping malformed frame from server: {e}");
                                continue;
                            }
                        };

                        match frame {
                            WireMessage::Snapshot { board, generation } => {
                                match BoardSnapshot::from_rows(board, generation) {
                                    Some(snapshot) => {
                                        *mirror.write().await =
                                            Some(Board::from_snapshot(&snapshot));
                                        let _ = event_tx
                                            .send(SyncEvent::SnapshotReceived { generation })
                                            .await;
                                    }
                                    None => log::warn!("dropping ragged snapshot from server"),
                                }
                            }

                            WireMessage::Delta { changes, generation } => {
                                let applied = match mirror.write().await.as_mut() {
                                    Some(board) => apply_delta(board, &changes, generation),
                                    None => {
                                        log::warn!("delta before snapshot, dropping");
                                        false
                                    }
                                };
                                if applied {
                                    let _ = event_tx
                                        .send(SyncEvent::Delta { changes, generation })
                                        .await;
                                } else {
                                    log::warn!(
                                        "discarding out-of-sequence delta (generation {generation})"
                                    );
                                }
                            }

                            WireMessage::ImmediateDraw { cells, submitter_id } => {
                                // Draws mutate the board between ticks without
                                // touching the generation; mirror them the same
                                // way. Our own echo is applied too — the server
                                // board already holds it.
                                if let Some(board) = mirror.write().await.as_mut() {
                                    for cell in &cells {
                                        if cell.x >= 0 && cell.y >= 0 {
                                            let _ = board.set(
                                                cell.x as usize,
                                                cell.y as usize,
                                                Some(cell.color),
                                            );
                                        }
                                    }
                                }
                                let _ = event_tx
                                    .send(SyncEvent::ImmediateDraw { cells, submitter_id })
                                    .await;
                            }

                            WireMessage::Draw { .. } => {
                                log::warn!("unexpected draw frame from server, ignoring");
                            }
                        }
                    }
                    Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost.
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Submit a batch of cell draws.
    ///
    /// If disconnected, queues the batch for replay on the next connect.
    pub async fn send_draw(&self, cells: Vec<CellDraw>) -> Result<(), ProtocolError> {
        let state = *self.state.read().await;
        if state != ConnectionState::Connected {
            let mut queue = self.draw_queue.lock().await;
            if !queue.enqueue(cells) {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Ok(());
        }

        let msg = WireMessage::draw(cells, Some(self.submitter_id.clone()));
        let encoded = msg.encode()?;

        if let Some(ref tx) = self.outgoing_tx {
            tx.send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
        }

        Ok(())
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Our submitter id.
    pub fn submitter_id(&self) -> &str {
        &self.submitter_id
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Generation of the local mirror, if a snapshot has arrived.
    pub async fn generation(&self) -> Option<u64> {
        self.mirror.read().await.as_ref().map(Board::generation)
    }

    /// Snapshot of the local mirror, if a snapshot has arrived.
    pub async fn mirror_snapshot(&self) -> Option<BoardSnapshot> {
        self.mirror.read().await.as_ref().map(Board::snapshot)
    }

    /// Number of queued draw batches.
    pub async fn draw_queue_len(&self) -> usize {
        self.draw_queue.lock().await.len()
    }
}
