//! WebSocket sync server for the shared board.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── SyncServer ── Board (authoritative) ── TickLoop
//! Client B ──┘        │
//!                     ├── ObserverGroup (fan-out)
//!                     │
//!          ┌──────────┼───────────┐
//!          ▼          ▼           ▼
//!       Client A   Client B    Client C
//! ```
//!
//! Exactly two paths mutate the board: draw ingest (on frame arrival) and
//! the tick loop. Each connection gets a snapshot on join, then relays the
//! shared delta/echo stream; a failed send drops that observer only.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use mosaic_core::board::Board;

use crate::broadcast::{ObserverGroup, ObserverInfo};
use crate::ingest;
use crate::protocol::WireMessage;
use crate::ticker::TickLoop;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Board width in cells
    pub width: usize,
    /// Board height in cells
    pub height: usize,
    /// Milliseconds between simulation steps
    pub tick_interval_ms: u64,
    /// Soft cap on concurrently connected observers, enforced at accept
    pub max_observers: usize,
    /// Frames buffered per observer receiver
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            width: 100,
            height: 100,
            tick_interval_ms: 200,
            max_observers: 100,
            broadcast_capacity: 256,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_draws: u64,
    pub cells_applied: u64,
    pub malformed_frames: u64,
}

/// The sync server: authoritative board + tick loop + observer fan-out.
pub struct SyncServer {
    config: ServerConfig,
    board: Arc<RwLock<Board>>,
    observers: Arc<ObserverGroup>,
    ticker: TickLoop,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Create a new sync server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let board = Arc::new(RwLock::new(Board::new(config.width, config.height)));
        let observers = Arc::new(ObserverGroup::new(config.broadcast_capacity));
        let ticker = TickLoop::new(
            board.clone(),
            observers.clone(),
            std::time::Duration::from_millis(config.tick_interval_ms),
        );
        Self {
            config,
            board,
            observers,
            ticker,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Start the tick timer. No-op if already ticking.
    pub async fn start_ticker(&self) {
        self.ticker.start().await;
    }

    /// Stop the tick timer. No-op if already stopped.
    pub async fn stop_ticker(&self) {
        self.ticker.stop().await;
    }

    /// Start ticking and listen for WebSocket connections.
    ///
    /// This runs the server event loop. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.ticker.start().await;

        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!(
            "mosaic sync server listening on {} ({}x{} board, {}ms ticks)",
            self.config.bind_addr,
            self.config.width,
            self.config.height,
            self.config.tick_interval_ms
        );

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let board = self.board.clone();
            let observers = self.observers.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, board, observers, stats, config).await
                {
                    log::error!("connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        board: Arc<RwLock<Board>>,
        observers: Arc<ObserverGroup>,
        stats: Arc<RwLock<ServerStats>>,
        config: ServerConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Soft observer cap, enforced here at the transport layer.
        if observers.observer_count().await >= config.max_observers {
            log::warn!(
                "observer cap ({}) reached, refusing {addr}",
                config.max_observers
            );
            let mut ws_stream = tokio_tungstenite::accept_async(stream).await?;
            ws_stream.close(None).await.ok();
            return Ok(());
        }

        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // Register first so every delta after the snapshot is relayed, then
        // serve the snapshot. The snapshot write happens before the relay
        // loop runs, so the observer always sees snapshot first and can
        // apply deltas in generation order (or discard stale ones).
        let info = ObserverInfo::new(Some(addr.to_string()));
        let observer_id = info.observer_id;
        let mut broadcast_rx = observers.add_observer(info).await;

        let snapshot_frame = {
            let b = board.read().await;
            WireMessage::snapshot(&b.snapshot()).encode()?
        };
        if let Err(e) = ws_sender.send(Message::Text(snapshot_frame.into())).await {
            observers.remove_observer(&observer_id).await;
            let mut s = stats.write().await;
            s.active_connections -= 1;
            return Err(e.into());
        }

        log::info!("observer {observer_id} joined from {addr}");

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match WireMessage::decode(text.as_str()) {
                                Ok(WireMessage::Draw { cells, submitter_id }) => {
                                    let accepted = {
                                        let mut b = board.write().await;
                                        ingest::apply(&mut b, &cells)
                                    };

                                    {
                                        let mut s = stats.write().await;
                                        s.total_draws += 1;
                                        s.cells_applied += accepted.len() as u64;
                                    }

                                    log::debug!(
                                        "draw from {addr}: {}/{} cells applied",
                                        accepted.len(),
                                        cells.len()
                                    );

                                    // Immediate feedback, independent of the
                                    // next tick's delta.
                                    if !accepted.is_empty() {
                                        let echo = WireMessage::immediate_draw(accepted, submitter_id);
                                        if let Err(e) = observers.broadcast(&echo) {
                                            log::error!("failed to broadcast draw echo: {e}");
                                        }
                                    }
                                }
                                Ok(other) => {
                                    log::warn!(
                                        "unexpected {} frame from {addr}, ignoring",
                                        frame_name(&other)
                                    );
                                }
                                Err(e) => {
                                    log::warn!("malformed frame from {addr}: {e}");
                                    let mut s = stats.write().await;
                                    s.malformed_frames += 1;
                                }
                            }
                        }

                        Some(Ok(Message::Binary(_))) => {
                            log::warn!("unexpected binary frame from {addr}, ignoring");
                            let mut s = stats.write().await;
                            s.malformed_frames += 1;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            if ws_sender.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("connection closed from {addr}");
                            break;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outgoing broadcast frame (deltas and draw echoes)
                frame = broadcast_rx.recv() => {
                    match frame {
                        Ok(frame) => {
                            if let Err(e) = ws_sender.send(Message::Text((*frame).clone().into())).await {
                                log::warn!("delivery to {addr} failed ({e}); dropping observer");
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("observer {observer_id} lagged by {n} frames");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        // Cleanup: failures are isolated to this observer.
        observers.remove_observer(&observer_id).await;
        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
        }
        log::info!("observer {observer_id} left");

        Ok(())
    }

    /// Current state as a snapshot frame — the query contract served to the
    /// external HTTP collaborator.
    pub async fn snapshot_message(&self) -> WireMessage {
        let b = self.board.read().await;
        WireMessage::snapshot(&b.snapshot())
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Shared board handle (embedding, tests).
    pub fn board(&self) -> &Arc<RwLock<Board>> {
        &self.board
    }

    /// Observer group reference.
    pub fn observers(&self) -> &Arc<ObserverGroup> {
        &self.observers
    }
}

fn frame_name(msg: &WireMessage) -> &'static str {
    match msg {
        WireMessage::Snapshot { .. } => "snapshot",
        WireMessage::Delta { .. } => "delta",
        WireMessage::ImmediateDraw { .. } => "immediate_draw",
        WireMessage::Draw { .. } => "draw",
    }
}
