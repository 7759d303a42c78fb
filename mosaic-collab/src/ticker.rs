//! The tick loop: periodic simulation steps and delta broadcast.
//!
//! One spawned task owns the timer. Each firing takes the board write guard,
//! runs the engine step, releases the guard, and only then hands the encoded
//! delta to the observer channel — no socket ever waits on the board lock,
//! and ticks run strictly serially. A quiescent tick broadcasts nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use mosaic_core::board::Board;
use mosaic_core::engine;

use crate::broadcast::ObserverGroup;
use crate::protocol::WireMessage;

/// Owns the periodic simulation timer. `start` and `stop` are idempotent —
/// starting a running loop or stopping a stopped one is a no-op.
pub struct TickLoop {
    board: Arc<RwLock<Board>>,
    observers: Arc<ObserverGroup>,
    period: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TickLoop {
    pub fn new(board: Arc<RwLock<Board>>, observers: Arc<ObserverGroup>, period: Duration) -> Self {
        Self {
            board,
            observers,
            period,
            handle: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Start ticking. No-op if already running.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            log::debug!("tick loop already running");
            return;
        }

        let board = self.board.clone();
        let observers = self.observers.clone();
        let period = self.period;

        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Never burst to catch up after a stall; ticks stay serial.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                let result = {
                    let mut board = board.write().await;
                    engine::step(&mut board)
                };

                if result.changes.is_empty() {
                    continue;
                }

                let generation = result.generation;
                let changed = result.changes.len();
                let msg = WireMessage::delta(result.changes, generation);
                match msg.encode() {
                    Ok(frame) => {
                        let reached = observers.broadcast_raw(Arc::new(frame));
                        log::trace!(
                            "tick {generation}: {changed} changes to {reached} observers"
                        );
                    }
                    Err(e) => log::error!("failed to encode delta for tick {generation}: {e}"),
                }
            }
        }));
        log::info!("tick loop started ({}ms period)", self.period.as_millis());
    }

    /// Stop ticking. No-op if already stopped. An in-flight step completes
    /// or is dropped at an await point; the board is never left half-written
    /// because the step mutates it only through the whole-grid swap.
    pub async fn stop(&self) {
        let mut handle = self.handle.lock().await;
        match handle.take() {
            Some(task) => {
                task.abort();
                log::info!("tick loop stopped");
            }
            None => log::debug!("tick loop already stopped"),
        }
    }
}
