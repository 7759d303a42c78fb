//! Fan-out of encoded frames to every connected observer.
//!
//! Uses a tokio broadcast channel for O(1) send to all subscribers. Each
//! observer gets an independent receiver buffering up to `capacity` frames;
//! a slow or dead observer lags and is dropped by its own relay task without
//! ever blocking the send side or the other observers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{ProtocolError, WireMessage};

/// Identity of one connected observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverInfo {
    pub observer_id: Uuid,
    /// Remote address, when known. Purely diagnostic.
    pub addr: Option<String>,
}

impl ObserverInfo {
    pub fn new(addr: Option<String>) -> Self {
        Self {
            observer_id: Uuid::new_v4(),
            addr,
        }
    }
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub active_observers: usize,
}

/// Atomic counters so the send path never takes a lock.
struct AtomicBroadcastStats {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }
}

/// The set of currently-connected observers and their shared frame channel.
pub struct ObserverGroup {
    /// Broadcast channel sender; receivers are handed out per observer.
    sender: broadcast::Sender<Arc<String>>,

    /// Registered observers.
    observers: Arc<RwLock<HashMap<Uuid, ObserverInfo>>>,

    /// Frames buffered per receiver before lagging observers drop frames.
    capacity: usize,

    /// Lock-free send-side stats.
    atomic_stats: Arc<AtomicBroadcastStats>,
}

impl ObserverGroup {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            observers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            atomic_stats: Arc::new(AtomicBroadcastStats::new()),
        }
    }

    /// Register an observer and return its frame receiver.
    pub async fn add_observer(&self, info: ObserverInfo) -> broadcast::Receiver<Arc<String>> {
        let mut observers = self.observers.write().await;
        observers.insert(info.observer_id, info);
        self.sender.subscribe()
    }

    /// Deregister an observer. Its receiver keeps draining until dropped by
    /// the relay task.
    pub async fn remove_observer(&self, observer_id: &Uuid) -> Option<ObserverInfo> {
        let mut observers = self.observers.write().await;
        observers.remove(observer_id)
    }

    /// Encode a message once and fan it out to every observer.
    ///
    /// Returns the number of receivers the frame reached. Zero observers is
    /// not an error — the frame is simply dropped.
    pub fn broadcast(&self, msg: &WireMessage) -> Result<usize, ProtocolError> {
        let encoded = msg.encode()?;
        Ok(self.broadcast_raw(Arc::new(encoded)))
    }

    /// Fan out a pre-encoded frame. Lock-free: channel send plus atomic
    /// counters.
    pub fn broadcast_raw(&self, frame: Arc<String>) -> usize {
        match self.sender.send(frame) {
            Ok(count) => {
                self.atomic_stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                count
            }
            Err(_) => {
                // No live receivers.
                self.atomic_stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    pub async fn has_observer(&self, observer_id: &Uuid) -> bool {
        self.observers.read().await.contains_key(observer_id)
    }

    pub async fn observers(&self) -> Vec<ObserverInfo> {
        self.observers.read().await.values().cloned().collect()
    }

    /// Stats snapshot (counters are read lock-free).
    pub async fn stats(&self) -> BroadcastStats {
        let observers = self.observers.read().await;
        BroadcastStats {
            frames_sent: self.atomic_stats.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.atomic_stats.frames_dropped.load(Ordering::Relaxed),
            active_observers: observers.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw subscription without registering an observer (tick loop tests,
    /// embedding).
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<String>> {
        self.sender.subscribe()
    }
}
