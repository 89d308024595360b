//! Connection registry and broadcast hub.
//!
//! The registry is the single owner of live connection membership; everyone
//! else goes through `register` / `remove` / `snapshot`. Broadcasting takes a
//! snapshot under the lock, releases it, then hands the frame to each sink
//! with a non-blocking `try_deliver`. A sink that refuses the frame is closed
//! and dropped from the registry on the spot.
//!
//! Delivery is at-most-once: nothing is queued for connections that join
//! later, and nothing is retried.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::events::DomainEvent;
use crate::error::RealtimeError;

/// One serialized event, shared by every recipient.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "conn-{}", self.0) }
}

/// Registry view of a connection. The connecting phase (upgrade and origin
/// check) finishes before a connection is registered, so the registry only
/// ever sees `Open` and the terminal `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// Outbound side of one connection.
pub trait ConnectionSink: Send + Sync {
    /// Accept a frame for sending without waiting on the peer.
    fn try_deliver(&self, frame: &Frame) -> Result<(), RealtimeError>;
}

/// Sink backed by a bounded queue that the connection's writer task drains.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Frame>) -> Self { Self { tx } }

    /// Sink plus the receiving end for a writer task.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl ConnectionSink for ChannelSink {
    fn try_deliver(&self, frame: &Frame) -> Result<(), RealtimeError> {
        self.tx.try_send(Arc::clone(frame)).map_err(|e| match e {
            TrySendError::Full(_) => RealtimeError::ConnectionWriteFailed("outbound queue full".into()),
            TrySendError::Closed(_) => RealtimeError::ConnectionWriteFailed("connection closed".into()),
        })
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    members: Mutex<HashMap<ConnectionId, Arc<dyn ConnectionSink>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register(&self, sink: Arc<dyn ConnectionSink>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.members.lock().insert(id, sink);
        debug!(target: "realtime", conn = %id, "connection open");
        id
    }

    /// Close a connection. Removing an absent id is a no-op; returns whether
    /// this call did the removal.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.members.lock().remove(&id).is_some();
        if removed {
            debug!(target: "realtime", conn = %id, "connection closed");
        }
        removed
    }

    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        if self.members.lock().contains_key(&id) { ConnectionState::Open } else { ConnectionState::Closed }
    }

    pub fn len(&self) -> usize { self.members.lock().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn snapshot(&self) -> Vec<(ConnectionId, Arc<dyn ConnectionSink>)> {
        self.members.lock().iter().map(|(id, sink)| (*id, Arc::clone(sink))).collect()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Default)]
pub struct BroadcastHub {
    registry: ConnectionRegistry,
}

impl BroadcastHub {
    pub fn new() -> Self { Self::default() }

    pub fn registry(&self) -> &ConnectionRegistry { &self.registry }

    /// Serialize once and fan out. Never fails; failures only shrink the registry.
    pub fn publish(&self, event: &DomainEvent) -> BroadcastReport {
        match event.to_frame() {
            Ok(text) => self.broadcast(Frame::from(text)),
            Err(e) => {
                warn!(target: "realtime", "dropping event {:?}: serialization failed: {e}", event.event);
                BroadcastReport::default()
            }
        }
    }

    pub fn broadcast(&self, frame: Frame) -> BroadcastReport {
        let members = self.registry.snapshot();
        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, sink) in members {
            match sink.try_deliver(&frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(target: "realtime", conn = %id, "{e}");
                    failed.push(id);
                }
            }
        }
        for id in failed {
            self.registry.remove(id);
            report.dropped += 1;
        }
        report
    }
}
