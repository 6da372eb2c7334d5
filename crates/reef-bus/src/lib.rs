use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;

/// Identifier of a peer process on the bus. Every render node maps to
/// exactly one peer; the server is a peer like any other.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PeerId(pub u64);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub peer: PeerId,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("peer {0} is disconnected")]
    Disconnected(PeerId),
    #[error("peer {0} receiver already taken")]
    ReceiverTaken(PeerId),
    #[error("bus channel closed")]
    Closed,
    #[error("bus transport error: {0}")]
    Transport(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// Ordered, reliable, one-way message delivery to peers. Messages for
/// one peer arrive in send order; the bus promises nothing across
/// peers. Sends never block the caller.
pub trait Bus: Send + Sync {
    /// Take the inbound queue of a peer. Messages sent before the
    /// first `subscribe` are buffered, not dropped.
    fn subscribe(&self, peer: PeerId) -> BusResult<mpsc::UnboundedReceiver<BusMessage>>;
    fn send(&self, peer: PeerId, payload: Bytes) -> BusResult<()>;
    /// Mark a peer as gone. Subsequent sends fail with `Disconnected`.
    fn disconnect(&self, peer: PeerId);
    fn is_connected(&self, peer: PeerId) -> bool;
}

struct PeerState {
    tx: mpsc::UnboundedSender<BusMessage>,
    rx: Option<mpsc::UnboundedReceiver<BusMessage>>,
    connected: bool,
}

impl PeerState {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            connected: true,
        }
    }
}

/// In-memory bus for single-process clusters and tests. Per-peer
/// ordering falls out of one unbounded channel per peer.
#[derive(Default)]
pub struct LocalBus {
    peers: RwLock<HashMap<PeerId, PeerState>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bus for LocalBus {
    fn subscribe(&self, peer: PeerId) -> BusResult<mpsc::UnboundedReceiver<BusMessage>> {
        let mut guard = self.peers.write();
        let state = guard.entry(peer).or_insert_with(PeerState::new);
        state.rx.take().ok_or(BusError::ReceiverTaken(peer))
    }

    fn send(&self, peer: PeerId, payload: Bytes) -> BusResult<()> {
        let mut guard = self.peers.write();
        let state = guard.entry(peer).or_insert_with(PeerState::new);
        if !state.connected {
            return Err(BusError::Disconnected(peer));
        }
        state
            .tx
            .send(BusMessage { peer, payload })
            .map_err(|_| BusError::Closed)
    }

    fn disconnect(&self, peer: PeerId) {
        let mut guard = self.peers.write();
        let state = guard.entry(peer).or_insert_with(PeerState::new);
        state.connected = false;
    }

    fn is_connected(&self, peer: PeerId) -> bool {
        self.peers
            .read()
            .get(&peer)
            .map(|state| state.connected)
            .unwrap_or(true)
    }
}
