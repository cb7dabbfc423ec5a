//! The peer transport seam.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ConnectionState, PeerDescriptor, PeerId};

/// Delivery guarantee requested for a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Ordered, retransmitted by the transport.
    #[default]
    Reliable,
    /// Best effort.
    Unreliable,
}

/// Transport error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport not ready")]
    NotReady,
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Invite failed: {0}")]
    InviteFailed(String),
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),
}

/// Events a transport delivers to the session.
///
/// Transports post these from whatever context their callbacks run on; the
/// session owner consumes them one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A host was found while browsing.
    PeerFound {
        peer: PeerDescriptor,
        info: HashMap<String, String>,
    },
    /// A previously found host disappeared.
    PeerLost { peer: PeerId },
    /// A peer's connection state changed.
    ConnectionStateChanged {
        peer: PeerDescriptor,
        state: ConnectionState,
    },
    /// One complete payload from a connected peer.
    DataReceived { peer: PeerId, data: Bytes },
    /// An invite was rejected or timed out inside the transport.
    InviteFailed {
        peer: Option<PeerId>,
        error: TransportError,
    },
    /// Browsing could not start.
    DiscoveryFailed { error: TransportError },
}

/// Sink handed to transports for posting events.
pub type TransportEventSender = tokio::sync::mpsc::UnboundedSender<TransportEvent>;

/// Receiving end consumed by the session owner.
pub type TransportEventReceiver = tokio::sync::mpsc::UnboundedReceiver<TransportEvent>;

/// Create the event channel linking a transport to its session.
#[must_use]
pub fn transport_event_channel() -> (TransportEventSender, TransportEventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Trait for local peer discovery and delivery backends.
///
/// Calls must not block on the network: sends are single attempts that
/// report readiness problems immediately. Ordering and retransmission are
/// the transport's responsibility.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Start browsing for hosts.
    async fn start_discovery(&self) -> Result<(), TransportError>;

    /// Stop browsing. Existing sessions are unaffected.
    async fn stop_discovery(&self) -> Result<(), TransportError>;

    /// Invite a discovered host, bounded by the transport's own timeout.
    async fn invite(&self, peer: &PeerId, timeout: Duration) -> Result<(), TransportError>;

    /// Deliver one payload to the given peers.
    async fn send(&self, payload: Bytes, peers: &[PeerId], mode: SendMode)
    -> Result<(), TransportError>;
}
