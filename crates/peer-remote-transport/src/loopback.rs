//! In-memory transport for demos and tests.
//!
//! `LoopbackTransport` is handed to the session; `LoopbackRemote` plays the
//! network and the host: it registers hosts, accepts or rejects invites,
//! delivers payloads and observes everything the session sends.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use peer_remote_core::{
    ConnectionState, PeerDescriptor, PeerId, PeerTransport, SendMode, TransportError,
    TransportEvent, TransportEventSender,
};
use tokio::sync::mpsc;

use crate::protocol::{self, DecodeError, WireMessage};

/// One payload handed to [`LoopbackTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPayload {
    pub peers: Vec<PeerId>,
    pub payload: Bytes,
    pub mode: SendMode,
}

impl SentPayload {
    /// Decode as a structured message.
    ///
    /// # Errors
    /// Returns error if the payload is not a structured message.
    pub fn wire(&self) -> Result<WireMessage, DecodeError> {
        protocol::decode(&self.payload)
    }

    /// The payload as (lossy) text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Default)]
struct Network {
    discovering: bool,
    auto_accept: bool,
    fail_sends: bool,
    hosts: HashMap<PeerId, PeerDescriptor>,
    connected: Vec<PeerId>,
    invites: Vec<(PeerId, Duration)>,
}

struct Shared {
    events: TransportEventSender,
    network: Mutex<Network>,
}

impl Shared {
    fn network(&self) -> MutexGuard<'_, Network> {
        self.network.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Loopback event dropped: session gone");
        }
    }

    fn connect(&self, peer: &PeerDescriptor) {
        {
            let mut net = self.network();
            if !net.connected.contains(&peer.id) {
                net.connected.push(peer.id.clone());
            }
        }
        self.post(TransportEvent::ConnectionStateChanged {
            peer: peer.clone(),
            state: ConnectionState::Connecting,
        });
        self.post(TransportEvent::ConnectionStateChanged {
            peer: peer.clone(),
            state: ConnectionState::Connected,
        });
    }
}

/// Session side of the loopback.
#[derive(Clone)]
pub struct LoopbackTransport {
    shared: Arc<Shared>,
    sent_tx: mpsc::UnboundedSender<SentPayload>,
}

/// Network/host side of the loopback.
pub struct LoopbackRemote {
    shared: Arc<Shared>,
    sent_rx: mpsc::UnboundedReceiver<SentPayload>,
}

impl LoopbackTransport {
    /// Create a loopback pair posting transport events into `events`.
    #[must_use]
    pub fn new(events: TransportEventSender) -> (Self, LoopbackRemote) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            events,
            network: Mutex::new(Network {
                auto_accept: true,
                ..Network::default()
            }),
        });

        let transport = Self {
            shared: Arc::clone(&shared),
            sent_tx,
        };
        let remote = LoopbackRemote { shared, sent_rx };
        (transport, remote)
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn start_discovery(&self) -> Result<(), TransportError> {
        let hosts: Vec<PeerDescriptor> = {
            let mut net = self.shared.network();
            net.discovering = true;
            net.hosts.values().cloned().collect()
        };
        for peer in hosts {
            self.shared.post(TransportEvent::PeerFound {
                peer,
                info: HashMap::new(),
            });
        }
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        self.shared.network().discovering = false;
        Ok(())
    }

    async fn invite(&self, peer: &PeerId, timeout: Duration) -> Result<(), TransportError> {
        let (descriptor, auto_accept) = {
            let mut net = self.shared.network();
            let descriptor = net
                .hosts
                .get(peer)
                .cloned()
                .ok_or_else(|| TransportError::UnknownPeer(peer.clone()))?;
            net.invites.push((peer.clone(), timeout));
            (descriptor, net.auto_accept)
        };

        if auto_accept {
            self.shared.connect(&descriptor);
        } else {
            self.shared.post(TransportEvent::ConnectionStateChanged {
                peer: descriptor,
                state: ConnectionState::Connecting,
            });
        }
        Ok(())
    }

    async fn send(
        &self,
        payload: Bytes,
        peers: &[PeerId],
        mode: SendMode,
    ) -> Result<(), TransportError> {
        {
            let net = self.shared.network();
            if net.fail_sends {
                return Err(TransportError::SendFailed("loopback send failure".to_string()));
            }
            if peers.is_empty() {
                return Err(TransportError::NotReady);
            }
            if let Some(missing) = peers.iter().find(|p| !net.connected.contains(*p)) {
                return Err(TransportError::UnknownPeer(missing.clone()));
            }
        }

        self.sent_tx
            .send(SentPayload {
                peers: peers.to_vec(),
                payload,
                mode,
            })
            .map_err(|_| TransportError::SendFailed("loopback remote dropped".to_string()))
    }
}

impl LoopbackRemote {
    /// Register a host. Announced immediately if the session is browsing.
    #[must_use]
    pub fn add_host(&self, display_name: &str) -> PeerDescriptor {
        let peer = PeerDescriptor::new(PeerId::generate(), display_name);
        let discovering = {
            let mut net = self.shared.network();
            net.hosts.insert(peer.id.clone(), peer.clone());
            net.discovering
        };
        if discovering {
            self.shared.post(TransportEvent::PeerFound {
                peer: peer.clone(),
                info: HashMap::new(),
            });
        }
        peer
    }

    /// Remove a host, reporting it lost.
    pub fn remove_host(&self, peer: &PeerId) {
        self.shared.network().hosts.remove(peer);
        self.shared.post(TransportEvent::PeerLost { peer: peer.clone() });
    }

    /// Whether invites connect on their own.
    pub fn set_auto_accept(&self, auto_accept: bool) {
        self.shared.network().auto_accept = auto_accept;
    }

    /// Make every subsequent send fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.shared.network().fail_sends = fail;
    }

    #[must_use]
    pub fn is_discovering(&self) -> bool {
        self.shared.network().discovering
    }

    /// Invites received so far, with the timeout each carried.
    #[must_use]
    pub fn invites(&self) -> Vec<(PeerId, Duration)> {
        self.shared.network().invites.clone()
    }

    /// Complete a connection (e.g. one left pending by `set_auto_accept(false)`).
    pub fn accept(&self, peer: &PeerDescriptor) {
        self.shared.connect(peer);
    }

    /// Reject a pending invite.
    pub fn reject_invite(&self, peer: &PeerDescriptor, reason: &str) {
        self.shared.post(TransportEvent::ConnectionStateChanged {
            peer: peer.clone(),
            state: ConnectionState::NotConnected,
        });
        self.shared.post(TransportEvent::InviteFailed {
            peer: Some(peer.id.clone()),
            error: TransportError::InviteFailed(reason.to_string()),
        });
    }

    /// Drop a connected peer.
    pub fn disconnect(&self, peer: &PeerDescriptor) {
        self.shared.network().connected.retain(|p| p != &peer.id);
        self.shared.post(TransportEvent::ConnectionStateChanged {
            peer: peer.clone(),
            state: ConnectionState::NotConnected,
        });
    }

    /// Deliver raw bytes from a peer.
    pub fn deliver(&self, peer: &PeerId, data: impl Into<Bytes>) {
        self.shared.post(TransportEvent::DataReceived {
            peer: peer.clone(),
            data: data.into(),
        });
    }

    /// Deliver a structured message from a peer.
    ///
    /// # Errors
    /// Returns error if the message cannot be encoded.
    pub fn deliver_wire(
        &self,
        peer: &PeerId,
        message: &WireMessage,
    ) -> Result<(), protocol::EncodeError> {
        self.deliver(peer, protocol::encode(message)?);
        Ok(())
    }

    /// Wait for the next payload the session sends.
    pub async fn recv_sent(&mut self) -> Option<SentPayload> {
        self.sent_rx.recv().await
    }

    /// Next sent payload, if one is already queued.
    pub fn try_recv_sent(&mut self) -> Option<SentPayload> {
        self.sent_rx.try_recv().ok()
    }

    /// Everything sent so far.
    pub fn drain_sent(&mut self) -> Vec<SentPayload> {
        let mut sent = Vec::new();
        while let Some(payload) = self.try_recv_sent() {
            sent.push(payload);
        }
        sent
    }
}
