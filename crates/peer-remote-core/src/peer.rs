//! Peer identity and session lifecycle types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque transport-assigned peer identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap a transport-provided identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A discovered or connected peer.
///
/// Equality is by identity only; the display name is informational.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Transport identity.
    pub id: PeerId,
    /// Human-readable name.
    pub display_name: String,
}

impl PeerDescriptor {
    #[must_use]
    pub fn new(id: PeerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

impl PartialEq for PeerDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Lifecycle of the single active peer session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "peer", rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing running.
    #[default]
    Idle,
    /// Browsing for hosts.
    Discovering,
    /// Invite sent, waiting for the transport.
    Connecting(PeerDescriptor),
    /// Session established.
    Connected(PeerDescriptor),
    /// The last connected peer went away.
    Disconnected,
}

impl SessionState {
    /// The peer this state refers to, if any.
    #[must_use]
    pub const fn peer(&self) -> Option<&PeerDescriptor> {
        match self {
            Self::Connecting(peer) | Self::Connected(peer) => Some(peer),
            Self::Idle | Self::Discovering | Self::Disconnected => None,
        }
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Connecting(_) => "connecting",
            Self::Connected(_) => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Per-peer connection state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    NotConnected,
}
