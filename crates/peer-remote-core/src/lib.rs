//! Core abstractions for peer remote-control sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionConfig` - Tunables for discovery, handshake, shaping and export
//! - `PeerDescriptor` / `SessionState` - Peer identity and connection lifecycle
//! - `ExperimentConfig` / `ExperimentState` - Experiment window state
//! - `PeerTransport` - The seam to the underlying discovery/delivery service

pub mod config;
pub mod experiment;
pub mod peer;
pub mod traits;

pub use config::SessionConfig;
pub use experiment::{ExperimentConfig, ExperimentField, ExperimentState};
pub use peer::{ConnectionState, PeerDescriptor, PeerId, SessionState};
pub use traits::{
    PeerTransport, SendMode, TransportError, TransportEvent, TransportEventReceiver,
    TransportEventSender, transport_event_channel,
};
