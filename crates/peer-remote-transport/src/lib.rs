//! Wire formats and transports for peer remote-control sessions.
//!
//! Provides:
//! - Structured wire protocol (tagged JSON envelopes)
//! - Legacy colon-delimited text commands
//! - Ordered inbound decoder chain
//! - In-memory loopback transport (feature: loopback)

pub mod inbound;
pub mod legacy;
pub mod protocol;

#[cfg(feature = "loopback")]
pub mod loopback;

pub use inbound::{DecoderChain, Inbound, InboundDecoder, InboundError};
pub use legacy::{Key, LegacyCommand, LegacyParseError, NavAction};
pub use protocol::{Capabilities, DecodeError, EncodeError, Role, WireMessage, decode, encode};

#[cfg(feature = "loopback")]
pub use loopback::{LoopbackRemote, LoopbackTransport, SentPayload};
