//! Inbound payload decoding.
//!
//! Payloads go through an ordered list of decoders. The first one that
//! accepts the bytes wins; if none does, the bytes are surfaced as plain
//! text so nothing received is ever dropped.

use thiserror::Error;

use crate::{
    legacy::{LegacyCommand, LegacyParseError},
    protocol::{self, DecodeError, WireMessage},
};

/// A decoded inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Structured tagged message.
    Wire(WireMessage),
    /// Recognised legacy text command.
    Legacy { text: String, command: LegacyCommand },
    /// Anything else, as (lossy) UTF-8 text.
    Text(String),
}

impl Inbound {
    /// The payload as text, for every non-structured variant.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Wire(_) => None,
            Self::Legacy { text, .. } | Self::Text(text) => Some(text),
        }
    }
}

/// Why a decoder declined a payload.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error(transparent)]
    Structured(#[from] DecodeError),
    #[error(transparent)]
    Legacy(#[from] LegacyParseError),
    #[error("Payload is not valid UTF-8")]
    NotUtf8,
}

impl InboundError {
    /// The payload belonged to this decoder's format but was damaged.
    #[must_use]
    pub const fn is_damaged(&self) -> bool {
        match self {
            Self::Structured(e) => e.is_envelope(),
            Self::Legacy(e) => e.is_malformed(),
            Self::NotUtf8 => false,
        }
    }
}

/// One format in the decoding chain.
pub trait InboundDecoder: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Accept the payload or explain why not. Must not panic.
    ///
    /// # Errors
    /// Returns error if the payload is not in this decoder's format.
    fn decode(&self, bytes: &[u8]) -> Result<Inbound, InboundError>;
}

/// Tagged JSON envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredDecoder;

impl InboundDecoder for StructuredDecoder {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Inbound, InboundError> {
        Ok(Inbound::Wire(protocol::decode(bytes)?))
    }
}

/// Colon-delimited text commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyDecoder;

impl InboundDecoder for LegacyDecoder {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Inbound, InboundError> {
        let text = std::str::from_utf8(bytes).map_err(|_| InboundError::NotUtf8)?;
        let command = LegacyCommand::parse(text)?;
        Ok(Inbound::Legacy {
            text: text.to_string(),
            command,
        })
    }
}

/// Ordered decoder list with a raw-text fallback.
pub struct DecoderChain {
    decoders: Vec<Box<dyn InboundDecoder>>,
}

impl Default for DecoderChain {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderChain {
    /// Structured first, then legacy.
    #[must_use]
    pub fn new() -> Self {
        Self::empty()
            .with_decoder(StructuredDecoder)
            .with_decoder(LegacyDecoder)
    }

    /// A chain that only produces raw text.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Append a decoder after the existing ones.
    #[must_use]
    pub fn with_decoder(mut self, decoder: impl InboundDecoder + 'static) -> Self {
        self.decoders.push(Box::new(decoder));
        self
    }

    /// Names of the decoders, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// Decode a payload. Never fails.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> Inbound {
        for decoder in &self.decoders {
            match decoder.decode(bytes) {
                Ok(inbound) => return inbound,
                Err(e) if e.is_damaged() => {
                    tracing::warn!(decoder = decoder.name(), "Damaged payload: {e}");
                }
                Err(e) => {
                    tracing::trace!(decoder = decoder.name(), "Declined payload: {e}");
                }
            }
        }
        Inbound::Text(String::from_utf8_lossy(bytes).into_owned())
    }
}
