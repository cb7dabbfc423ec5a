//! Structured wire protocol between handheld and host.
//!
//! Every message is one JSON envelope `{"type": <tag>, "payload": {...}}`
//! carried as a single transport payload.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Protocol version announced in `Hello`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Tagged message exchanged with the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum WireMessage {
    /// Sent once per new connection.
    Hello(Hello),
    /// Round-trip latency request.
    Ping(Ping),
    /// Echo of a ping's timestamp.
    Pong(Pong),
    /// Interaction mode change.
    ModeSet(ModeSet),
    /// Tap at a normalized position.
    WebTap(WebTap),
    /// Scroll by a signed delta.
    WebScroll(WebScroll),
    /// Tap wherever the host is currently looking.
    WebHoverTap(HoverTap),
}

impl WireMessage {
    /// Every tag the decoder accepts.
    pub const TAGS: [&'static str; 7] = [
        "hello",
        "ping",
        "pong",
        "modeSet",
        "webTap",
        "webScroll",
        "webHoverTap",
    ];

    /// Envelope tag of this message.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::ModeSet(_) => "modeSet",
            Self::WebTap(_) => "webTap",
            Self::WebScroll(_) => "webScroll",
            Self::WebHoverTap(_) => "webHoverTap",
        }
    }

    /// Client hello with the given capabilities.
    #[must_use]
    pub const fn hello(version: u32, capabilities: Capabilities) -> Self {
        Self::Hello(Hello {
            role: Role::Client,
            version,
            capabilities,
        })
    }

    /// Ping stamped with the current wall clock.
    #[must_use]
    pub fn ping_now() -> Self {
        Self::Ping(Ping { t: unix_now() })
    }

    #[must_use]
    pub const fn web_scroll(dx: f64, dy: f64) -> Self {
        Self::WebScroll(WebScroll { dx, dy })
    }

    /// Tap at a normalized position, clamped into `[0, 1]`.
    #[must_use]
    pub fn web_tap(nx: f64, ny: f64) -> Self {
        Self::WebTap(WebTap {
            nx: nx.clamp(0.0, 1.0),
            ny: ny.clamp(0.0, 1.0),
        })
    }

    #[must_use]
    pub const fn web_hover_tap() -> Self {
        Self::WebHoverTap(HoverTap {})
    }

    #[must_use]
    pub fn mode_set(mode: impl Into<String>) -> Self {
        Self::ModeSet(ModeSet { mode: mode.into() })
    }

    fn numeric_fields(&self) -> Vec<(&'static str, f64)> {
        match self {
            Self::Ping(Ping { t }) | Self::Pong(Pong { t }) => vec![("t", *t)],
            Self::WebTap(WebTap { nx, ny }) => vec![("nx", *nx), ("ny", *ny)],
            Self::WebScroll(WebScroll { dx, dy }) => vec![("dx", *dx), ("dy", *dy)],
            Self::Hello(_) | Self::ModeSet(_) | Self::WebHoverTap(_) => Vec::new(),
        }
    }
}

/// Which side of the link a peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "vision")]
    Host,
    #[serde(alias = "iphone")]
    Client,
}

/// Optional features a peer supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(alias = "jsTap")]
    pub supports_tap_events: bool,
    #[serde(alias = "nativeScroll")]
    pub supports_native_scroll: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_tap_events: true,
            supports_native_scroll: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub role: Role,
    pub version: u32,
    pub capabilities: Capabilities,
}

/// Timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub t: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSet {
    pub mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WebTap {
    pub nx: f64,
    pub ny: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WebScroll {
    pub dx: f64,
    pub dy: f64,
}

/// Hover taps carry no fields; the payload is always `{}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HoverTap {}

/// Encode error.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Non-finite value in field {field}")]
    NonFinite { field: &'static str },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode error.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not a JSON object with a string `type` field.
    #[error("Not a tagged envelope")]
    NotEnvelope,
    #[error("Unknown message tag: {0}")]
    UnknownTag(String),
    /// A known tag whose payload does not match its shape.
    #[error("Malformed {tag} payload: {source}")]
    Malformed {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Whether the bytes were an envelope at all.
    ///
    /// `false` means the bytes belong to another format; `true` means a
    /// structured message was damaged and deserves attention.
    #[must_use]
    pub const fn is_envelope(&self) -> bool {
        !matches!(self, Self::NotEnvelope)
    }
}

/// Encode a message into one transport payload.
///
/// # Errors
/// Returns error if a numeric field is NaN or infinite.
pub fn encode(message: &WireMessage) -> Result<Bytes, EncodeError> {
    if let Some((field, _)) = message
        .numeric_fields()
        .into_iter()
        .find(|(_, v)| !v.is_finite())
    {
        return Err(EncodeError::NonFinite { field });
    }
    Ok(Bytes::from(serde_json::to_vec(message)?))
}

/// Decode one transport payload.
///
/// # Errors
/// Returns error if the bytes are not an envelope, carry an unknown tag, or
/// the payload does not match the tag.
pub fn decode(bytes: &[u8]) -> Result<WireMessage, DecodeError> {
    let mut value: Value = serde_json::from_slice(bytes).map_err(|_| DecodeError::NotEnvelope)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::NotEnvelope)?
        .to_string();

    if !WireMessage::TAGS.contains(&tag.as_str()) {
        return Err(DecodeError::UnknownTag(tag));
    }
    if tag == "webHoverTap" {
        fill_empty_payload(&mut value);
    }

    serde_json::from_value(value).map_err(|source| DecodeError::Malformed { tag, source })
}

/// A missing or null payload reads as `{}`.
fn fill_empty_payload(value: &mut Value) {
    if let Some(envelope) = value.as_object_mut() {
        let payload = envelope.entry("payload").or_insert(Value::Null);
        if payload.is_null() {
            *payload = Value::Object(Map::new());
        }
    }
}

/// Current wall clock in seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}
