//! Session configuration.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Prefix for environment overrides read by [`SessionConfig::from_env`].
pub const ENV_PREFIX: &str = "PEER_REMOTE_";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tunables for a remote-control session.
///
/// Every field has a default, so a partial JSON document (or none at all)
/// yields a usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Display name of this device. Also prefixes export file names.
    pub device_name: String,

    /// Service type advertised/browsed by the transport.
    pub service_type: String,

    /// Protocol version announced in `Hello`.
    pub protocol_version: u32,

    /// Interaction mode the session starts in.
    pub initial_mode: String,

    /// Capability flag announced in `Hello`.
    pub supports_tap_events: bool,

    /// Capability flag announced in `Hello`.
    pub supports_native_scroll: bool,

    /// Invite timeout handed to the transport.
    pub invite_timeout_ms: u64,

    /// Local stall watchdog for `Connecting`. `None` disables it.
    pub stall_timeout_ms: Option<u64>,

    /// Sensitivity gain applied to drag deltas.
    pub drag_gain: f64,

    /// Minimum spacing between drag flushes.
    pub drag_flush_interval_us: u64,

    /// Number of sub-deltas a precision scroll is split into.
    pub precision_steps: u32,

    /// Delay between precision scroll sub-deltas.
    pub precision_step_delay_ms: u64,

    /// Directory receiving interaction CSV exports.
    pub export_dir: PathBuf,

    /// Number of session events kept for late subscribers.
    pub event_history: usize,

    /// Arbitrary metadata for app-specific needs.
    pub metadata: HashMap<String, Value>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: "Handheld".to_string(),
            service_type: "peer-remote".to_string(),
            protocol_version: 1,
            initial_mode: "directTouch".to_string(),
            supports_tap_events: true,
            supports_native_scroll: true,
            invite_timeout_ms: 10_000,
            stall_timeout_ms: Some(15_000),
            drag_gain: 1.2,
            drag_flush_interval_us: 1_000_000 / 90,
            precision_steps: 5,
            precision_step_delay_ms: 16,
            export_dir: default_export_dir(),
            event_history: 256,
            metadata: HashMap::new(),
        }
    }
}

/// Durable per-app directory for exports, falling back to the working directory.
#[must_use]
pub fn default_export_dir() -> PathBuf {
    dirs::data_local_dir().map_or_else(
        || PathBuf::from("exports"),
        |d| d.join("peer-remote").join("exports"),
    )
}

impl SessionConfig {
    /// Create a configuration with defaults and the given device name.
    #[must_use]
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            ..Self::default()
        }
    }

    /// Parse a (possibly partial) JSON document.
    ///
    /// # Errors
    /// Returns error if the document is not valid JSON or has mistyped fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by `PEER_REMOTE_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from a key lookup (keys without the env prefix).
    ///
    /// # Errors
    /// Returns error if a numeric value cannot be parsed.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("DEVICE_NAME") {
            self.device_name = name;
        }
        if let Some(mode) = lookup("INITIAL_MODE") {
            self.initial_mode = mode;
        }
        if let Some(dir) = lookup("EXPORT_DIR") {
            self.export_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("DRAG_GAIN") {
            self.drag_gain = parse_value("DRAG_GAIN", &v)?;
        }
        if let Some(v) = lookup("INVITE_TIMEOUT_MS") {
            self.invite_timeout_ms = parse_value("INVITE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("STALL_TIMEOUT_MS") {
            self.stall_timeout_ms = match v.trim() {
                "off" | "0" => None,
                other => Some(parse_value("STALL_TIMEOUT_MS", other)?),
            };
        }
        if let Some(v) = lookup("PRECISION_STEP_DELAY_MS") {
            self.precision_step_delay_ms = parse_value("PRECISION_STEP_DELAY_MS", &v)?;
        }
        Ok(self)
    }

    #[must_use]
    pub const fn invite_timeout(&self) -> Duration {
        Duration::from_millis(self.invite_timeout_ms)
    }

    #[must_use]
    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub const fn drag_flush_interval(&self) -> Duration {
        Duration::from_micros(self.drag_flush_interval_us)
    }

    #[must_use]
    pub const fn precision_step_delay(&self) -> Duration {
        Duration::from_millis(self.precision_step_delay_ms)
    }

    /// Get a metadata value by key.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Set a metadata value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}
