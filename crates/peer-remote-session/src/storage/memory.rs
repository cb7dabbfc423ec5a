//! In-memory interaction buffer.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionLogEntry {
    /// When the interaction happened.
    pub timestamp: DateTime<Utc>,
    /// Short type tag (`webScroll`, `WEB_NAV`, ...).
    pub kind: String,
    /// Free-form details.
    pub details: String,
}

impl InteractionLogEntry {
    #[must_use]
    pub fn new(kind: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: kind.into(),
            details: details.into(),
        }
    }

    /// Sortable absolute timestamp (RFC 3339, UTC, milliseconds).
    #[must_use]
    pub fn timestamp_text(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Append-only buffer that only records while switched on.
///
/// Data is lost on restart unless exported.
#[derive(Debug, Default)]
pub struct InteractionLog {
    recording: bool,
    entries: Vec<InteractionLogEntry>,
}

impl InteractionLog {
    /// Create an empty, idle log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the buffer and start recording.
    pub fn start(&mut self) {
        self.entries.clear();
        self.recording = true;
    }

    /// Stop recording. The buffer is kept until cleared.
    pub fn stop(&mut self) {
        self.recording = false;
    }

    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    /// Append an entry. No-op while not recording.
    pub fn record(&mut self, kind: impl Into<String>, details: impl Into<String>) {
        if self.recording {
            self.entries.push(InteractionLogEntry::new(kind, details));
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[InteractionLogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
