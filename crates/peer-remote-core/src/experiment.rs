//! Experiment window state.

use serde::{Deserialize, Serialize};

/// Whether interactions are being recorded, and under which mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub enabled: bool,
    pub mode: String,
}

impl ExperimentConfig {
    #[must_use]
    pub fn new(enabled: bool, mode: impl Into<String>) -> Self {
        Self {
            enabled,
            mode: mode.into(),
        }
    }
}

/// Experiment state fields broadcast by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentField {
    Focus,
    Target,
    Phase,
    Score,
    Error,
}

impl ExperimentField {
    /// Parse the wire keyword (`FOCUS`, `TARGET`, ...).
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "FOCUS" => Some(Self::Focus),
            "TARGET" => Some(Self::Target),
            "PHASE" => Some(Self::Phase),
            "SCORE" => Some(Self::Score),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Focus => "FOCUS",
            Self::Target => "TARGET",
            Self::Phase => "PHASE",
            Self::Score => "SCORE",
            Self::Error => "ERROR",
        }
    }
}

/// Latest value received for each experiment field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExperimentState {
    pub focus: Option<String>,
    pub target: Option<String>,
    pub phase: Option<String>,
    pub score: Option<String>,
    pub error: Option<String>,
}

impl ExperimentState {
    /// Overwrite one field.
    pub fn set(&mut self, field: ExperimentField, value: impl Into<String>) {
        let slot = match field {
            ExperimentField::Focus => &mut self.focus,
            ExperimentField::Target => &mut self.target,
            ExperimentField::Phase => &mut self.phase,
            ExperimentField::Score => &mut self.score,
            ExperimentField::Error => &mut self.error,
        };
        *slot = Some(value.into());
    }

    #[must_use]
    pub fn get(&self, field: ExperimentField) -> Option<&str> {
        match field {
            ExperimentField::Focus => self.focus.as_deref(),
            ExperimentField::Target => self.target.as_deref(),
            ExperimentField::Phase => self.phase.as_deref(),
            ExperimentField::Score => self.score.as_deref(),
            ExperimentField::Error => self.error.as_deref(),
        }
    }
}
