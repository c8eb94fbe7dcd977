//! Intent classification results.

use serde::{Deserialize, Serialize};

/// What the user appears to be doing, inferred from recent behavior.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentKind {
    /// Repeated edits around the same spot plus pauses, likely needing help.
    Stuck,
    /// Lots of cursor movement, little editing, looking for something.
    Searching,
    /// Steady writing, not to be interrupted.
    Drafting,
    /// No recent activity.
    Idle,
    /// Nothing matched.
    Unknown,
}

impl IntentKind {
    /// Intents where the agent should not intervene.
    pub fn no_intervention(&self) -> bool {
        matches!(self, Self::Drafting | Self::Idle)
    }
}

/// Derived classification. Recomputed per event window, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: IntentKind,
    /// In `[0, 1]`.
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl IntentResult {
    pub fn new(intent: IntentKind, confidence: f32) -> Self {
        Self {
            intent,
            confidence,
            suggestion: None,
        }
    }
}
