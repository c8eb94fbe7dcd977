//! Behavior and agent events.
//!
//! Two event families flow through the system:
//!
//! - [`BehaviorEvent`]: raw interaction telemetry (edits, cursor moves,
//!   pauses) batched by the client into the transactional store. Append-only;
//!   the intent engine reads a recent window of them, nothing mutates them.
//! - [`AgentEvent`]: higher-level triggers pushed over the stateless realtime
//!   channel and consumed immediately by the event router. Never persisted;
//!   handlers persist derived artifacts (knowledge episodes) instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ids::{PageId, UserId};

/// Trigger events pushed by clients over the stateless channel.
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
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentEventType {
    /// The user stopped typing for a few seconds.
    InputPause,
    /// The user explicitly referenced the agent (`@agent ...`).
    Mention,
    /// The user finished a paragraph (newline after non-trivial text).
    ParagraphComplete,
    /// The user navigated from one page to another.
    PageTransition,
}

impl AgentEventType {
    /// Per-type debounce window. Events of the same type on the same page
    /// arriving closer than this are dropped by the router.
    pub fn debounce_window(&self) -> Duration {
        match self {
            Self::InputPause => Duration::from_millis(3000),
            Self::Mention => Duration::ZERO,
            Self::ParagraphComplete => Duration::from_millis(5000),
            Self::PageTransition => Duration::ZERO,
        }
    }
}

/// An agent trigger event as received from the realtime channel.
///
/// `payload` is event-type specific (`contextText`, `instructionText`,
/// `paragraphText`, `oldPageId`/`newPageId`); handlers pull out what they
/// need and tolerate missing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub event_type: AgentEventType,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Client-side ISO-8601 timestamp. Informational; the router debounces
    /// on server receive time.
    #[serde(default)]
    pub timestamp: String,
    pub user_id: UserId,
    pub page_id: PageId,
}

impl AgentEvent {
    /// Fetch a string field from the payload, `None` if absent or not a string.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// Raw interaction telemetry types.
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
pub enum BehaviorEventType {
    Edit,
    CursorMove,
    Pause,
    Selection,
    Focus,
    Blur,
}

/// One row of the behavior log. Produced by client-side tracking, flushed in
/// batches, read back by the intent engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub page_id: PageId,
    pub user_id: UserId,
    pub event_type: BehaviorEventType,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Unix milliseconds.
    pub created_at: u64,
}

impl BehaviorEvent {
    /// A minimal event with an empty payload, stamped now. Test and tooling
    /// convenience.
    pub fn simple(page_id: PageId, user_id: UserId, event_type: BehaviorEventType) -> Self {
        Self {
            page_id,
            user_id,
            event_type,
            payload: serde_json::Value::Null,
            created_at: crate::now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_windows() {
        assert_eq!(
            AgentEventType::InputPause.debounce_window(),
            Duration::from_millis(3000)
        );
        assert_eq!(
            AgentEventType::ParagraphComplete.debounce_window(),
            Duration::from_millis(5000)
        );
        assert_eq!(AgentEventType::Mention.debounce_window(), Duration::ZERO);
        assert_eq!(
            AgentEventType::PageTransition.debounce_window(),
            Duration::ZERO
        );
    }

    #[test]
    fn wire_names_are_snake_case() {
        let json = serde_json::to_string(&AgentEventType::InputPause).unwrap();
        assert_eq!(json, "\"input_pause\"");
        let back: AgentEventType = serde_json::from_str("\"paragraph_complete\"").unwrap();
        assert_eq!(back, AgentEventType::ParagraphComplete);
    }

    #[test]
    fn agent_event_payload_access() {
        let event = AgentEvent {
            event_type: AgentEventType::Mention,
            payload: serde_json::json!({ "instructionText": "summarize this" }),
            timestamp: String::new(),
            user_id: UserId::new(),
            page_id: PageId::new(),
        };
        assert_eq!(event.payload_str("instructionText"), Some("summarize this"));
        assert_eq!(event.payload_str("missing"), None);
    }

    #[test]
    fn agent_event_deserializes_from_wire_shape() {
        let page = PageId::new();
        let user = UserId::new();
        let json = format!(
            r#"{{"type":"input_pause","payload":{{"contextText":"hello"}},"timestamp":"2026-01-01T00:00:00Z","userId":"{user}","pageId":"{page}"}}"#
        );
        let event: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.event_type, AgentEventType::InputPause);
        assert_eq!(event.page_id, page);
        assert_eq!(event.user_id, user);
    }
}
