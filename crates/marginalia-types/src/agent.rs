//! Agent configuration and presence types.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, PageId, UserId};

/// Presence color for agent awareness states.
pub const AGENT_COLOR: &str = "#8b5cf6";

/// Per-provider LLM preferences attached to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmPrefs {
    /// Provider identifier (e.g. "deepseek", "openrouter", "local").
    pub provider: String,
    /// Model override; provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Extra system prompt prepended to generated prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Agent assignment for a page, cached in memory on document load.
///
/// Single writer (the document-load hook / explicit refresh); read by all
/// handlers for that page. `trust_score` is a cache of the store-of-record
/// value and may go stale until the next refresh; gating decisions re-read
/// it before acting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub page_id: PageId,
    pub agent_id: AgentId,
    pub agent_name: String,
    pub trust_score: u8,
    #[serde(default)]
    pub is_ambient: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmPrefs>,
}

/// Agent presence status, broadcast through document awareness.
///
/// Transitions: `Offline → Online → Thinking → Online → … → Offline`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Thinking,
    #[default]
    Offline,
}

/// Ephemeral per-session presence state, broadcast alongside document sync.
/// Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessUser {
    pub name: String,
    pub color: String,
    /// "user" or "agent".
    pub role: String,
    pub status: AgentStatus,
    pub is_typing: bool,
}

impl AwarenessUser {
    /// Presence state for an agent. `is_typing` is true iff the agent is
    /// thinking.
    pub fn agent(name: impl Into<String>, status: AgentStatus) -> Self {
        Self {
            name: name.into(),
            color: AGENT_COLOR.to_string(),
            role: "agent".to_string(),
            status,
            is_typing: status == AgentStatus::Thinking,
        }
    }
}
