//! Shared types for Marginalia.
//!
//! This crate is the relational foundation: typed IDs, behavior/agent events,
//! agent configuration, intent results, and the trust policy. It has **no
//! internal marginalia dependencies**: a pure leaf crate that other crates
//! build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Page (PageId) ← one CRDT document per page
//!     └── assigned Agent (AgentId), cached as AgentConfig on document load
//!     └── receives AgentEvent over the stateless realtime channel
//!     └── accumulates BehaviorEvent in the transactional store
//!
//! Agent (AgentId)
//!     └── owned by User (UserId)
//!     └── carries a TrustScore (0–100) gating its autonomy
//!     └── participates in Conversations (ConversationId) via its owner
//! ```
//!
//! The trust policy lives here because it is pure: `resolve_action` and
//! `tier_for` are deterministic functions of score and never touch I/O.

pub mod agent;
pub mod event;
pub mod ids;
pub mod intent;
pub mod trust;

// Re-export primary types at crate root for convenience.
pub use agent::{AgentConfig, AgentStatus, AwarenessUser, LlmPrefs, AGENT_COLOR};
pub use event::{AgentEvent, AgentEventType, BehaviorEvent, BehaviorEventType};
pub use ids::{AgentId, ConversationId, PageId, RequestId, UserId};
pub use intent::{IntentKind, IntentResult};
pub use trust::{
    resolve_action, tier_for, ActionKind, TrustAdjustment, TrustEventType, TrustTier, TRUST_TIERS,
};

/// Current time as Unix milliseconds. Used by constructors throughout the crate.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
