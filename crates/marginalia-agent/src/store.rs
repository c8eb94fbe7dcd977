//! Transactional store contract.
//!
//! The relational datastore is an external collaborator reached through
//! RPC-style atomic operations; this crate never computes a balance or trust
//! score client-side and writes it back. [`RestStore`] is the production
//! client; [`MemoryStore`] is the in-process double used by tests.

mod memory;
mod rest;

pub use memory::{MemoryStore, SpendRecord, TrustRecord};
pub use rest::RestStore;

use async_trait::async_trait;
use marginalia_types::{
    AgentConfig, AgentId, BehaviorEvent, ConversationId, PageId, RequestId, TrustAdjustment,
    TrustEventType, UserId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the transactional store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The agent's budget or spend limit is exhausted. Fatal to that agent's
    /// loop only.
    #[error("budget exceeded")]
    BudgetExceeded,

    /// The bearer credential was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Transport-level failure (network, timeout, 5xx).
    #[error("store request failed: {0}")]
    Request(String),

    /// The store answered with something undecodable.
    #[error("store response decode failed: {0}")]
    Decode(String),
}

/// A new approval-request record, created before the card is embedded in the
/// document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub agent_id: AgentId,
    pub page_id: PageId,
    /// Always "write" for document suggestions.
    pub action_type: String,
    /// The suggested text.
    pub description: String,
    /// Estimated cost of the generation, JPY.
    pub amount_jpy: f64,
    pub intent: String,
    pub agent_name: String,
}

/// An ambient agent row, as returned by `ambient_agents`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbientAgent {
    pub agent_id: AgentId,
    pub owner_id: UserId,
}

/// A durable per-(user, conversation) context summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub summary: String,
    /// Approximate token count of the source text the summary was built from;
    /// used for the cheap has-it-changed check.
    pub token_count: u32,
}

/// The transactional store: row lookups plus atomic stored operations.
///
/// All mutations that race (trust, spend) are single opaque atomic calls;
/// this side only interprets the result.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Resolve a bearer token to a user. `Ok(None)` means invalid token.
    async fn verify_token(&self, token: &str) -> Result<Option<UserId>, StoreError>;

    /// Agent assignment for a page, `None` when the page has no agent.
    async fn page_agent(&self, page_id: &PageId) -> Result<Option<AgentConfig>, StoreError>;

    /// Display name for a user profile.
    async fn profile_name(&self, user_id: &UserId) -> Result<Option<String>, StoreError>;

    /// Most recent behavior events for a page, newest last.
    async fn recent_behavior(
        &self,
        page_id: &PageId,
        limit: usize,
    ) -> Result<Vec<BehaviorEvent>, StoreError>;

    /// Create a durable approval-request record; returns its ID.
    async fn create_approval_request(
        &self,
        request: &ApprovalRequest,
    ) -> Result<RequestId, StoreError>;

    /// Atomic trust mutation: read-modify-write with clamping to `[0, 100]`,
    /// recorded with the event type and reason.
    async fn adjust_trust(
        &self,
        agent_id: &AgentId,
        event_type: TrustEventType,
        delta: i32,
        reason: &str,
    ) -> Result<TrustAdjustment, StoreError>;

    /// Atomic spend against the agent's wallet. `Err(BudgetExceeded)` means
    /// the agent's loop must stop.
    async fn agent_spend(
        &self,
        agent_id: &AgentId,
        amount_jpy: f64,
        description: &str,
    ) -> Result<(), StoreError>;

    /// All active ambient agents.
    async fn ambient_agents(&self) -> Result<Vec<AmbientAgent>, StoreError>;

    /// Conversations a user participates in.
    async fn member_conversations(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ConversationId>, StoreError>;

    /// Most recent pages of a conversation, newest first.
    async fn recent_pages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<PageId>, StoreError>;

    /// Stored summary for one (user, conversation), if any.
    async fn context_summary(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ContextSummary>, StoreError>;

    /// Insert-or-replace a summary keyed by (user, conversation).
    async fn upsert_context_summary(&self, summary: &ContextSummary) -> Result<(), StoreError>;

    /// All stored summaries for a user, feeding ambient ticks.
    async fn cross_context_summaries(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ContextSummary>, StoreError>;
}
