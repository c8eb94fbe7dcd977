//! In-memory store for tests and single-node development.

use std::collections::HashMap;

use async_trait::async_trait;
use marginalia_types::{
    AgentConfig, AgentId, BehaviorEvent, ConversationId, PageId, RequestId, TrustAdjustment,
    TrustEventType, UserId,
};
use parking_lot::Mutex;

use super::{AmbientAgent, ApprovalRequest, ContextSummary, DataStore, StoreError};

/// A recorded spend, for assertions.
#[derive(Debug, Clone)]
pub struct SpendRecord {
    pub agent_id: AgentId,
    pub amount_jpy: f64,
    pub description: String,
}

/// A recorded trust adjustment, for assertions.
#[derive(Debug, Clone)]
pub struct TrustRecord {
    pub agent_id: AgentId,
    pub event_type: TrustEventType,
    pub adjustment: TrustAdjustment,
    pub reason: String,
}

#[derive(Default)]
struct Inner {
    tokens: HashMap<String, UserId>,
    page_agents: HashMap<PageId, AgentConfig>,
    profiles: HashMap<UserId, String>,
    behavior: HashMap<PageId, Vec<BehaviorEvent>>,
    approvals: Vec<(RequestId, ApprovalRequest)>,
    trust: HashMap<AgentId, u8>,
    trust_log: Vec<TrustRecord>,
    spend_log: Vec<SpendRecord>,
    budget_exhausted: bool,
    ambient: Vec<AmbientAgent>,
    conversations: HashMap<UserId, Vec<ConversationId>>,
    pages: HashMap<ConversationId, Vec<PageId>>,
    summaries: HashMap<(UserId, ConversationId), ContextSummary>,
}

/// Everything behind one mutex; contention is irrelevant at test scale.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token(&self, token: impl Into<String>, user_id: UserId) {
        self.inner.lock().tokens.insert(token.into(), user_id);
    }

    pub fn set_page_agent(&self, page_id: PageId, config: AgentConfig) {
        self.inner.lock().page_agents.insert(page_id, config);
    }

    pub fn clear_page_agent(&self, page_id: &PageId) {
        self.inner.lock().page_agents.remove(page_id);
    }

    pub fn set_profile_name(&self, user_id: UserId, name: impl Into<String>) {
        self.inner.lock().profiles.insert(user_id, name.into());
    }

    pub fn push_behavior(&self, page_id: PageId, event: BehaviorEvent) {
        self.inner.lock().behavior.entry(page_id).or_default().push(event);
    }

    pub fn set_trust(&self, agent_id: AgentId, score: u8) {
        self.inner.lock().trust.insert(agent_id, score);
    }

    pub fn set_ambient_agents(&self, agents: Vec<AmbientAgent>) {
        self.inner.lock().ambient = agents;
    }

    pub fn set_conversations(&self, user_id: UserId, conversations: Vec<ConversationId>) {
        self.inner.lock().conversations.insert(user_id, conversations);
    }

    pub fn set_pages(&self, conversation_id: ConversationId, pages: Vec<PageId>) {
        self.inner.lock().pages.insert(conversation_id, pages);
    }

    /// Make every subsequent spend fail with `BudgetExceeded`.
    pub fn exhaust_budget(&self) {
        self.inner.lock().budget_exhausted = true;
    }

    pub fn spend_log(&self) -> Vec<SpendRecord> {
        self.inner.lock().spend_log.clone()
    }

    pub fn trust_log(&self) -> Vec<TrustRecord> {
        self.inner.lock().trust_log.clone()
    }

    pub fn approval_requests(&self) -> Vec<ApprovalRequest> {
        self.inner.lock().approvals.iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn summary_count(&self) -> usize {
        self.inner.lock().summaries.len()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn verify_token(&self, token: &str) -> Result<Option<UserId>, StoreError> {
        Ok(self.inner.lock().tokens.get(token).copied())
    }

    async fn page_agent(&self, page_id: &PageId) -> Result<Option<AgentConfig>, StoreError> {
        let inner = self.inner.lock();
        let mut config = inner.page_agents.get(page_id).cloned();
        // Trust adjustments must be visible on the next lookup.
        if let Some(config) = config.as_mut() {
            if let Some(score) = inner.trust.get(&config.agent_id) {
                config.trust_score = *score;
            }
        }
        Ok(config)
    }

    async fn profile_name(&self, user_id: &UserId) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().profiles.get(user_id).cloned())
    }

    async fn recent_behavior(
        &self,
        page_id: &PageId,
        limit: usize,
    ) -> Result<Vec<BehaviorEvent>, StoreError> {
        let inner = self.inner.lock();
        let events = inner.behavior.get(page_id).cloned().unwrap_or_default();
        let skip = events.len().saturating_sub(limit);
        Ok(events.into_iter().skip(skip).collect())
    }

    async fn create_approval_request(
        &self,
        request: &ApprovalRequest,
    ) -> Result<RequestId, StoreError> {
        let id = RequestId::new();
        self.inner.lock().approvals.push((id, request.clone()));
        Ok(id)
    }

    async fn adjust_trust(
        &self,
        agent_id: &AgentId,
        event_type: TrustEventType,
        delta: i32,
        reason: &str,
    ) -> Result<TrustAdjustment, StoreError> {
        let mut inner = self.inner.lock();
        let old_score = *inner.trust.entry(*agent_id).or_insert(50);
        let new_score = (old_score as i32 + delta).clamp(0, 100) as u8;
        inner.trust.insert(*agent_id, new_score);
        let adjustment = TrustAdjustment {
            old_score,
            new_score,
            delta,
        };
        inner.trust_log.push(TrustRecord {
            agent_id: *agent_id,
            event_type,
            adjustment,
            reason: reason.to_string(),
        });
        Ok(adjustment)
    }

    async fn agent_spend(
        &self,
        agent_id: &AgentId,
        amount_jpy: f64,
        description: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.budget_exhausted {
            return Err(StoreError::BudgetExceeded);
        }
        inner.spend_log.push(SpendRecord {
            agent_id: *agent_id,
            amount_jpy,
            description: description.to_string(),
        });
        Ok(())
    }

    async fn ambient_agents(&self) -> Result<Vec<AmbientAgent>, StoreError> {
        Ok(self.inner.lock().ambient.clone())
    }

    async fn member_conversations(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ConversationId>, StoreError> {
        Ok(self.inner.lock().conversations.get(user_id).cloned().unwrap_or_default())
    }

    async fn recent_pages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<PageId>, StoreError> {
        let inner = self.inner.lock();
        let pages = inner.pages.get(conversation_id).cloned().unwrap_or_default();
        Ok(pages.into_iter().take(limit).collect())
    }

    async fn context_summary(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ContextSummary>, StoreError> {
        Ok(self
            .inner
            .lock()
            .summaries
            .get(&(*user_id, *conversation_id))
            .cloned())
    }

    async fn upsert_context_summary(&self, summary: &ContextSummary) -> Result<(), StoreError> {
        self.inner
            .lock()
            .summaries
            .insert((summary.user_id, summary.conversation_id), summary.clone());
        Ok(())
    }

    async fn cross_context_summaries(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ContextSummary>, StoreError> {
        Ok(self
            .inner
            .lock()
            .summaries
            .values()
            .filter(|s| s.user_id == *user_id)
            .cloned()
            .collect())
    }
}
