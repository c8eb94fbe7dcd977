//! Shared orchestration state.
//!
//! One [`AgentContext`] is built at startup and cloned (via `Arc`) into every
//! handler, loop, and HTTP route. Nothing in this crate reaches for a global.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use marginalia_doc::DocHost;
use marginalia_types::{AgentConfig, PageId};
use tokio_util::sync::CancellationToken;

use crate::intent::InferenceLimiter;
use crate::knowledge::KnowledgeClient;
use crate::llm::LlmGateway;
use crate::store::DataStore;
use crate::suggestions::SuggestionCache;

/// Default pacing between ambient ticks.
pub const AMBIENT_INTERVAL: Duration = Duration::from_secs(10);

/// A registered agent: its config plus the token that stops its loops.
pub struct ActiveAgent {
    pub config: AgentConfig,
    pub cancel: CancellationToken,
}

/// Everything the orchestration layer shares.
pub struct AgentContext {
    pub docs: Arc<DocHost>,
    pub store: Arc<dyn DataStore>,
    pub llm: Arc<LlmGateway>,
    pub knowledge: Arc<KnowledgeClient>,
    pub suggestions: SuggestionCache,
    pub inference: InferenceLimiter,
    /// Pacing between ambient ticks. Shortened in tests.
    pub ambient_interval: Duration,

    /// Store lookups cached per page. `Some(None)` (a hit with no agent) is
    /// as meaningful as a hit with one.
    page_agents: DashMap<PageId, Option<AgentConfig>>,
    /// Agents currently registered on a page.
    active: DashMap<PageId, ActiveAgent>,
}

impl AgentContext {
    pub fn new(
        docs: Arc<DocHost>,
        store: Arc<dyn DataStore>,
        llm: Arc<LlmGateway>,
        knowledge: Arc<KnowledgeClient>,
    ) -> Self {
        Self {
            docs,
            store,
            llm,
            knowledge,
            suggestions: SuggestionCache::new(),
            inference: InferenceLimiter::new(),
            ambient_interval: AMBIENT_INTERVAL,
            page_agents: DashMap::new(),
            active: DashMap::new(),
        }
    }

    /// Shorten the ambient tick interval. Test hook.
    pub fn with_ambient_interval(mut self, interval: Duration) -> Self {
        self.ambient_interval = interval;
        self
    }

    /// Agent assignment for a page, cached after the first store lookup.
    pub async fn page_agent(&self, page_id: &PageId) -> Option<AgentConfig> {
        if let Some(cached) = self.page_agents.get(page_id) {
            return cached.clone();
        }
        self.refresh_page_agent(page_id).await
    }

    /// Agent assignment straight from the store, refreshing the cache. Used
    /// where a stale trust score must not leak into a gating decision.
    pub async fn refresh_page_agent(&self, page_id: &PageId) -> Option<AgentConfig> {
        let config = match self.store.page_agent(page_id).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(page = %page_id.short(), error = %e, "page agent lookup failed");
                return None;
            }
        };
        self.page_agents.insert(*page_id, config.clone());
        config
    }

    /// Forget the cached assignment for a page.
    pub fn evict_page_agent(&self, page_id: &PageId) {
        self.page_agents.remove(page_id);
    }

    /// Register an agent as active on a page, returning the token that stops
    /// its loops. Replaces (and cancels) any previous registration.
    pub fn register_active(&self, page_id: PageId, config: AgentConfig) -> CancellationToken {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.active.insert(
            page_id,
            ActiveAgent {
                config,
                cancel: cancel.clone(),
            },
        ) {
            previous.cancel.cancel();
        }
        cancel
    }

    /// Cancel and drop a page's active agent, if any. Returns its config.
    pub fn remove_active(&self, page_id: &PageId) -> Option<AgentConfig> {
        self.active.remove(page_id).map(|(_, active)| {
            active.cancel.cancel();
            active.config
        })
    }

    /// Whether an agent is currently registered on the page. Checked before
    /// applying results computed across an await point.
    pub fn is_registered(&self, page_id: &PageId) -> bool {
        self.active.contains_key(page_id)
    }

    /// Config of the active agent on a page, if registered.
    pub fn active_config(&self, page_id: &PageId) -> Option<AgentConfig> {
        self.active.get(page_id).map(|a| a.config.clone())
    }
}
