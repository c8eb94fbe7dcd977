//! Agent lifecycle.
//!
//! Per page the agent moves `unregistered → online → thinking → online → …
//! → offline`. Registration follows the document load/unload lifecycle;
//! ambient agents additionally get a sequential tick loop that is cancelled
//! on unregister.

use std::sync::Arc;
use std::time::Duration;

use marginalia_types::{AgentConfig, AgentStatus, AwarenessUser, PageId};
use tokio_util::sync::CancellationToken;

use crate::actions;
use crate::context::AgentContext;
use crate::prompts;
use crate::suggestions::Suggestion;

/// Pages with less trimmed text than this are skipped by ambient ticks.
pub const AMBIENT_MIN_PAGE_CHARS: usize = 20;

/// TTL for ambient-tick suggestions. Shorter than the reactive TTL because
/// the loop refreshes them continuously.
const AMBIENT_SUGGESTION_TTL: Duration = Duration::from_secs(30);

/// Called when a page's document is loaded: register its agent, if assigned.
pub async fn document_loaded(ctx: &Arc<AgentContext>, page_id: PageId) {
    let Some(config) = ctx.refresh_page_agent(&page_id).await else {
        return;
    };
    register_agent(ctx, config);
}

/// Called when the last client leaves a page.
pub fn document_unloaded(ctx: &AgentContext, page_id: &PageId) {
    unregister_agent(ctx, page_id);
}

/// Register an agent on its page: awareness goes online, ambient agents get
/// their tick loop. Replaces any previous registration.
pub fn register_agent(ctx: &Arc<AgentContext>, config: AgentConfig) {
    let page_id = config.page_id;
    let cancel = ctx.register_active(page_id, config.clone());
    ctx.docs.set_agent_awareness(
        &page_id,
        Some(AwarenessUser::agent(&config.agent_name, AgentStatus::Online)),
    );
    tracing::info!(
        page = %page_id.short(),
        agent = %config.agent_id.short(),
        ambient = config.is_ambient,
        "agent registered"
    );

    if config.is_ambient {
        tokio::spawn(ambient_loop(ctx.clone(), config, cancel));
    }
}

/// Unregister a page's agent: cancel loops, clear rate-limit state, go
/// offline. Idempotent.
pub fn unregister_agent(ctx: &AgentContext, page_id: &PageId) {
    if let Some(config) = ctx.remove_active(page_id) {
        tracing::info!(page = %page_id.short(), agent = %config.agent_id.short(), "agent unregistered");
    }
    ctx.inference.clear(page_id);
    ctx.evict_page_agent(page_id);
    ctx.docs.set_agent_awareness(page_id, None);
}

/// Sequential tick loop: the next tick is only scheduled after the previous
/// one completes, so one agent never overlaps itself.
async fn ambient_loop(ctx: Arc<AgentContext>, config: AgentConfig, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(ctx.ambient_interval) => {}
        }
        if !ambient_tick(&ctx, &config).await {
            break;
        }
    }
    tracing::debug!(page = %config.page_id.short(), "ambient loop stopped");
}

/// One ambient tick. Returns `false` when the loop must stop (budget
/// exhausted or the agent was unregistered mid-tick).
pub async fn ambient_tick(ctx: &AgentContext, config: &AgentConfig) -> bool {
    let page_id = config.page_id;

    let text = match ctx.docs.read_text(page_id).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(page = %page_id.short(), error = %e, "ambient read failed");
            return true;
        }
    };
    if text.trim().chars().count() < AMBIENT_MIN_PAGE_CHARS {
        return true;
    }

    ctx.docs.set_agent_awareness(
        &page_id,
        Some(AwarenessUser::agent(&config.agent_name, AgentStatus::Thinking)),
    );

    let (summaries, owner_name) = match config.owner_id {
        Some(owner_id) => {
            let summaries = ctx
                .store
                .cross_context_summaries(&owner_id)
                .await
                .unwrap_or_default();
            let name = ctx
                .store
                .profile_name(&owner_id)
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| "the owner".to_string());
            (summaries, name)
        }
        None => (Vec::new(), "the owner".to_string()),
    };

    let request = prompts::clone_continuation(&config.agent_name, &owner_name, &text, &summaries);
    let reply = ctx.llm.call(config.llm.as_ref(), request).await;

    ctx.docs.set_agent_awareness(
        &page_id,
        Some(AwarenessUser::agent(&config.agent_name, AgentStatus::Online)),
    );

    let Some(reply) = reply else {
        return true;
    };

    if !actions::spend_and_enforce(ctx, config, reply.cost_jpy, "ambient tick").await {
        return false;
    }

    // The agent may have been unregistered while the call was in flight;
    // discard the result rather than resurrect a stopped agent.
    if !ctx.is_registered(&page_id) {
        return false;
    }

    actions::publish_suggestion(
        ctx,
        page_id,
        Suggestion {
            agent_name: config.agent_name.clone(),
            text: reply.text,
            intent: "ambient".to_string(),
        },
        AMBIENT_SUGGESTION_TTL,
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeClient;
    use crate::llm::{LlmGateway, MockProvider};
    use crate::store::MemoryStore;
    use marginalia_doc::{DocHost, MemorySnapshotStore};
    use marginalia_types::{AgentId, UserId};

    fn test_ctx(provider: Arc<MockProvider>, store: Arc<MemoryStore>) -> Arc<AgentContext> {
        let docs = Arc::new(DocHost::new(Arc::new(MemorySnapshotStore::new())));
        let llm = Arc::new(LlmGateway::new(provider));
        let knowledge = Arc::new(KnowledgeClient::new("http://127.0.0.1:1"));
        Arc::new(
            AgentContext::new(docs, store, llm, knowledge)
                .with_ambient_interval(Duration::from_millis(20)),
        )
    }

    fn ambient_config(page_id: PageId) -> AgentConfig {
        AgentConfig {
            page_id,
            agent_id: AgentId::new(),
            agent_name: "Scribe".into(),
            trust_score: 85,
            is_ambient: true,
            owner_id: Some(UserId::new()),
            llm: None,
        }
    }

    #[tokio::test]
    async fn tick_skips_near_empty_pages() {
        let provider = Arc::new(MockProvider::new("deepseek"));
        let store = Arc::new(MemoryStore::new());
        let ctx = test_ctx(provider.clone(), store.clone());
        let page = PageId::new();
        ctx.docs.append_paragraph(page, "short").await.unwrap();

        let config = ambient_config(page);
        ctx.register_active(page, config.clone());
        assert!(ambient_tick(&ctx, &config).await);
        assert_eq!(provider.call_count(), 0);
        assert!(store.spend_log().is_empty());
    }

    #[tokio::test]
    async fn tick_generates_caches_and_spends() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("keep expanding the intro"));
        let store = Arc::new(MemoryStore::new());
        let ctx = test_ctx(provider, store.clone());
        let page = PageId::new();
        ctx.docs
            .append_paragraph(page, "a page with plenty of text to continue from")
            .await
            .unwrap();

        let config = ambient_config(page);
        ctx.register_active(page, config.clone());
        assert!(ambient_tick(&ctx, &config).await);

        assert_eq!(ctx.suggestions.get(&page).unwrap().text, "keep expanding the intro");
        assert_eq!(store.spend_log().len(), 1);
        assert_eq!(store.spend_log()[0].description, "ambient tick");
    }

    #[tokio::test]
    async fn budget_exhaustion_stops_the_loop_and_docks_trust() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("one more idea"));
        let store = Arc::new(MemoryStore::new());
        let ctx = test_ctx(provider, store.clone());
        let page = PageId::new();
        ctx.docs
            .append_paragraph(page, "a page with plenty of text to continue from")
            .await
            .unwrap();
        store.exhaust_budget();

        let config = ambient_config(page);
        ctx.register_active(page, config.clone());
        assert!(!ambient_tick(&ctx, &config).await);

        assert!(!ctx.is_registered(&page));
        let trust = store.trust_log();
        assert_eq!(trust.len(), 1);
        assert_eq!(trust[0].adjustment.delta, -3);
        assert!(ctx.suggestions.get(&page).is_none());
    }

    #[tokio::test]
    async fn unregistered_mid_tick_discards_the_result() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("late result"));
        let store = Arc::new(MemoryStore::new());
        let ctx = test_ctx(provider, store.clone());
        let page = PageId::new();
        ctx.docs
            .append_paragraph(page, "a page with plenty of text to continue from")
            .await
            .unwrap();

        // Not registered at all: the check-before-apply fires.
        let config = ambient_config(page);
        assert!(!ambient_tick(&ctx, &config).await);
        assert!(ctx.suggestions.get(&page).is_none());
    }

    #[tokio::test]
    async fn loop_ticks_until_cancelled() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("continuation"));
        let store = Arc::new(MemoryStore::new());
        let ctx = test_ctx(provider, store.clone());
        let page = PageId::new();
        ctx.docs
            .append_paragraph(page, "a page with plenty of text to continue from")
            .await
            .unwrap();

        let config = ambient_config(page);
        store.set_page_agent(page, config.clone());
        register_agent(&ctx, config);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(ctx.suggestions.get(&page).is_some());
        let spends_while_running = store.spend_log().len();
        assert!(spends_while_running >= 1);

        unregister_agent(&ctx, &page);
        tokio::time::sleep(Duration::from_millis(80)).await;
        // At most one in-flight tick may land after cancellation.
        assert!(store.spend_log().len() <= spends_while_running + 1);
    }

    #[tokio::test]
    async fn load_and_unload_drive_registration() {
        let provider = Arc::new(MockProvider::new("deepseek"));
        let store = Arc::new(MemoryStore::new());
        let ctx = test_ctx(provider, store.clone());
        let page = PageId::new();
        ctx.docs.open(page).await.unwrap();

        // No agent assigned: load registers nothing.
        document_loaded(&ctx, page).await;
        assert!(!ctx.is_registered(&page));

        let mut config = ambient_config(page);
        config.is_ambient = false;
        store.set_page_agent(page, config);
        ctx.evict_page_agent(&page);

        document_loaded(&ctx, page).await;
        assert!(ctx.is_registered(&page));
        let open = ctx.docs.get(&page).unwrap();
        assert_eq!(open.awareness().snapshot().len(), 1);

        document_unloaded(&ctx, &page);
        assert!(!ctx.is_registered(&page));
        assert!(open.awareness().snapshot().is_empty());
    }
}
