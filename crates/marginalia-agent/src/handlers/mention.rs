//! Handler for explicit mentions: generate a reply and write it through the
//! trust gate.

use std::sync::Arc;

use async_trait::async_trait;
use marginalia_types::{AgentConfig, AgentEvent};

use crate::actions;
use crate::context::AgentContext;
use crate::knowledge::{self, DEFAULT_MAX_FACTS};
use crate::prompts::{self, truncate_chars};
use crate::router::EventHandler;

/// Page-prefix length used as the query when the mention carries no
/// instruction text.
const FALLBACK_QUERY_CHARS: usize = 200;

pub struct Mention;

#[async_trait]
impl EventHandler for Mention {
    async fn handle(
        &self,
        ctx: Arc<AgentContext>,
        event: AgentEvent,
        config: AgentConfig,
    ) -> anyhow::Result<()> {
        let page_text = ctx.docs.read_text(event.page_id).await?;

        let instruction = match event.payload_str("instructionText") {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => truncate_chars(&page_text, FALLBACK_QUERY_CHARS).to_string(),
        };

        let facts = ctx
            .knowledge
            .search_facts(
                &instruction,
                &knowledge::agent_group(config.owner_id.as_ref(), &event.user_id),
                DEFAULT_MAX_FACTS,
            )
            .await;

        let request =
            prompts::direct_response(&config.agent_name, &page_text, &instruction, &facts);
        let Some(reply) = ctx.llm.call(config.llm.as_ref(), request).await else {
            return Ok(());
        };

        if !actions::spend_and_enforce(&ctx, &config, reply.cost_jpy, "mention response").await {
            return Ok(());
        }

        // An approval decision may have moved the trust score since the
        // config was cached; gate on the freshest value.
        let config = ctx
            .refresh_page_agent(&event.page_id)
            .await
            .unwrap_or(config);

        actions::deliver_response(
            &ctx,
            event.page_id,
            &config,
            &reply.text,
            "mention",
            reply.cost_jpy,
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeClient;
    use crate::llm::{LlmGateway, MockProvider};
    use crate::store::MemoryStore;
    use marginalia_doc::{DocHost, MemorySnapshotStore};
    use marginalia_types::{AgentId, PageId, UserId};

    fn ctx_with(provider: Arc<MockProvider>, store: Arc<MemoryStore>) -> Arc<AgentContext> {
        let docs = Arc::new(DocHost::new(Arc::new(MemorySnapshotStore::new())));
        let llm = Arc::new(LlmGateway::new(provider));
        let knowledge = Arc::new(KnowledgeClient::new("http://127.0.0.1:1"));
        Arc::new(AgentContext::new(docs, store, llm, knowledge))
    }

    fn config(page_id: PageId, trust: u8) -> AgentConfig {
        AgentConfig {
            page_id,
            agent_id: AgentId::new(),
            agent_name: "Scribe".into(),
            trust_score: trust,
            is_ambient: false,
            owner_id: Some(UserId::new()),
            llm: None,
        }
    }

    fn mention_event(page_id: PageId, instruction: &str) -> AgentEvent {
        AgentEvent {
            event_type: marginalia_types::AgentEventType::Mention,
            payload: serde_json::json!({ "instructionText": instruction }),
            timestamp: String::new(),
            user_id: UserId::new(),
            page_id,
        }
    }

    #[tokio::test]
    async fn high_trust_writes_directly() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("Here is a summary."));
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx_with(provider, store.clone());
        let page = PageId::new();
        let config = config(page, 85);
        store.set_page_agent(page, config.clone());

        Mention
            .handle(ctx.clone(), mention_event(page, "summarize this page"), config)
            .await
            .unwrap();

        let text = ctx.docs.read_text(page).await.unwrap();
        assert_eq!(text, "💡 Scribe: Here is a summary.");
        assert!(store.approval_requests().is_empty());
        assert_eq!(store.spend_log().len(), 1);
    }

    #[tokio::test]
    async fn low_trust_gets_an_approval_card() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("Proposed addition."));
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx_with(provider, store.clone());
        let page = PageId::new();
        let config = config(page, 30);
        store.set_page_agent(page, config.clone());

        Mention
            .handle(ctx.clone(), mention_event(page, "add a conclusion"), config)
            .await
            .unwrap();

        // Nothing written to the text, one durable approval record.
        assert_eq!(ctx.docs.read_text(page).await.unwrap(), "");
        let requests = store.approval_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].description, "Proposed addition.");
        assert_eq!(requests[0].intent, "mention");
    }

    #[tokio::test]
    async fn mid_trust_gates_on_length() {
        let long_reply = "x".repeat(250);
        let provider = Arc::new(MockProvider::new("deepseek").with_reply(long_reply));
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx_with(provider, store.clone());
        let page = PageId::new();
        let config = config(page, 60);
        store.set_page_agent(page, config.clone());

        Mention
            .handle(ctx.clone(), mention_event(page, "write a long section"), config)
            .await
            .unwrap();

        assert_eq!(ctx.docs.read_text(page).await.unwrap(), "");
        assert_eq!(store.approval_requests().len(), 1);
    }

    #[tokio::test]
    async fn fresh_trust_score_wins_over_cached() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("short reply"));
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx_with(provider, store.clone());
        let page = PageId::new();
        // Dispatched with a stale high-trust config, but the store has since
        // dropped the score below the approval line.
        let stale = config(page, 85);
        store.set_page_agent(page, stale.clone());
        store.set_trust(stale.agent_id, 30);

        Mention
            .handle(ctx.clone(), mention_event(page, "do something"), stale)
            .await
            .unwrap();

        assert_eq!(ctx.docs.read_text(page).await.unwrap(), "");
        assert_eq!(store.approval_requests().len(), 1);
    }
}
