//! Handler for typing pauses: offer an ambient, non-blocking suggestion.

use std::sync::Arc;

use async_trait::async_trait;
use marginalia_types::{AgentConfig, AgentEvent};

use super::{MIN_CONTEXT_CHARS, SUGGESTION_TTL};
use crate::actions;
use crate::context::AgentContext;
use crate::knowledge::{self, DEFAULT_MAX_FACTS};
use crate::prompts;
use crate::router::EventHandler;
use crate::suggestions::Suggestion;

pub struct InputPause;

#[async_trait]
impl EventHandler for InputPause {
    async fn handle(
        &self,
        ctx: Arc<AgentContext>,
        event: AgentEvent,
        config: AgentConfig,
    ) -> anyhow::Result<()> {
        let Some(context_text) = event.payload_str("contextText") else {
            return Ok(());
        };
        if context_text.trim().chars().count() < MIN_CONTEXT_CHARS {
            return Ok(());
        }
        let context_text = context_text.to_string();

        let page_text = ctx.docs.read_text(event.page_id).await?;
        let facts = ctx
            .knowledge
            .search_facts(
                &context_text,
                &knowledge::agent_group(config.owner_id.as_ref(), &event.user_id),
                DEFAULT_MAX_FACTS,
            )
            .await;

        let request =
            prompts::ambient_suggestion(&config.agent_name, &page_text, &context_text, &facts);
        let Some(reply) = ctx.llm.call(config.llm.as_ref(), request).await else {
            return Ok(());
        };

        if !actions::spend_and_enforce(&ctx, &config, reply.cost_jpy, "ambient suggestion").await {
            return Ok(());
        }

        actions::publish_suggestion(
            &ctx,
            event.page_id,
            Suggestion {
                agent_name: config.agent_name.clone(),
                text: reply.text,
                intent: "ambient".to_string(),
            },
            SUGGESTION_TTL,
        );
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

    fn ctx_with(
        provider: Arc<MockProvider>,
        store: Arc<MemoryStore>,
    ) -> Arc<AgentContext> {
        let docs = Arc::new(DocHost::new(Arc::new(MemorySnapshotStore::new())));
        let llm = Arc::new(LlmGateway::new(provider));
        // Unroutable address: knowledge lookups degrade to no facts.
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

    fn pause_event(page_id: PageId, context: &str) -> AgentEvent {
        AgentEvent {
            event_type: marginalia_types::AgentEventType::InputPause,
            payload: serde_json::json!({ "contextText": context }),
            timestamp: String::new(),
            user_id: UserId::new(),
            page_id,
        }
    }

    #[tokio::test]
    async fn caches_and_spends_on_suggestion() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("try a fresh angle"));
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx_with(provider.clone(), store.clone());
        let page = PageId::new();

        InputPause
            .handle(ctx.clone(), pause_event(page, "the second chapter drags"), config(page, 85))
            .await
            .unwrap();

        let cached = ctx.suggestions.get(&page).unwrap();
        assert_eq!(cached.text, "try a fresh angle");
        assert_eq!(cached.agent_name, "Scribe");
        assert_eq!(store.spend_log().len(), 1);
    }

    #[tokio::test]
    async fn short_context_is_a_silent_noop() {
        let provider = Arc::new(MockProvider::new("deepseek"));
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx_with(provider.clone(), store.clone());
        let page = PageId::new();

        InputPause
            .handle(ctx.clone(), pause_event(page, "hey"), config(page, 85))
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 0);
        assert!(ctx.suggestions.get(&page).is_none());
        assert!(store.spend_log().is_empty());
    }

    #[tokio::test]
    async fn whitespace_padding_does_not_satisfy_the_minimum() {
        let provider = Arc::new(MockProvider::new("deepseek"));
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx_with(provider.clone(), store.clone());
        let page = PageId::new();

        // Five untrimmed chars, one of substance.
        InputPause
            .handle(ctx.clone(), pause_event(page, "  a  "), config(page, 85))
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 0);
        assert!(ctx.suggestions.get(&page).is_none());
    }

    #[tokio::test]
    async fn missing_context_is_a_silent_noop() {
        let provider = Arc::new(MockProvider::new("deepseek"));
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx_with(provider.clone(), store.clone());
        let page = PageId::new();

        let mut event = pause_event(page, "ignored");
        event.payload = serde_json::Value::Null;
        InputPause.handle(ctx, event, config(page, 85)).await.unwrap();
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn llm_failure_degrades_without_spend() {
        let provider = Arc::new(MockProvider::new("deepseek").failing());
        let store = Arc::new(MemoryStore::new());
        let ctx = ctx_with(provider, store.clone());
        let page = PageId::new();

        InputPause
            .handle(ctx.clone(), pause_event(page, "long enough context"), config(page, 85))
            .await
            .unwrap();

        assert!(ctx.suggestions.get(&page).is_none());
        assert!(store.spend_log().is_empty());
    }
}
