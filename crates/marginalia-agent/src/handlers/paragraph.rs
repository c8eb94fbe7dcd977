//! Handler for completed paragraphs: fire-and-forget episode capture.

use std::sync::Arc;

use async_trait::async_trait;
use marginalia_types::{AgentConfig, AgentEvent};

use super::MIN_PARAGRAPH_CHARS;
use crate::context::AgentContext;
use crate::knowledge::{self, Episode};
use crate::router::EventHandler;

pub struct ParagraphComplete;

#[async_trait]
impl EventHandler for ParagraphComplete {
    async fn handle(
        &self,
        ctx: Arc<AgentContext>,
        event: AgentEvent,
        _config: AgentConfig,
    ) -> anyhow::Result<()> {
        let Some(text) = event.payload_str("paragraphText") else {
            return Ok(());
        };
        if text.chars().count() < MIN_PARAGRAPH_CHARS {
            return Ok(());
        }

        // Spawned: this handler must never block the pipeline on the
        // knowledge store.
        ctx.knowledge.spawn_add_episode(Episode {
            group_id: knowledge::user_group(&event.user_id),
            name: format!("page {}", event.page_id.short()),
            content: text.to_string(),
            role: "user".to_string(),
            source_description: "paragraph written in a shared page".to_string(),
        });
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

    fn test_ctx() -> Arc<AgentContext> {
        let docs = Arc::new(DocHost::new(Arc::new(MemorySnapshotStore::new())));
        let llm = Arc::new(LlmGateway::new(Arc::new(MockProvider::new("deepseek"))));
        let knowledge = Arc::new(KnowledgeClient::new("http://127.0.0.1:1"));
        Arc::new(AgentContext::new(docs, Arc::new(MemoryStore::new()), llm, knowledge))
    }

    fn config(page_id: PageId) -> AgentConfig {
        AgentConfig {
            page_id,
            agent_id: AgentId::new(),
            agent_name: "Scribe".into(),
            trust_score: 50,
            is_ambient: false,
            owner_id: Some(UserId::new()),
            llm: None,
        }
    }

    #[tokio::test]
    async fn short_and_missing_paragraphs_never_fail() {
        let ctx = test_ctx();
        let page = PageId::new();

        let mut event = AgentEvent {
            event_type: marginalia_types::AgentEventType::ParagraphComplete,
            payload: serde_json::json!({ "paragraphText": "too short" }),
            timestamp: String::new(),
            user_id: UserId::new(),
            page_id: page,
        };
        ParagraphComplete
            .handle(ctx.clone(), event.clone(), config(page))
            .await
            .unwrap();

        event.payload = serde_json::Value::Null;
        ParagraphComplete.handle(ctx, event, config(page)).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_knowledge_store_is_not_an_error() {
        let ctx = test_ctx();
        let page = PageId::new();
        let event = AgentEvent {
            event_type: marginalia_types::AgentEventType::ParagraphComplete,
            payload: serde_json::json!({
                "paragraphText": "a full paragraph about the journey through the mountains"
            }),
            timestamp: String::new(),
            user_id: UserId::new(),
            page_id: page,
        };
        // The episode is spawned against an unroutable endpoint; the handler
        // itself must still succeed immediately.
        ParagraphComplete.handle(ctx, event, config(page)).await.unwrap();
    }
}
