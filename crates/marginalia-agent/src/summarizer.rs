//! Background context summarizer.
//!
//! Every few minutes, for each ambient agent's owner and each conversation
//! they participate in, condense the most recent pages into a short summary
//! keyed by (user, conversation). Ambient ticks read these back as
//! cross-context memory.

use std::sync::Arc;
use std::time::Duration;

use marginalia_types::{ConversationId, UserId};
use tokio_util::sync::CancellationToken;

use crate::context::AgentContext;
use crate::prompts;
use crate::store::{AmbientAgent, ContextSummary};

/// Interval between summary passes.
pub const SUMMARY_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Delay before the first pass, letting the server settle after boot.
pub const INITIAL_DELAY: Duration = Duration::from_secs(30);

/// Pages per conversation fed into one summary.
const RECENT_PAGES: usize = 3;
/// Conversations shorter than this are not worth summarizing.
const MIN_TEXT_CHARS: usize = 20;
/// Skip regeneration when the source text moved less than this many
/// approximate tokens since the stored summary.
const TOKEN_DIFF_THRESHOLD: i64 = 50;

/// Rough token estimate, adequate for a change-detection threshold.
fn approx_tokens(text: &str) -> u32 {
    text.chars().count().div_ceil(3) as u32
}

/// Start the periodic loop. Runs until the token is cancelled.
pub fn spawn(ctx: Arc<AgentContext>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(INITIAL_DELAY) => {}
        }
        loop {
            run_once(&ctx).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(SUMMARY_INTERVAL) => {}
            }
        }
    })
}

/// One full pass over every ambient agent's conversations.
pub async fn run_once(ctx: &AgentContext) {
    let agents = match ctx.store.ambient_agents().await {
        Ok(agents) => agents,
        Err(e) => {
            tracing::warn!(error = %e, "ambient agent listing failed, skipping summary pass");
            return;
        }
    };

    for agent in agents {
        let conversations = match ctx.store.member_conversations(&agent.owner_id).await {
            Ok(conversations) => conversations,
            Err(e) => {
                tracing::warn!(owner = %agent.owner_id.short(), error = %e, "conversation listing failed");
                continue;
            }
        };
        for conversation_id in conversations {
            summarize_conversation(ctx, &agent, agent.owner_id, conversation_id).await;
        }
    }
}

async fn summarize_conversation(
    ctx: &AgentContext,
    agent: &AmbientAgent,
    user_id: UserId,
    conversation_id: ConversationId,
) {
    let pages = match ctx.store.recent_pages(&conversation_id, RECENT_PAGES).await {
        Ok(pages) => pages,
        Err(e) => {
            tracing::warn!(conversation = %conversation_id.short(), error = %e, "page listing failed");
            return;
        }
    };

    let mut parts = Vec::with_capacity(pages.len());
    for page_id in pages {
        match ctx.docs.read_text(page_id).await {
            Ok(text) if !text.trim().is_empty() => parts.push(text),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(page = %page_id.short(), error = %e, "summary page read failed");
            }
        }
    }
    let combined = parts.join("\n\n");
    if combined.trim().chars().count() < MIN_TEXT_CHARS {
        return;
    }

    let token_count = approx_tokens(&combined);
    let existing = ctx
        .store
        .context_summary(&user_id, &conversation_id)
        .await
        .ok()
        .flatten();
    if let Some(existing) = &existing {
        if (token_count as i64 - existing.token_count as i64).abs() < TOKEN_DIFF_THRESHOLD {
            return;
        }
    }

    let Some(reply) = ctx.llm.call(None, prompts::context_summary(&combined)).await else {
        return;
    };

    // Batch job: spend is recorded but a rejection only skips the upsert's
    // cost accounting, the summary itself still lands.
    if let Err(e) = ctx
        .store
        .agent_spend(&agent.agent_id, reply.cost_jpy, "context summary")
        .await
    {
        tracing::warn!(agent = %agent.agent_id.short(), error = %e, "summary spend recording failed");
    }

    let summary = ContextSummary {
        user_id,
        conversation_id,
        summary: reply.text,
        token_count,
    };
    if let Err(e) = ctx.store.upsert_context_summary(&summary).await {
        tracing::warn!(conversation = %conversation_id.short(), error = %e, "summary upsert failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeClient;
    use crate::llm::{LlmGateway, MockProvider};
    use crate::store::MemoryStore;
    use marginalia_doc::{DocHost, MemorySnapshotStore};
    use marginalia_types::{AgentId, PageId};

    fn test_ctx(provider: Arc<MockProvider>, store: Arc<MemoryStore>) -> Arc<AgentContext> {
        let docs = Arc::new(DocHost::new(Arc::new(MemorySnapshotStore::new())));
        let llm = Arc::new(LlmGateway::new(provider));
        let knowledge = Arc::new(KnowledgeClient::new("http://127.0.0.1:1"));
        Arc::new(AgentContext::new(docs, store, llm, knowledge))
    }

    async fn seed(ctx: &AgentContext, store: &MemoryStore, text: &str) -> (UserId, ConversationId) {
        let owner = UserId::new();
        let agent = AgentId::new();
        let conversation = ConversationId::new();
        let page = PageId::new();

        store.set_ambient_agents(vec![AmbientAgent {
            agent_id: agent,
            owner_id: owner,
        }]);
        store.set_conversations(owner, vec![conversation]);
        store.set_pages(conversation, vec![page]);
        ctx.docs.append_paragraph(page, text).await.unwrap();
        (owner, conversation)
    }

    #[tokio::test]
    async fn pass_stores_a_summary() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("Working on a travel journal."));
        let store = Arc::new(MemoryStore::new());
        let ctx = test_ctx(provider.clone(), store.clone());
        let (owner, conversation) =
            seed(&ctx, &store, "day three of the hike, we crossed the ridge before noon").await;

        run_once(&ctx).await;

        let summary = ctx
            .store
            .context_summary(&owner, &conversation)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.summary, "Working on a travel journal.");
        assert!(summary.token_count > 0);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(store.spend_log().len(), 1);
    }

    #[tokio::test]
    async fn unchanged_text_skips_regeneration() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("Summary."));
        let store = Arc::new(MemoryStore::new());
        let ctx = test_ctx(provider.clone(), store.clone());
        seed(&ctx, &store, "day three of the hike, we crossed the ridge before noon").await;

        run_once(&ctx).await;
        run_once(&ctx).await;

        assert_eq!(provider.call_count(), 1);
        assert_eq!(store.summary_count(), 1);
    }

    #[tokio::test]
    async fn trivial_conversations_are_skipped() {
        let provider = Arc::new(MockProvider::new("deepseek"));
        let store = Arc::new(MemoryStore::new());
        let ctx = test_ctx(provider.clone(), store.clone());
        seed(&ctx, &store, "tiny").await;

        run_once(&ctx).await;
        assert_eq!(provider.call_count(), 0);
        assert_eq!(store.summary_count(), 0);
    }
}
