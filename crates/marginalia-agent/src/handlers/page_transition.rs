//! Handler for page navigation: remember the outgoing page, prime the new one.

use std::sync::Arc;

use async_trait::async_trait;
use marginalia_types::{AgentConfig, AgentEvent, PageId};

use super::{MIN_PARAGRAPH_CHARS, SUGGESTION_TTL};
use crate::actions;
use crate::context::AgentContext;
use crate::knowledge::{self, Episode, DEFAULT_MAX_FACTS};
use crate::prompts::{self, truncate_chars};
use crate::router::EventHandler;
use crate::suggestions::Suggestion;

/// Prefix of the outgoing page used as the fact-search query.
const QUERY_PREFIX_CHARS: usize = 500;

pub struct PageTransition;

#[async_trait]
impl EventHandler for PageTransition {
    async fn handle(
        &self,
        ctx: Arc<AgentContext>,
        event: AgentEvent,
        config: AgentConfig,
    ) -> anyhow::Result<()> {
        let Some(old_page) = event
            .payload_str("oldPageId")
            .and_then(|s| s.parse::<PageId>().ok())
        else {
            return Ok(());
        };

        let old_text = ctx.docs.read_text(old_page).await?;
        if old_text.trim().chars().count() < MIN_PARAGRAPH_CHARS {
            return Ok(());
        }

        ctx.knowledge.spawn_add_episode(Episode {
            group_id: knowledge::user_group(&event.user_id),
            name: format!("page {}", old_page.short()),
            content: old_text.clone(),
            role: "user".to_string(),
            source_description: "page content captured on navigation".to_string(),
        });

        let query = truncate_chars(&old_text, QUERY_PREFIX_CHARS);
        let facts = ctx
            .knowledge
            .search_facts(query, &knowledge::user_group(&event.user_id), DEFAULT_MAX_FACTS)
            .await;
        if facts.is_empty() {
            return Ok(());
        }

        // Prime the page being entered, not the one being left.
        let new_page = event.page_id;
        let new_text = ctx.docs.read_text(new_page).await?;
        let request = prompts::ambient_suggestion(
            &config.agent_name,
            &new_text,
            &format!("just arrived from a page about: {query}"),
            &facts,
        );
        let Some(reply) = ctx.llm.call(config.llm.as_ref(), request).await else {
            return Ok(());
        };

        if !actions::spend_and_enforce(&ctx, &config, reply.cost_jpy, "handoff suggestion").await {
            return Ok(());
        }

        actions::publish_suggestion(
            &ctx,
            new_page,
            Suggestion {
                agent_name: config.agent_name.clone(),
                text: reply.text,
                intent: "handoff".to_string(),
            },
            SUGGESTION_TTL,
        );
        Ok(())
    }
}
