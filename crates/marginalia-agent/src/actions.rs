//! Trust-gated agent actions.
//!
//! The resolver itself (`resolve_action`) lives in `marginalia-types`; this
//! module carries the two write paths it selects between, the trust-feedback
//! wrapper, and the shared spend-then-maybe-stop helper.

use marginalia_types::{
    resolve_action, ActionKind, AgentConfig, PageId, RequestId, TrustAdjustment, TrustEventType,
};

use crate::context::AgentContext;
use crate::store::{ApprovalRequest, StoreError};
use crate::suggestions::Suggestion;

/// Append a labeled paragraph straight into the page.
pub async fn agent_direct_write(
    ctx: &AgentContext,
    page_id: PageId,
    config: &AgentConfig,
    text: &str,
) -> bool {
    let line = format!("💡 {}: {}", config.agent_name, text);
    match ctx.docs.append_paragraph(page_id, &line).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(page = %page_id.short(), error = %e, "direct write failed");
            false
        }
    }
}

/// Record an approval request, then embed the matching card in the document.
///
/// Record-first ordering: if the durable record cannot be created, the
/// document is never touched (no orphan cards). If the card insertion fails
/// after the record exists, the record is kept for external reconciliation.
pub async fn insert_approval_card(
    ctx: &AgentContext,
    page_id: PageId,
    config: &AgentConfig,
    suggestion: &str,
    intent: &str,
    cost_jpy: f64,
) -> Option<RequestId> {
    let request = ApprovalRequest {
        agent_id: config.agent_id,
        page_id,
        action_type: "write".to_string(),
        description: suggestion.to_string(),
        amount_jpy: cost_jpy,
        intent: intent.to_string(),
        agent_name: config.agent_name.clone(),
    };

    let request_id = match ctx.store.create_approval_request(&request).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(page = %page_id.short(), error = %e, "approval record creation failed");
            return None;
        }
    };

    let card = marginalia_doc::ApprovalCard::pending(
        request_id,
        config.agent_id,
        &config.agent_name,
        suggestion,
        intent,
    );
    if let Err(e) = ctx.docs.insert_approval_card(page_id, &card).await {
        tracing::warn!(
            page = %page_id.short(), request = %request_id, error = %e,
            "card insertion failed, approval record kept"
        );
    }
    Some(request_id)
}

/// Resolve the write mode for a response and perform it.
pub async fn deliver_response(
    ctx: &AgentContext,
    page_id: PageId,
    config: &AgentConfig,
    text: &str,
    intent: &str,
    cost_jpy: f64,
) {
    match resolve_action(config.trust_score, text.chars().count()) {
        ActionKind::DirectWrite => {
            agent_direct_write(ctx, page_id, config, text).await;
        }
        ActionKind::ApprovalCard => {
            insert_approval_card(ctx, page_id, config, text, intent, cost_jpy).await;
        }
    }
}

/// Apply a trust-feedback event through the store's atomic mutation.
pub async fn adjust_trust(
    ctx: &AgentContext,
    config: &AgentConfig,
    event_type: TrustEventType,
    reason: &str,
    custom_delta: Option<i32>,
) -> Option<TrustAdjustment> {
    let delta = event_type.delta(custom_delta);
    match ctx
        .store
        .adjust_trust(&config.agent_id, event_type, delta, reason)
        .await
    {
        Ok(adjustment) => {
            tracing::info!(
                agent = %config.agent_id.short(),
                event = %event_type,
                old = adjustment.old_score,
                new = adjustment.new_score,
                "trust adjusted"
            );
            // The cached assignment now carries a stale score.
            ctx.evict_page_agent(&config.page_id);
            Some(adjustment)
        }
        Err(e) => {
            tracing::warn!(agent = %config.agent_id.short(), error = %e, "trust adjustment failed");
            None
        }
    }
}

/// Record a spend. On `BudgetExceeded` the trust penalty is applied and the
/// agent's loops are stopped; returns `false` in that case.
pub async fn spend_and_enforce(
    ctx: &AgentContext,
    config: &AgentConfig,
    amount_jpy: f64,
    description: &str,
) -> bool {
    match ctx
        .store
        .agent_spend(&config.agent_id, amount_jpy, description)
        .await
    {
        Ok(()) => true,
        Err(StoreError::BudgetExceeded) => {
            tracing::warn!(
                agent = %config.agent_id.short(),
                amount = amount_jpy,
                "budget exceeded, stopping agent"
            );
            adjust_trust(
                ctx,
                config,
                TrustEventType::BudgetExceeded,
                "spend rejected: budget exhausted",
                None,
            )
            .await;
            ctx.remove_active(&config.page_id);
            ctx.docs.set_agent_awareness(&config.page_id, None);
            false
        }
        Err(e) => {
            // Transient store failure: the generation already happened, so
            // carry on and let the next spend reconcile.
            tracing::warn!(agent = %config.agent_id.short(), error = %e, "spend recording failed");
            true
        }
    }
}

/// Cache a suggestion and push it over the stateless channel. The wire frame
/// carries the text itself in `suggestion`; metadata rides alongside.
pub fn publish_suggestion(
    ctx: &AgentContext,
    page_id: PageId,
    suggestion: Suggestion,
    ttl: std::time::Duration,
) {
    let payload = serde_json::json!({
        "type": "suggestion",
        "suggestion": &suggestion.text,
        "agentName": &suggestion.agent_name,
        "intent": &suggestion.intent,
    });
    ctx.suggestions.put(page_id, suggestion, ttl);
    ctx.docs.broadcast_stateless(&page_id, &payload.to_string());
}
