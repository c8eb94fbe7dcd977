//! Behavior classification.
//!
//! A cheap pure rule pass runs on every inference; the LLM is consulted only
//! when the rules are unsure, and never more than once a minute per page.
//! Threshold values are characterization constants, tuned empirically rather
//! than derived.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use marginalia_types::{BehaviorEvent, BehaviorEventType, IntentKind, IntentResult, PageId};
use serde::Deserialize;

use crate::context::AgentContext;
use crate::prompts;

/// Rule pass looks at this many trailing events.
pub const RULE_WINDOW: usize = 20;
/// Edits needed (with a pause present) to call the user stuck.
pub const STUCK_MIN_EDITS: usize = 3;
/// Cursor moves needed (with at most one edit) to call the user searching.
pub const SEARCHING_MIN_CURSOR_MOVES: usize = 5;
pub const SEARCHING_MAX_EDITS: usize = 1;
/// Edits with zero pauses: steady drafting, leave them alone.
pub const DRAFTING_MIN_EDITS: usize = 3;

/// Escalate to the LLM below this rule confidence.
pub const LLM_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// Minimum gap between LLM inferences for one page.
pub const MIN_LLM_INTERVAL: Duration = Duration::from_secs(60);

/// Classify the trailing event window. Pure: identical windows always yield
/// identical results.
pub fn infer_rule_based(events: &[BehaviorEvent]) -> IntentResult {
    let skip = events.len().saturating_sub(RULE_WINDOW);
    let window = &events[skip..];

    if window.is_empty() {
        return IntentResult::new(IntentKind::Idle, 0.9);
    }

    let mut edits = 0usize;
    let mut pauses = 0usize;
    let mut cursor_moves = 0usize;
    for event in window {
        match event.event_type {
            BehaviorEventType::Edit => edits += 1,
            BehaviorEventType::Pause => pauses += 1,
            BehaviorEventType::CursorMove => cursor_moves += 1,
            _ => {}
        }
    }

    if edits >= STUCK_MIN_EDITS && pauses >= 1 {
        IntentResult::new(IntentKind::Stuck, 0.7)
    } else if cursor_moves >= SEARCHING_MIN_CURSOR_MOVES && edits <= SEARCHING_MAX_EDITS {
        IntentResult::new(IntentKind::Searching, 0.6)
    } else if edits >= DRAFTING_MIN_EDITS && pauses == 0 {
        IntentResult::new(IntentKind::Drafting, 0.8)
    } else {
        IntentResult::new(IntentKind::Unknown, 0.3)
    }
}

/// Per-page rate limit on LLM-based inference. Entries are cleared when the
/// page's agent unregisters.
#[derive(Default)]
pub struct InferenceLimiter {
    last: DashMap<PageId, Instant>,
}

impl InferenceLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether enough time has passed since the last LLM inference.
    pub fn interval_elapsed(&self, page_id: &PageId) -> bool {
        match self.last.get(page_id) {
            Some(at) => at.elapsed() >= MIN_LLM_INTERVAL,
            None => true,
        }
    }

    /// Record that an LLM inference just ran.
    pub fn mark(&self, page_id: PageId) {
        self.last.insert(page_id, Instant::now());
    }

    /// Forget a page's rate-limit state.
    pub fn clear(&self, page_id: &PageId) {
        self.last.remove(page_id);
    }
}

/// A completed inference, with the cost of any LLM call it made. The caller
/// owns spend bookkeeping.
#[derive(Debug, Clone)]
pub struct Inference {
    pub result: IntentResult,
    pub cost_jpy: f64,
}

impl Inference {
    fn free(result: IntentResult) -> Self {
        Self {
            result,
            cost_jpy: 0.0,
        }
    }
}

#[derive(Deserialize)]
struct WireIntent {
    intent: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    suggestion: Option<String>,
}

/// Pull a JSON object out of a model reply that may wrap it in code fences.
fn parse_intent_reply(text: &str) -> Option<IntentResult> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    let wire: WireIntent = serde_json::from_str(body).ok()?;
    let intent: IntentKind = wire.intent.parse().ok()?;
    Some(IntentResult {
        intent,
        confidence: wire.confidence.clamp(0.0, 1.0),
        suggestion: wire.suggestion,
    })
}

/// Escalate an uncertain rule result to the LLM. Falls back to the rule
/// result unchanged on rate limit, call failure, or unparseable output.
async fn infer_with_llm(
    ctx: &AgentContext,
    page_id: PageId,
    events: &[BehaviorEvent],
    rule_result: IntentResult,
) -> Inference {
    if !ctx.inference.interval_elapsed(&page_id) {
        return Inference::free(rule_result);
    }

    let page_text = match ctx.docs.read_text(page_id).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(page = %page_id.short(), error = %e, "intent escalation read failed");
            return Inference::free(rule_result);
        }
    };

    ctx.inference.mark(page_id);
    let prefs = ctx.active_config(&page_id).and_then(|c| c.llm);
    let request = prompts::intent_escalation(&page_text, events);

    match ctx.llm.call(prefs.as_ref(), request).await {
        Some(reply) => match parse_intent_reply(&reply.text) {
            Some(result) => Inference {
                result,
                cost_jpy: reply.cost_jpy,
            },
            None => {
                tracing::debug!(page = %page_id.short(), "intent reply unparseable, keeping rule result");
                Inference {
                    result: rule_result,
                    cost_jpy: reply.cost_jpy,
                }
            }
        },
        None => Inference::free(rule_result),
    }
}

/// Full inference: rules first, LLM only for low-confidence or unknown
/// results, and never for the do-not-intervene intents.
pub async fn infer_intent(
    ctx: &AgentContext,
    page_id: PageId,
    events: &[BehaviorEvent],
) -> Inference {
    let rule_result = infer_rule_based(events);

    if rule_result.intent.no_intervention() {
        return Inference::free(rule_result);
    }
    if rule_result.confidence >= LLM_CONFIDENCE_THRESHOLD
        && rule_result.intent != IntentKind::Unknown
    {
        return Inference::free(rule_result);
    }

    infer_with_llm(ctx, page_id, events, rule_result).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeClient;
    use crate::llm::{LlmGateway, MockProvider};
    use crate::store::MemoryStore;
    use marginalia_doc::{DocHost, MemorySnapshotStore};
    use marginalia_types::UserId;
    use std::sync::Arc;

    fn test_ctx(provider: Arc<MockProvider>) -> Arc<AgentContext> {
        let docs = Arc::new(DocHost::new(Arc::new(MemorySnapshotStore::new())));
        let llm = Arc::new(LlmGateway::new(provider));
        let knowledge = Arc::new(KnowledgeClient::new("http://127.0.0.1:1"));
        Arc::new(AgentContext::new(docs, Arc::new(MemoryStore::new()), llm, knowledge))
    }

    fn events(spec: &[(BehaviorEventType, usize)]) -> Vec<BehaviorEvent> {
        let page = PageId::new();
        let user = UserId::new();
        spec.iter()
            .flat_map(|(kind, n)| (0..*n).map(move |_| BehaviorEvent::simple(page, user, *kind)))
            .collect()
    }

    #[test]
    fn edits_plus_pause_means_stuck() {
        let result = infer_rule_based(&events(&[
            (BehaviorEventType::Edit, 4),
            (BehaviorEventType::Pause, 1),
        ]));
        assert_eq!(result.intent, IntentKind::Stuck);
        assert_eq!(result.confidence, 0.7);
    }

    #[test]
    fn cursor_movement_means_searching() {
        let result = infer_rule_based(&events(&[
            (BehaviorEventType::CursorMove, 6),
            (BehaviorEventType::Edit, 1),
        ]));
        assert_eq!(result.intent, IntentKind::Searching);
        assert_eq!(result.confidence, 0.6);
    }

    #[test]
    fn steady_edits_mean_drafting() {
        let result = infer_rule_based(&events(&[(BehaviorEventType::Edit, 5)]));
        assert_eq!(result.intent, IntentKind::Drafting);
        assert!(result.intent.no_intervention());
    }

    #[test]
    fn no_events_means_idle() {
        let result = infer_rule_based(&[]);
        assert_eq!(result.intent, IntentKind::Idle);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn ambiguous_window_is_unknown() {
        let result = infer_rule_based(&events(&[
            (BehaviorEventType::Focus, 1),
            (BehaviorEventType::Selection, 2),
        ]));
        assert_eq!(result.intent, IntentKind::Unknown);
        assert_eq!(result.confidence, 0.3);
    }

    #[test]
    fn rule_pass_is_deterministic() {
        let window = events(&[
            (BehaviorEventType::Edit, 2),
            (BehaviorEventType::CursorMove, 3),
            (BehaviorEventType::Pause, 1),
        ]);
        assert_eq!(infer_rule_based(&window), infer_rule_based(&window));
    }

    #[test]
    fn only_trailing_window_counts() {
        // 30 events, but only the last 20 (all cursor moves) should matter.
        let mut window = events(&[(BehaviorEventType::Edit, 10)]);
        window.extend(events(&[(BehaviorEventType::CursorMove, 20)]));
        let result = infer_rule_based(&window);
        assert_eq!(result.intent, IntentKind::Searching);
    }

    #[test]
    fn limiter_gates_and_clears() {
        let limiter = InferenceLimiter::new();
        let page = PageId::new();

        assert!(limiter.interval_elapsed(&page));
        limiter.mark(page);
        assert!(!limiter.interval_elapsed(&page));
        limiter.clear(&page);
        assert!(limiter.interval_elapsed(&page));
    }

    #[tokio::test]
    async fn confident_rule_result_never_reaches_the_llm() {
        let provider = Arc::new(MockProvider::new("deepseek"));
        let ctx = test_ctx(provider.clone());
        let page = PageId::new();
        let window = events(&[
            (BehaviorEventType::Edit, 4),
            (BehaviorEventType::Pause, 1),
        ]);

        let inference = infer_intent(&ctx, page, &window).await;
        assert_eq!(inference.result.intent, IntentKind::Stuck);
        assert_eq!(inference.result.confidence, 0.7);
        assert_eq!(inference.cost_jpy, 0.0);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_window_escalates_once_per_interval() {
        let provider = Arc::new(
            MockProvider::new("deepseek")
                .with_reply(r#"{"intent": "stuck", "confidence": 0.85}"#),
        );
        let ctx = test_ctx(provider.clone());
        let page = PageId::new();
        ctx.docs
            .append_paragraph(page, "a half-finished draft paragraph")
            .await
            .unwrap();
        let window = events(&[
            (BehaviorEventType::Focus, 1),
            (BehaviorEventType::Selection, 2),
        ]);

        let first = infer_intent(&ctx, page, &window).await;
        assert_eq!(first.result.intent, IntentKind::Stuck);
        assert!(first.cost_jpy > 0.0);
        assert_eq!(provider.call_count(), 1);

        // Inside the per-page interval the rule result stands, for free.
        let second = infer_intent(&ctx, page, &window).await;
        assert_eq!(second.result.intent, IntentKind::Unknown);
        assert_eq!(second.cost_jpy, 0.0);
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn intent_reply_parsing() {
        let parsed = parse_intent_reply(
            r#"{"intent": "stuck", "confidence": 0.85, "suggestion": "try an outline"}"#,
        )
        .unwrap();
        assert_eq!(parsed.intent, IntentKind::Stuck);
        assert_eq!(parsed.suggestion.as_deref(), Some("try an outline"));

        // Fenced output still parses.
        let fenced = "```json\n{\"intent\": \"searching\", \"confidence\": 0.6}\n```";
        assert_eq!(parse_intent_reply(fenced).unwrap().intent, IntentKind::Searching);

        assert!(parse_intent_reply("I think the user is stuck.").is_none());
        assert!(parse_intent_reply(r#"{"intent": "pondering", "confidence": 0.5}"#).is_none());
    }
}
