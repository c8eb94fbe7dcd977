//! Behavioral event router.
//!
//! Events arrive over the stateless channel, get debounced per
//! (page, event type), gated on the page actually having an agent, and then
//! handed to the registered handler on a spawned task. The router never waits
//! for a handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use marginalia_types::{AgentConfig, AgentEvent, AgentEventType, PageId};

use crate::context::AgentContext;
use crate::handlers;

/// One reactive handler. Runs to completion asynchronously relative to the
/// router; failures are logged, never propagated back to the channel.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: Arc<AgentContext>,
        event: AgentEvent,
        config: AgentConfig,
    ) -> anyhow::Result<()>;
}

/// What the router did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to a handler task.
    Dispatched,
    /// Dropped: same type on the same page arrived within the window.
    Debounced,
    /// Dropped: the page has no agent.
    NoAgent,
    /// Dropped: no handler registered for the type.
    NoHandler,
}

pub struct EventRouter {
    ctx: Arc<AgentContext>,
    handlers: HashMap<AgentEventType, Arc<dyn EventHandler>>,
    last_dispatched: DashMap<(PageId, AgentEventType), Instant>,
}

impl EventRouter {
    /// An empty router. Handlers are registered once at startup.
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self {
            ctx,
            handlers: HashMap::new(),
            last_dispatched: DashMap::new(),
        }
    }

    /// A router with the four standard handlers registered.
    pub fn with_default_handlers(ctx: Arc<AgentContext>) -> Self {
        let mut router = Self::new(ctx);
        router.register(AgentEventType::InputPause, Arc::new(handlers::InputPause));
        router.register(AgentEventType::Mention, Arc::new(handlers::Mention));
        router.register(
            AgentEventType::ParagraphComplete,
            Arc::new(handlers::ParagraphComplete),
        );
        router.register(
            AgentEventType::PageTransition,
            Arc::new(handlers::PageTransition),
        );
        router
    }

    pub fn register(&mut self, event_type: AgentEventType, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(event_type, handler);
    }

    fn debounced(&self, key: (PageId, AgentEventType)) -> bool {
        let window = key.1.debounce_window();
        if window.is_zero() {
            return false;
        }
        match self.last_dispatched.get(&key) {
            Some(at) => at.elapsed() < window,
            None => false,
        }
    }

    /// Route one event. Returns what happened to it; the handler itself runs
    /// on its own task.
    pub async fn dispatch(&self, event: AgentEvent) -> DispatchOutcome {
        let key = (event.page_id, event.event_type);

        if self.debounced(key) {
            tracing::trace!(page = %event.page_id.short(), event = %event.event_type, "debounced");
            return DispatchOutcome::Debounced;
        }

        let Some(config) = self.ctx.page_agent(&event.page_id).await else {
            return DispatchOutcome::NoAgent;
        };

        let Some(handler) = self.handlers.get(&event.event_type) else {
            tracing::debug!(event = %event.event_type, "no handler registered");
            return DispatchOutcome::NoHandler;
        };

        self.last_dispatched.insert(key, Instant::now());
        tracing::debug!(
            page = %event.page_id.short(),
            event = %event.event_type,
            agent = %config.agent_id.short(),
            "dispatching"
        );

        let handler = handler.clone();
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let page = event.page_id;
            let event_type = event.event_type;
            if let Err(e) = handler.handle(ctx, event, config).await {
                tracing::warn!(page = %page.short(), event = %event_type, error = %e, "handler failed");
            }
        });

        DispatchOutcome::Dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeClient;
    use crate::llm::{LlmGateway, MockProvider};
    use crate::store::MemoryStore;
    use marginalia_doc::{DocHost, MemorySnapshotStore};
    use marginalia_types::{AgentId, UserId};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_ctx() -> (Arc<AgentContext>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let docs = Arc::new(DocHost::new(Arc::new(MemorySnapshotStore::new())));
        let llm = Arc::new(LlmGateway::new(Arc::new(MockProvider::new("deepseek"))));
        let knowledge = Arc::new(KnowledgeClient::new("http://127.0.0.1:1"));
        (
            Arc::new(AgentContext::new(docs, store.clone(), llm, knowledge)),
            store,
        )
    }

    fn agent_config(page_id: PageId) -> AgentConfig {
        AgentConfig {
            page_id,
            agent_id: AgentId::new(),
            agent_name: "Scribe".into(),
            trust_score: 85,
            is_ambient: false,
            owner_id: Some(UserId::new()),
            llm: None,
        }
    }

    fn event(page_id: PageId, event_type: AgentEventType) -> AgentEvent {
        AgentEvent {
            event_type,
            payload: serde_json::Value::Null,
            timestamp: String::new(),
            user_id: UserId::new(),
            page_id,
        }
    }

    struct Counting(Arc<AtomicU32>);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(
            &self,
            _ctx: Arc<AgentContext>,
            _event: AgentEvent,
            _config: AgentConfig,
        ) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_without_agent_are_dropped() {
        let (ctx, _store) = test_ctx();
        let router = EventRouter::with_default_handlers(ctx);
        let outcome = router.dispatch(event(PageId::new(), AgentEventType::Mention)).await;
        assert_eq!(outcome, DispatchOutcome::NoAgent);
    }

    #[tokio::test]
    async fn same_type_same_page_debounces() {
        let (ctx, store) = test_ctx();
        let page = PageId::new();
        store.set_page_agent(page, agent_config(page));

        let count = Arc::new(AtomicU32::new(0));
        let mut router = EventRouter::new(ctx);
        router.register(AgentEventType::InputPause, Arc::new(Counting(count.clone())));

        let first = router.dispatch(event(page, AgentEventType::InputPause)).await;
        let second = router.dispatch(event(page, AgentEventType::InputPause)).await;
        assert_eq!(first, DispatchOutcome::Dispatched);
        assert_eq!(second, DispatchOutcome::Debounced);

        // A different page is an independent debounce key.
        let other = PageId::new();
        store.set_page_agent(other, agent_config(other));
        assert_eq!(
            router.dispatch(event(other, AgentEventType::InputPause)).await,
            DispatchOutcome::Dispatched
        );
    }

    #[tokio::test]
    async fn zero_window_types_never_debounce() {
        let (ctx, store) = test_ctx();
        let page = PageId::new();
        store.set_page_agent(page, agent_config(page));

        let count = Arc::new(AtomicU32::new(0));
        let mut router = EventRouter::new(ctx);
        router.register(AgentEventType::Mention, Arc::new(Counting(count.clone())));

        for _ in 0..3 {
            assert_eq!(
                router.dispatch(event(page, AgentEventType::Mention)).await,
                DispatchOutcome::Dispatched
            );
        }
    }

    #[tokio::test]
    async fn unregistered_type_reports_no_handler() {
        let (ctx, store) = test_ctx();
        let page = PageId::new();
        store.set_page_agent(page, agent_config(page));

        let router = EventRouter::new(ctx);
        assert_eq!(
            router.dispatch(event(page, AgentEventType::Mention)).await,
            DispatchOutcome::NoHandler
        );
    }
}
