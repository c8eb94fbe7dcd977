//! marginalia server: realtime CRDT sync plus the agent-facing HTTP surface.
//!
//! One process hosts both channels:
//!
//! - `/ws/:page_id`: CRDT sync, awareness, and the stateless side-channel
//!   that carries agent events in and suggestions out.
//! - `/api/*`: a small bearer-authenticated HTTP API for server-to-server
//!   agent reads/writes, plus the CORS-open suggestion poll endpoint.

pub mod config;
pub mod http;
pub mod ws;

use std::sync::Arc;

use dashmap::DashMap;
use marginalia_agent::{AgentContext, EventRouter};
use marginalia_types::PageId;

/// Shared handler state for both channels.
pub struct AppState {
    pub ctx: Arc<AgentContext>,
    pub events: Arc<EventRouter>,
    pub internal_secret: String,
    /// Connected realtime clients per page, driving load/unload.
    connections: DashMap<PageId, usize>,
}

impl AppState {
    pub fn new(ctx: Arc<AgentContext>, internal_secret: impl Into<String>) -> Self {
        let events = Arc::new(EventRouter::with_default_handlers(ctx.clone()));
        Self {
            ctx,
            events,
            internal_secret: internal_secret.into(),
            connections: DashMap::new(),
        }
    }

    /// Record a client joining a page; returns the new connection count.
    pub(crate) fn client_joined(&self, page_id: PageId) -> usize {
        let mut entry = self.connections.entry(page_id).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Record a client leaving a page; returns the remaining count.
    pub(crate) fn client_left(&self, page_id: &PageId) -> usize {
        let Some(mut entry) = self.connections.get_mut(page_id) else {
            return 0;
        };
        *entry = entry.saturating_sub(1);
        let remaining = *entry;
        drop(entry);
        if remaining == 0 {
            self.connections.remove(page_id);
        }
        remaining
    }
}

/// The full application router.
pub fn app(state: Arc<AppState>) -> axum::Router {
    http::router(state.clone()).merge(ws::router(state))
}
