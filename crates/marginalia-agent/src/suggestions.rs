//! Per-page suggestion cache.
//!
//! Generated suggestions are ephemeral: they are pushed over the stateless
//! channel and also parked here so late-joining clients can poll them. Each
//! entry carries its own TTL; expiry is checked on read, nothing sweeps.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use marginalia_types::PageId;
use serde::{Deserialize, Serialize};

/// A cached suggestion, as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub agent_name: String,
    pub text: String,
    /// Inferred intent that produced this suggestion.
    pub intent: String,
}

struct Entry {
    suggestion: Suggestion,
    expires_at: Instant,
}

/// Latest suggestion per page, TTL-bounded.
#[derive(Default)]
pub struct SuggestionCache {
    entries: DashMap<PageId, Entry>,
}

impl SuggestionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a suggestion, replacing any previous one for the page.
    pub fn put(&self, page_id: PageId, suggestion: Suggestion, ttl: Duration) {
        self.entries.insert(
            page_id,
            Entry {
                suggestion,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Current suggestion for a page. Expired entries are dropped on read.
    pub fn get(&self, page_id: &PageId) -> Option<Suggestion> {
        let expired = match self.entries.get(page_id) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.suggestion.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(page_id);
        }
        None
    }

    /// Drop a page's suggestion, if any.
    pub fn remove(&self, page_id: &PageId) {
        self.entries.remove(page_id);
    }
}
