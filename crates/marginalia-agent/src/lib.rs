//! Agent orchestration for marginalia.
//!
//! This crate hosts everything between the realtime channel and the shared
//! document: the behavioral event router, the four reactive handlers, the
//! intent-inference engine, the trust-gated action resolver, the agent
//! lifecycle supervisor (including ambient tick loops), and the background
//! context summarizer.
//!
//! # Architecture
//!
//! ```text
//! AgentEvent ──▶ EventRouter ──▶ handler (input_pause | mention |
//!                 (debounce)      paragraph_complete | page_transition)
//!                                    │
//!                     ┌──────────────┼─────────────────┐
//!                     ▼              ▼                 ▼
//!               IntentEngine    LlmGateway      KnowledgeClient
//!                     │              │
//!                     └──────▶ resolve_action ──▶ DocHost (write)
//!                                    │             + awareness broadcast
//!                                    ▼
//!                              DataStore (cost/trust bookkeeping)
//! ```
//!
//! All shared mutable state (page-agent cache, inference rate limits,
//! suggestion caches, active-agent registry) lives in [`AgentContext`], an
//! explicitly injected handle, not module-level singletons. Components read
//! through it and tolerate missing entries ("no agent" is a state, not an
//! error).

pub mod actions;
pub mod context;
pub mod handlers;
pub mod intent;
pub mod knowledge;
pub mod llm;
pub mod prompts;
pub mod router;
pub mod store;
pub mod suggestions;
pub mod summarizer;
pub mod supervisor;

pub use context::AgentContext;
pub use intent::InferenceLimiter;
pub use knowledge::{Fact, KnowledgeClient};
pub use llm::{LlmGateway, LlmReply};
pub use router::{DispatchOutcome, EventRouter};
pub use store::{DataStore, StoreError};
pub use suggestions::SuggestionCache;
