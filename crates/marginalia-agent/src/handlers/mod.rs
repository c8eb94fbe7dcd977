//! Reactive event handlers.
//!
//! One handler per [`AgentEventType`](marginalia_types::AgentEventType). Each
//! receives the event plus the page's agent config and runs on its own task;
//! a missing payload field is a silent no-op, not an error.

mod input_pause;
mod mention;
mod page_transition;
mod paragraph;

pub use input_pause::InputPause;
pub use mention::Mention;
pub use page_transition::PageTransition;
pub use paragraph::ParagraphComplete;

use std::time::Duration;

/// TTL for suggestions produced by reactive handlers.
pub(crate) const SUGGESTION_TTL: Duration = Duration::from_secs(60);

/// Shortest `contextText` worth reacting to.
pub(crate) const MIN_CONTEXT_CHARS: usize = 5;

/// Shortest paragraph worth remembering as an episode.
pub(crate) const MIN_PARAGRAPH_CHARS: usize = 10;
