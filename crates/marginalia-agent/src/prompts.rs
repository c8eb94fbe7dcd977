//! Prompt construction.
//!
//! Every LLM call in the crate builds its request here, so token budgets and
//! truncation rules live in one place.

use marginalia_types::BehaviorEvent;

use crate::knowledge::{format_facts, Fact};
use crate::llm::{ChatMessage, CompletionRequest};
use crate::store::ContextSummary;

/// Max page characters fed to the intent-escalation prompt.
const INTENT_PAGE_CHARS: usize = 1000;
/// Behavior events included in the intent-escalation prompt.
const INTENT_EVENT_COUNT: usize = 10;
/// Max page characters fed to suggestion/response prompts.
const PAGE_CHARS: usize = 2000;

/// Truncate to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn facts_section(facts: &[Fact]) -> String {
    if facts.is_empty() {
        String::new()
    } else {
        format!("\n\nWhat you know about this user:\n{}", format_facts(facts))
    }
}

/// Ambient nudge after an input pause: short, optional, never demanding.
pub fn ambient_suggestion(
    agent_name: &str,
    page_text: &str,
    context_text: &str,
    facts: &[Fact],
) -> CompletionRequest {
    let system = format!(
        "You are {agent_name}, a quiet writing companion embedded in a shared \
         notebook. The user paused while writing. Offer one short, concrete \
         suggestion (1-2 sentences) for how to continue. Do not greet, do not \
         apologize, do not ask questions.{}",
        facts_section(facts)
    );
    let prompt = format!(
        "Page content:\n{}\n\nThe user paused right after writing:\n{}",
        truncate_chars(page_text, PAGE_CHARS),
        context_text,
    );
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .with_system(system)
        .with_max_tokens(200)
}

/// Direct reply to an explicit mention.
pub fn direct_response(
    agent_name: &str,
    page_text: &str,
    instruction: &str,
    facts: &[Fact],
) -> CompletionRequest {
    let system = format!(
        "You are {agent_name}, an assistant addressed directly inside a shared \
         notebook. Answer the user's request concisely. Your reply will be \
         inserted into the page, so write prose, not chat.{}",
        facts_section(facts)
    );
    let prompt = format!(
        "Page content:\n{}\n\nRequest:\n{}",
        truncate_chars(page_text, PAGE_CHARS),
        instruction,
    );
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .with_system(system)
        .with_max_tokens(400)
}

/// Structured intent classification, used only when the rules are unsure.
pub fn intent_escalation(page_text: &str, events: &[BehaviorEvent]) -> CompletionRequest {
    let skip = events.len().saturating_sub(INTENT_EVENT_COUNT);
    let event_lines: Vec<String> = events[skip..]
        .iter()
        .map(|e| format!("- {:?} at {}", e.event_type, e.created_at))
        .collect();

    let system = "You classify what a writer is doing from their recent editor \
                  activity. Respond with JSON only: {\"intent\": one of \
                  \"stuck\"|\"searching\"|\"drafting\"|\"idle\"|\"unknown\", \
                  \"confidence\": 0.0-1.0, \"suggestion\": optional short string}.";
    let prompt = format!(
        "Page content:\n{}\n\nRecent activity:\n{}",
        truncate_chars(page_text, INTENT_PAGE_CHARS),
        event_lines.join("\n"),
    );
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .with_system(system)
        .with_max_tokens(150)
        .with_temperature(0.3)
}

/// Ambient clone tick: continue the owner's work across contexts.
pub fn clone_continuation(
    agent_name: &str,
    owner_name: &str,
    page_text: &str,
    summaries: &[ContextSummary],
) -> CompletionRequest {
    let context = if summaries.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = summaries
            .iter()
            .map(|s| format!("- {}", s.summary))
            .collect();
        format!(
            "\n\nWhat {owner_name} has been working on elsewhere:\n{}",
            lines.join("\n")
        )
    };
    let system = format!(
        "You are {agent_name}, working on behalf of {owner_name} while they are \
         away. Suggest one concrete next step for this page, grounded in the \
         page itself. One or two sentences.{context}"
    );
    let prompt = format!("Page content:\n{}", truncate_chars(page_text, PAGE_CHARS));
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .with_system(system)
        .with_max_tokens(200)
}

/// Periodic conversation summary for cross-context memory.
pub fn context_summary(combined_text: &str) -> CompletionRequest {
    let system = "Summarize what the user is working on in this conversation in \
                  2-3 sentences. Capture topics, goals, and open threads. Write \
                  in the third person.";
    let prompt = format!(
        "Recent pages:\n{}",
        truncate_chars(combined_text, 4000)
    );
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .with_system(system)
        .with_max_tokens(150)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_types::{BehaviorEventType, PageId, UserId};

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multibyte input must not split a char.
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn escalation_takes_last_ten_events() {
        let page = PageId::new();
        let user = UserId::new();
        let events: Vec<BehaviorEvent> = (0..25)
            .map(|_| BehaviorEvent::simple(page, user, BehaviorEventType::Edit))
            .collect();

        let request = intent_escalation("some page text", &events);
        let prompt = &request.messages[0].content;
        assert_eq!(prompt.matches("- Edit").count(), 10);
        assert_eq!(request.temperature, Some(0.3));
    }

    #[test]
    fn facts_reach_the_system_prompt() {
        let facts = vec![Fact {
            uuid: "1".into(),
            fact: "keeps a travel journal".into(),
            valid_at: None,
            invalid_at: None,
            created_at: None,
        }];
        let request = ambient_suggestion("Scribe", "page", "paused here", &facts);
        assert!(request.system.as_deref().unwrap().contains("keeps a travel journal"));
    }
}
