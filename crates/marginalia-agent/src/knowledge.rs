//! Knowledge-store client.
//!
//! Talks to the external knowledge-graph service: episodes go in
//! (fire-and-forget), related facts come out. The client holds no session
//! state; every call is independent and failures degrade to "no facts".

use std::sync::Arc;
use std::time::Duration;

use marginalia_types::UserId;
use serde::{Deserialize, Serialize};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default number of facts returned by a search.
pub const DEFAULT_MAX_FACTS: usize = 5;

/// A fact edge from the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub uuid: String,
    pub fact: String,
    #[serde(default)]
    pub valid_at: Option<String>,
    #[serde(default)]
    pub invalid_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// An episode to record.
#[derive(Debug, Clone)]
pub struct Episode {
    pub group_id: String,
    pub name: String,
    pub content: String,
    /// "user" or "agent".
    pub role: String,
    pub source_description: String,
}

/// Knowledge-graph group key for a user's memory.
pub fn user_group(user_id: &UserId) -> String {
    format!("user-{user_id}")
}

/// Group for an agent's memory lookups: the owner's when the agent has one,
/// the acting user's otherwise. Keeps one agent's recall in one group even
/// when several collaborators trigger it.
pub fn agent_group(owner: Option<&UserId>, acting_user: &UserId) -> String {
    user_group(owner.unwrap_or(acting_user))
}

/// Render facts as prompt-ready bullet lines. Empty string for no facts.
pub fn format_facts(facts: &[Fact]) -> String {
    facts
        .iter()
        .map(|f| format!("- {}", f.fact))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Serialize)]
struct WireEpisodeMessage<'a> {
    uuid: String,
    name: &'a str,
    role: &'a str,
    role_type: &'static str,
    content: &'a str,
    timestamp: String,
    source_description: &'a str,
}

#[derive(Serialize)]
struct WireEpisodeRequest<'a> {
    group_id: &'a str,
    messages: Vec<WireEpisodeMessage<'a>>,
}

#[derive(Serialize)]
struct WireSearchRequest<'a> {
    query: &'a str,
    group_ids: Vec<&'a str>,
    max_facts: usize,
}

#[derive(Deserialize, Default)]
struct WireSearchResponse {
    #[serde(default)]
    facts: Vec<Fact>,
}

/// REST client for the knowledge store.
pub struct KnowledgeClient {
    base_url: String,
    client: reqwest::Client,
}

impl KnowledgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Record an episode. Awaitable form; failures are logged, never returned.
    pub async fn add_episode(&self, episode: Episode) {
        let body = WireEpisodeRequest {
            group_id: &episode.group_id,
            messages: vec![WireEpisodeMessage {
                uuid: uuid::Uuid::new_v4().to_string(),
                name: &episode.name,
                role: &episode.role,
                role_type: "user",
                content: &episode.content,
                timestamp: format!("{}", marginalia_types::now_millis()),
                source_description: &episode.source_description,
            }],
        };

        let result = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&body)
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!(group = %episode.group_id, error = %e, "addEpisode failed");
        }
    }

    /// Record an episode without blocking the caller. The spawned task's
    /// failure path is log-only.
    pub fn spawn_add_episode(self: &Arc<Self>, episode: Episode) {
        let client = self.clone();
        tokio::spawn(async move {
            client.add_episode(episode).await;
        });
    }

    /// Search related facts. Empty on any failure.
    pub async fn search_facts(&self, query: &str, group_id: &str, max_facts: usize) -> Vec<Fact> {
        let body = WireSearchRequest {
            query,
            group_ids: vec![group_id],
            max_facts,
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(res) if res.status().is_success() => {
                res.json::<WireSearchResponse>().await.map(|r| r.facts).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "searchFacts decode failed");
                    Vec::new()
                })
            }
            Ok(res) => {
                tracing::debug!(status = %res.status(), "searchFacts non-success");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "searchFacts failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_facts_bullets() {
        let facts = vec![
            Fact {
                uuid: "1".into(),
                fact: "prefers short sentences".into(),
                valid_at: None,
                invalid_at: None,
                created_at: None,
            },
            Fact {
                uuid: "2".into(),
                fact: "writing a travel journal".into(),
                valid_at: None,
                invalid_at: None,
                created_at: None,
            },
        ];
        assert_eq!(
            format_facts(&facts),
            "- prefers short sentences\n- writing a travel journal"
        );
        assert_eq!(format_facts(&[]), "");
    }

    #[test]
    fn group_key_embeds_user() {
        let user = UserId::new();
        assert_eq!(user_group(&user), format!("user-{user}"));
    }

    #[test]
    fn owner_takes_precedence_for_agent_groups() {
        let owner = UserId::new();
        let collaborator = UserId::new();
        assert_eq!(agent_group(Some(&owner), &collaborator), user_group(&owner));
        assert_eq!(agent_group(None, &collaborator), user_group(&collaborator));
    }
}
