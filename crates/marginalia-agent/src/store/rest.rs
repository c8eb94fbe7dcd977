//! REST-backed store client.
//!
//! Every operation is a POST to `{base}/rpc/{name}` authenticated with the
//! service key. Mutations that must not race (trust adjustment, spend) are
//! stored procedures on the database side; this client only ships parameters
//! and interprets results.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use marginalia_doc::{DocError, SnapshotStore};
use marginalia_types::{
    AgentConfig, AgentId, BehaviorEvent, ConversationId, PageId, RequestId, TrustAdjustment,
    TrustEventType, UserId,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{AmbientAgent, ApprovalRequest, ContextSummary, DataStore, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Store client speaking the RPC surface of the backing database.
pub struct RestStore {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn rpc<P: Serialize, R: DeserializeOwned>(
        &self,
        name: &str,
        params: &P,
    ) -> Result<R, StoreError> {
        let response = self
            .client
            .post(format!("{}/rpc/{name}", self.base_url))
            .bearer_auth(&self.service_key)
            .json(params)
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("{name}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized);
        }
        if !status.is_success() {
            return Err(StoreError::Request(format!("{name}: status {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("{name}: {e}")))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenParams<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenReply {
    #[serde(default)]
    user_id: Option<UserId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageParams<'a> {
    page_id: &'a PageId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserParams<'a> {
    user_id: &'a UserId,
}

#[derive(Deserialize)]
struct NameReply {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BehaviorParams<'a> {
    page_id: &'a PageId,
    limit: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestIdReply {
    request_id: RequestId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrustParams<'a> {
    agent_id: &'a AgentId,
    event_type: TrustEventType,
    delta: i32,
    reason: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpendParams<'a> {
    agent_id: &'a AgentId,
    amount_jpy: f64,
    description: &'a str,
}

#[derive(Deserialize)]
struct SpendReply {
    allowed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PagesParams<'a> {
    conversation_id: &'a ConversationId,
    limit: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryParams<'a> {
    user_id: &'a UserId,
    conversation_id: &'a ConversationId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotParams<'a> {
    page_id: &'a PageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<String>,
}

#[derive(Deserialize)]
struct SnapshotReply {
    #[serde(default)]
    snapshot: Option<String>,
}

#[async_trait]
impl DataStore for RestStore {
    async fn verify_token(&self, token: &str) -> Result<Option<UserId>, StoreError> {
        let reply: TokenReply = self.rpc("verify_token", &TokenParams { token }).await?;
        Ok(reply.user_id)
    }

    async fn page_agent(&self, page_id: &PageId) -> Result<Option<AgentConfig>, StoreError> {
        self.rpc("page_agent", &PageParams { page_id }).await
    }

    async fn profile_name(&self, user_id: &UserId) -> Result<Option<String>, StoreError> {
        let reply: NameReply = self.rpc("profile_name", &UserParams { user_id }).await?;
        Ok(reply.name)
    }

    async fn recent_behavior(
        &self,
        page_id: &PageId,
        limit: usize,
    ) -> Result<Vec<BehaviorEvent>, StoreError> {
        self.rpc("recent_behavior", &BehaviorParams { page_id, limit })
            .await
    }

    async fn create_approval_request(
        &self,
        request: &ApprovalRequest,
    ) -> Result<RequestId, StoreError> {
        let reply: RequestIdReply = self.rpc("create_approval_request", request).await?;
        Ok(reply.request_id)
    }

    async fn adjust_trust(
        &self,
        agent_id: &AgentId,
        event_type: TrustEventType,
        delta: i32,
        reason: &str,
    ) -> Result<TrustAdjustment, StoreError> {
        self.rpc(
            "adjust_trust",
            &TrustParams {
                agent_id,
                event_type,
                delta,
                reason,
            },
        )
        .await
    }

    async fn agent_spend(
        &self,
        agent_id: &AgentId,
        amount_jpy: f64,
        description: &str,
    ) -> Result<(), StoreError> {
        let reply: SpendReply = self
            .rpc(
                "agent_spend",
                &SpendParams {
                    agent_id,
                    amount_jpy,
                    description,
                },
            )
            .await?;
        if reply.allowed {
            Ok(())
        } else {
            Err(StoreError::BudgetExceeded)
        }
    }

    async fn ambient_agents(&self) -> Result<Vec<AmbientAgent>, StoreError> {
        self.rpc("ambient_agents", &serde_json::json!({})).await
    }

    async fn member_conversations(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ConversationId>, StoreError> {
        self.rpc("member_conversations", &UserParams { user_id })
            .await
    }

    async fn recent_pages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<PageId>, StoreError> {
        self.rpc(
            "recent_pages",
            &PagesParams {
                conversation_id,
                limit,
            },
        )
        .await
    }

    async fn context_summary(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ContextSummary>, StoreError> {
        self.rpc(
            "context_summary",
            &SummaryParams {
                user_id,
                conversation_id,
            },
        )
        .await
    }

    async fn upsert_context_summary(&self, summary: &ContextSummary) -> Result<(), StoreError> {
        let _: serde_json::Value = self.rpc("upsert_context_summary", summary).await?;
        Ok(())
    }

    async fn cross_context_summaries(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ContextSummary>, StoreError> {
        self.rpc("cross_context_summaries", &UserParams { user_id })
            .await
    }
}

/// Document snapshots ride the same RPC surface, base64-encoded in transit.
#[async_trait]
impl SnapshotStore for RestStore {
    async fn fetch(&self, page_id: &PageId) -> Result<Option<Vec<u8>>, DocError> {
        let reply: SnapshotReply = self
            .rpc(
                "page_snapshot",
                &SnapshotParams {
                    page_id,
                    snapshot: None,
                },
            )
            .await
            .map_err(|e| DocError::Snapshot(e.to_string()))?;

        match reply.snapshot {
            Some(encoded) => {
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|e| DocError::Snapshot(format!("base64 decode: {e}")))?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, page_id: &PageId, snapshot: &[u8]) -> Result<(), DocError> {
        let _: serde_json::Value = self
            .rpc(
                "store_page_snapshot",
                &SnapshotParams {
                    page_id,
                    snapshot: Some(BASE64.encode(snapshot)),
                },
            )
            .await
            .map_err(|e| DocError::Snapshot(e.to_string()))?;
        Ok(())
    }
}
