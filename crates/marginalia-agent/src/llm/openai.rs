//! OpenAI-compatible chat-completions provider.
//!
//! Covers DeepSeek, OpenRouter, Ollama, vLLM, and anything else speaking the
//! `/v1/chat/completions` wire format.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmError, LlmProvider, LlmResult, Role,
    Usage,
};

/// Request timeout. A slow provider degrades to "no suggestion", it must not
/// pin a handler.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A provider speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a provider. `base_url` is the API root (e.g.
    /// `https://api.deepseek.com` or `http://localhost:11434/v1`'s parent).
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// The default model for this provider.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: WireUsage,
    #[serde(default)]
    model: String,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);

        let mut messages: Vec<WireMessage<'_>> = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system.as_deref() {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m: &ChatMessage| WireMessage {
            role: role_str(m.role),
            content: &m.content,
        }));

        let body = WireRequest {
            model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::AuthError(status.to_string()));
        }
        if !status.is_success() {
            return Err(LlmError::ApiError(format!("status {status}")));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ApiError(format!("decode failed: {e}")))?;

        let content = wire
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::ApiError("response carried no choices".into()))?;

        Ok(CompletionResponse {
            content,
            model: if wire.model.is_empty() {
                model.to_string()
            } else {
                wire.model
            },
            usage: Usage {
                input_tokens: wire.usage.prompt_tokens,
                output_tokens: wire.usage.completion_tokens,
            },
        })
    }
}
