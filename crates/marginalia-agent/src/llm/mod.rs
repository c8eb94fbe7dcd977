//! LLM provider abstraction and cost-accounted gateway.
//!
//! [`LlmProvider`] is the uniform call interface across providers; the
//! [`LlmGateway`] layers per-provider token pricing on top and degrades every
//! failure to `None`; callers treat "no text this cycle" as a normal
//! outcome, never an error to propagate.

mod openai;
#[cfg(any(test, feature = "test-mock"))]
mod mock;

pub use openai::OpenAiCompatProvider;
#[cfg(any(test, feature = "test-mock"))]
pub use mock::MockProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use marginalia_types::LlmPrefs;
use serde::{Deserialize, Serialize};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction context (provider-side handling varies).
    System,
    /// Human/user message.
    User,
    /// Assistant/model message.
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message.
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
}

impl Usage {
    /// Total tokens (input + output).
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response from a completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The generated text content.
    pub content: String,
    /// Model that generated the response.
    pub model: String,
    /// Token usage statistics.
    pub usage: Usage,
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Conversation history.
    pub messages: Vec<ChatMessage>,
    /// System prompt (provider-specific handling).
    pub system: Option<String>,
    /// Model identifier; provider default when `None`.
    pub model: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic).
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a new completion request against the provider's default model.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            system: None,
            model: None,
            max_tokens: 300,
            temperature: None,
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Provider not configured or unavailable.
    #[error("provider not available: {0}")]
    Unavailable(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// API error.
    #[error("api error: {0}")]
    ApiError(String),

    /// Network error.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g. "deepseek", "local").
    fn name(&self) -> &str;

    /// Send a completion request.
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse>;
}

/// Per-provider token pricing in JPY.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenPrice {
    /// JPY per input token.
    pub input_jpy: f64,
    /// JPY per output token.
    pub output_jpy: f64,
}

impl TokenPrice {
    /// Cost for a usage record, rounded **up** to 2 decimal JPY.
    pub fn cost_jpy(&self, usage: Usage) -> f64 {
        let raw = usage.input_tokens as f64 * self.input_jpy
            + usage.output_tokens as f64 * self.output_jpy;
        (raw * 100.0).ceil() / 100.0
    }
}

/// JPY per USD used for the default price table.
const JPY_PER_USD: f64 = 150.0;

/// DeepSeek-V3.2 pricing, USD per 1M tokens converted to JPY per token.
pub const DEEPSEEK_PRICE: TokenPrice = TokenPrice {
    input_jpy: 0.28 / 1_000_000.0 * JPY_PER_USD,
    output_jpy: 0.42 / 1_000_000.0 * JPY_PER_USD,
};

/// A successful, cost-accounted generation.
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_jpy: f64,
}

/// Registry of providers plus pricing: the single entry point components use
/// to generate text.
pub struct LlmGateway {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    pricing: HashMap<String, TokenPrice>,
    default_provider: String,
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("default_provider", &self.default_provider)
            .finish()
    }
}

impl LlmGateway {
    /// Create a gateway with a default provider. Local/self-hosted providers
    /// default to zero pricing until [`set_price`](Self::set_price) is called.
    pub fn new(default_provider: Arc<dyn LlmProvider>) -> Self {
        let name = default_provider.name().to_string();
        let mut gateway = Self {
            providers: HashMap::new(),
            pricing: HashMap::new(),
            default_provider: name.clone(),
        };
        gateway.providers.insert(name, default_provider);
        gateway.pricing.insert("deepseek".to_string(), DEEPSEEK_PRICE);
        gateway
    }

    /// Register an additional provider.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    /// Set the token price for a provider.
    pub fn set_price(&mut self, provider: impl Into<String>, price: TokenPrice) {
        self.pricing.insert(provider.into(), price);
    }

    fn provider_for(&self, prefs: Option<&LlmPrefs>) -> Option<Arc<dyn LlmProvider>> {
        let name = prefs
            .map(|p| p.provider.as_str())
            .unwrap_or(self.default_provider.as_str());
        match self.providers.get(name) {
            Some(p) => Some(p.clone()),
            None => {
                // Unknown preference falls back to the default provider.
                tracing::debug!(provider = name, "unknown provider preference, using default");
                self.providers.get(&self.default_provider).cloned()
            }
        }
    }

    /// Generate text. Applies per-agent preferences (provider, model, extra
    /// system prompt), accounts cost, and returns `None` on any failure;
    /// callers degrade to "no suggestion this cycle".
    pub async fn call(
        &self,
        prefs: Option<&LlmPrefs>,
        mut request: CompletionRequest,
    ) -> Option<LlmReply> {
        let provider = self.provider_for(prefs)?;

        if let Some(prefs) = prefs {
            if request.model.is_none() {
                request.model = prefs.model.clone();
            }
            if let Some(extra) = &prefs.system_prompt {
                request.system = Some(match request.system.take() {
                    Some(system) => format!("{extra}\n\n{system}"),
                    None => extra.clone(),
                });
            }
        }

        match provider.complete(request).await {
            Ok(response) => {
                let price = self
                    .pricing
                    .get(provider.name())
                    .copied()
                    .unwrap_or_default();
                Some(LlmReply {
                    cost_jpy: price.cost_jpy(response.usage),
                    input_tokens: response.usage.input_tokens,
                    output_tokens: response.usage.output_tokens,
                    text: response.content,
                })
            }
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "llm call failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let user = ChatMessage::user("hello");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "hello");

        let assistant = ChatMessage::assistant("hi there");
        assert_eq!(assistant.role, Role::Assistant);
    }

    #[test]
    fn completion_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("test")])
            .with_system("You are helpful")
            .with_model("deepseek-chat")
            .with_max_tokens(1000)
            .with_temperature(0.7);

        assert_eq!(request.model.as_deref(), Some("deepseek-chat"));
        assert_eq!(request.system.as_deref(), Some("You are helpful"));
        assert_eq!(request.max_tokens, 1000);
        assert_eq!(request.temperature, Some(0.7));
    }

    #[test]
    fn cost_rounds_up_to_two_decimals() {
        let price = TokenPrice {
            input_jpy: 0.001,
            output_jpy: 0.002,
        };
        let usage = Usage {
            input_tokens: 101, // 0.101
            output_tokens: 1,  // 0.002 → 0.103 → ceil to 0.11
        };
        assert_eq!(price.cost_jpy(usage), 0.11);

        // Exact boundaries do not over-round.
        let usage = Usage {
            input_tokens: 100,
            output_tokens: 0,
        };
        assert_eq!(price.cost_jpy(usage), 0.1);
    }

    #[tokio::test]
    async fn gateway_accounts_cost_and_applies_prefs() {
        let provider = Arc::new(MockProvider::new("deepseek").with_reply("generated"));
        let mut gateway = LlmGateway::new(provider.clone());
        gateway.set_price(
            "deepseek",
            TokenPrice {
                input_jpy: 0.01,
                output_jpy: 0.01,
            },
        );

        let prefs = LlmPrefs {
            provider: "deepseek".into(),
            model: Some("deepseek-chat".into()),
            system_prompt: Some("be brief".into()),
        };
        let reply = gateway
            .call(
                Some(&prefs),
                CompletionRequest::new(vec![ChatMessage::user("hi")]),
            )
            .await
            .unwrap();

        assert_eq!(reply.text, "generated");
        assert!(reply.cost_jpy > 0.0);
        let seen = provider.last_request().unwrap();
        assert_eq!(seen.model.as_deref(), Some("deepseek-chat"));
        assert_eq!(seen.system.as_deref(), Some("be brief"));
    }

    #[tokio::test]
    async fn gateway_failure_degrades_to_none() {
        let provider = Arc::new(MockProvider::new("deepseek").failing());
        let gateway = LlmGateway::new(provider);
        let reply = gateway
            .call(None, CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await;
        assert!(reply.is_none());
    }
}
