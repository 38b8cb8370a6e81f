//! LLM provider abstraction
//!
//! A provider-agnostic chat contract implemented by every vendor adapter.
//! The OpenAI-compatible family (OpenAI, Venice, Copilot, OpenRouter) shares
//! one adapter parameterized by base URL and model catalog; Anthropic and
//! Gemini have their own wire formats.

pub mod anthropic;
pub mod capabilities;
pub mod gemini;
pub mod openai;
pub mod tools;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use tools::{crypto_tools, Tool, ToolChoice, ToolChoiceMode, ToolResult};

/// Unique identifier for an LLM vendor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Anthropic,
    Openai,
    Venice,
    Copilot,
    Gemini,
    Openrouter,
}

impl ProviderId {
    /// All known provider ids, in connection-priority order.
    pub fn all() -> [ProviderId; 6] {
        [
            ProviderId::Anthropic,
            ProviderId::Openai,
            ProviderId::Openrouter,
            ProviderId::Copilot,
            ProviderId::Gemini,
            ProviderId::Venice,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::Openai => "openai",
            ProviderId::Venice => "venice",
            ProviderId::Copilot => "copilot",
            ProviderId::Gemini => "gemini",
            ProviderId::Openrouter => "openrouter",
        }
    }

    /// The environment variable holding the API key for this provider.
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "ANTHROPIC_API_KEY",
            ProviderId::Openai => "OPENAI_API_KEY",
            ProviderId::Venice => "VENICE_API_KEY",
            ProviderId::Copilot => "GITHUB_TOKEN",
            ProviderId::Gemini => "GOOGLE_API_KEY",
            ProviderId::Openrouter => "OPENROUTER_API_KEY",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(ProviderId::Anthropic),
            "openai" => Ok(ProviderId::Openai),
            "venice" => Ok(ProviderId::Venice),
            "copilot" => Ok(ProviderId::Copilot),
            "gemini" => Ok(ProviderId::Gemini),
            "openrouter" => Ok(ProviderId::Openrouter),
            other => Err(LlmError::UnknownProvider(other.to_string())),
        }
    }
}

/// LLM-domain errors that callers need to distinguish.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("provider does not support tool results")]
    ToolResultsUnsupported,
}

/// An entry in a provider's static model catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub context_window: u32,
    /// USD per 1M input tokens.
    pub input_cost: f64,
    /// USD per 1M output tokens.
    pub output_cost: f64,
    pub supports_tools: bool,
}

/// Conversation message role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A visible conversation message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A tool call issued by the model. `input` is opaque JSON forwarded
/// verbatim to the handler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Provider-agnostic chat request.
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub tool_choice: ToolChoice,
    /// Overrides the provider's active model when set.
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

/// Provider-agnostic chat response.
#[derive(Clone, Debug, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// Vendor-opaque stop reason string.
    pub stop_reason: String,
    pub usage: Usage,
}

/// Token usage reported by the provider.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Contract implemented by every vendor adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn name(&self) -> &str;

    /// Static model catalog for this provider.
    fn models(&self) -> &[Model];

    /// The currently active model id.
    fn default_model(&self) -> String;

    /// Switch the active model. Fails with `UnknownModel` when the id is
    /// not in the static catalog.
    fn set_model(&self, model_id: &str) -> Result<()>;

    fn supports_tools(&self) -> bool {
        true
    }

    /// Send the conversation and return the model's response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Continue the conversation after tool execution. Adapters append the
    /// assistant tool-call message and one result message per
    /// `tool_use_id`, in the vendor's wire format.
    async fn chat_with_tool_results(
        &self,
        req: &ChatRequest,
        tool_calls: &[ToolCall],
        tool_results: &[ToolResult],
    ) -> Result<ChatResponse>;
}

/// Validate a model id against a catalog.
pub fn validate_model_id(model_id: &str, models: &[Model]) -> Result<(), LlmError> {
    if models.iter().any(|m| m.id == model_id) {
        Ok(())
    } else {
        Err(LlmError::UnknownModel(model_id.to_string()))
    }
}
