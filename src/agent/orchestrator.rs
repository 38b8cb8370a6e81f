//! Agent orchestrator
//!
//! Owns the conversation and runs the tool-call loop: send the
//! conversation, execute whatever tools the model asked for (sequentially,
//! in model order), thread the results back, repeat until the model stops
//! asking or the per-turn tool budget runs out. One mutex serializes every
//! state-mutating operation, so concurrent turns on the same agent queue up
//! rather than interleave.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Manager;
use crate::config;
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::gemini::GeminiProvider;
use crate::llm::openai::OpenAiCompatProvider;
use crate::llm::{
    capabilities, ChatRequest, Message, Provider, ProviderId, ToolResult,
};

use super::redact::redact_json_args;
use super::session_log::{SessionLogger, SessionRecord};
use super::tools::ToolRegistry;

/// Upper bound on tool calls within a single chat turn. Stops a model that
/// keeps asking for tools from looping forever.
const MAX_TOOL_CALLS_PER_TURN: usize = 8;

/// Default system prompt for the crypto operator agent.
pub const SYSTEM_PROMPT: &str = "You are clifi, a terminal-first crypto operator agent. You help users manage their crypto wallets and interact with EVM-compatible blockchains.

## Your Capabilities
- Query wallet balances across multiple chains (Ethereum, Base, Arbitrum, Optimism, Polygon)
- List and manage wallets in the local keystore
- Provide information about supported chains
- Send native tokens and ERC20 tokens, and approve ERC20 spenders, behind an explicit preview/confirm flow
- Fetch and wait for transaction receipts

## Safety-First Approach
- Always show users what actions you're about to take before executing
- For read-only operations (balances, info), proceed after confirming the request
- For state-changing operations (send, approve) you MUST:
  1. Call the tool without confirm to obtain a preview
  2. Show the user the exact parameters and costs
  3. Only re-invoke with confirm=true after the user explicitly agrees

## Response Style
- Be concise and direct
- Use clear formatting for balances and addresses
- When showing balances, include the chain name and token symbol
- If an error occurs, explain what went wrong and suggest fixes

Current limitations:
- EVM chains only (no Solana, Bitcoin, etc.)
- Native tokens and ERC20 tokens only";

/// Progress event kinds streamed to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    ToolCall,
    ToolResult,
    Content,
}

/// One progress event. Events arrive in wall-clock order; the last
/// `Content` event of a turn is the final answer.
#[derive(Clone, Debug, Serialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: AgentEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl AgentEvent {
    fn tool_call(tool: &str, args: &Value) -> Self {
        Self {
            kind: AgentEventKind::ToolCall,
            tool: Some(tool.to_string()),
            args: Some(args.clone()),
            content: None,
            is_error: false,
        }
    }

    fn tool_result(tool: &str, content: String, is_error: bool) -> Self {
        Self {
            kind: AgentEventKind::ToolResult,
            tool: Some(tool.to_string()),
            args: None,
            content: Some(content),
            is_error,
        }
    }

    fn content(content: String) -> Self {
        Self {
            kind: AgentEventKind::Content,
            tool: None,
            args: None,
            content: Some(content),
            is_error: false,
        }
    }

    fn error(content: String) -> Self {
        Self {
            kind: AgentEventKind::Content,
            tool: None,
            args: None,
            content: Some(content),
            is_error: true,
        }
    }
}

struct AgentInner {
    provider: Box<dyn Provider>,
    manager: Manager,
    registry: Arc<ToolRegistry>,
    system_prompt: String,
    conversation: Vec<Message>,
    session_log: Option<SessionLogger>,
}

/// The conversation-owning agent. All public operations serialize through
/// one async mutex.
pub struct Agent {
    inner: Mutex<AgentInner>,
}

impl Agent {
    /// Build an agent rooted at `~/.clifi`. When `provider_id` is `None`
    /// the stored default provider is used; if it cannot be constructed,
    /// the first connected provider wins.
    pub fn new(provider_id: Option<ProviderId>) -> Result<Self> {
        let data_dir = config::data_dir();
        Self::with_data_dir(data_dir, provider_id)
    }

    pub fn with_data_dir(data_dir: PathBuf, provider_id: Option<ProviderId>) -> Result<Self> {
        let manager = Manager::new(&data_dir)?;

        let target = provider_id.unwrap_or_else(|| manager.default_provider());
        let provider = match create_provider(&manager, target) {
            Ok(provider) => provider,
            Err(err) => {
                let connected = manager.list_connected();
                if connected.is_empty() {
                    return Err(err.context(
                        "no LLM providers connected. Run 'clifi auth connect <provider>' \
                         or set an API key environment variable",
                    ));
                }
                let mut fallback = None;
                for id in connected {
                    if let Ok(provider) = create_provider(&manager, id) {
                        fallback = Some(provider);
                        break;
                    }
                }
                match fallback {
                    Some(provider) => provider,
                    None => return Err(err.context("failed to initialize any LLM provider")),
                }
            }
        };

        let registry = Arc::new(ToolRegistry::new(&data_dir)?);

        let session_id = Uuid::new_v4().to_string();
        let session_log = match SessionLogger::open(&data_dir, &session_id) {
            Ok(logger) => Some(logger),
            Err(err) => {
                warn!("session logging disabled: {err:#}");
                None
            }
        };

        Ok(Self {
            inner: Mutex::new(AgentInner {
                provider,
                manager,
                registry,
                system_prompt: SYSTEM_PROMPT.to_string(),
                conversation: Vec::new(),
                session_log,
            }),
        })
    }

    /// Assemble an agent from parts. Used by tests and embedders that
    /// bring their own provider.
    pub fn from_parts(
        provider: Box<dyn Provider>,
        manager: Manager,
        registry: ToolRegistry,
        session_log: Option<SessionLogger>,
    ) -> Self {
        Self {
            inner: Mutex::new(AgentInner {
                provider,
                manager,
                registry: Arc::new(registry),
                system_prompt: SYSTEM_PROMPT.to_string(),
                conversation: Vec::new(),
                session_log,
            }),
        }
    }

    /// Run one chat turn and return the full event trace.
    pub async fn chat_with_events(&self, user_text: &str) -> Result<Vec<AgentEvent>> {
        let mut inner = self.inner.lock().await;
        inner.chat_turn(user_text).await
    }

    /// Run one chat turn and return only the final answer text.
    pub async fn chat(&self, user_text: &str) -> Result<String> {
        let events = self.chat_with_events(user_text).await?;
        Ok(events
            .iter()
            .rev()
            .find(|e| e.kind == AgentEventKind::Content && !e.is_error)
            .and_then(|e| e.content.clone())
            .unwrap_or_default())
    }

    /// Clear the conversation.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.conversation.clear();
    }

    /// Switch the active model. The conversation is cleared on success and
    /// untouched on failure.
    pub async fn set_model(&self, model_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.provider.set_model(model_id)?;
        inner.conversation.clear();
        Ok(())
    }

    /// Switch providers, re-resolving credentials. The prior provider stays
    /// active when construction fails; the conversation is cleared on
    /// success.
    pub async fn set_provider(&self, id: ProviderId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let provider = create_provider(&inner.manager, id)?;
        inner.provider = provider;
        inner.conversation.clear();
        Ok(())
    }

    /// Current (provider id, provider name, active model).
    pub async fn active_provider(&self) -> (ProviderId, String, String) {
        let inner = self.inner.lock().await;
        (
            inner.provider.id(),
            inner.provider.name().to_string(),
            inner.provider.default_model(),
        )
    }

    pub async fn close(&self) {
        let inner = self.inner.lock().await;
        if let Some(log) = &inner.session_log {
            log.close();
        }
    }
}

impl AgentInner {
    async fn chat_turn(&mut self, user_text: &str) -> Result<Vec<AgentEvent>> {
        self.conversation.push(Message::user(user_text));
        self.log_user(user_text);

        let model = self.provider.default_model();
        let mut events = Vec::new();

        // Degrade gracefully: a model known not to support tools gets a
        // tool-free request instead of a failing one.
        let openrouter_key = if self.provider.id() == ProviderId::Openrouter {
            self.manager.get_api_key(ProviderId::Openrouter).ok()
        } else {
            None
        };
        let (supports, known) = capabilities::supports_tools_for(
            self.provider.as_ref(),
            &model,
            openrouter_key.as_deref(),
        )
        .await;

        let tools = if known && !supports {
            let notice = format!(
                "Tools disabled for model {model}: it does not support tool calling. \
                 Answering from conversation context only."
            );
            self.log_content(&notice);
            events.push(AgentEvent::content(notice));
            Vec::new()
        } else {
            self.registry.tools().to_vec()
        };

        let request = ChatRequest {
            system_prompt: self.system_prompt.clone(),
            messages: self.conversation.clone(),
            tools,
            ..Default::default()
        };

        let mut response = self
            .provider
            .chat(&request)
            .await
            .context("failed to get response")?;

        let mut calls_used = 0usize;
        while !response.tool_calls.is_empty() {
            let tool_calls = std::mem::take(&mut response.tool_calls);
            let mut results = Vec::with_capacity(tool_calls.len());

            for tc in &tool_calls {
                if calls_used >= MAX_TOOL_CALLS_PER_TURN {
                    let notice = format!(
                        "Error: tool budget exhausted after {MAX_TOOL_CALLS_PER_TURN} calls; \
                         stopping this turn. Ask again to continue."
                    );
                    warn!("tool budget exhausted for model {model}");
                    self.log_content(&notice);
                    events.push(AgentEvent::error(notice));
                    return Ok(events);
                }
                calls_used += 1;

                info!("tool call: {}", tc.name);
                events.push(AgentEvent::tool_call(&tc.name, &tc.input));
                self.log_tool_call(&tc.name, &tc.input);

                match self.registry.execute(&tc.name, &tc.input).await {
                    Ok(output) => {
                        results.push(ToolResult {
                            tool_use_id: tc.id.clone(),
                            content: output.text.clone(),
                            is_error: false,
                        });
                        self.log_tool_result(&tc.name, &output.text, &output.blocks, false);
                        events.push(AgentEvent::tool_result(&tc.name, output.text, false));
                    }
                    Err(err) => {
                        let message = format!("Error: {err:#}");
                        results.push(ToolResult {
                            tool_use_id: tc.id.clone(),
                            content: message.clone(),
                            is_error: true,
                        });
                        self.log_tool_result(&tc.name, &message, &[], true);
                        events.push(AgentEvent::tool_result(&tc.name, message, true));
                    }
                }
            }

            response = self
                .provider
                .chat_with_tool_results(&request, &tool_calls, &results)
                .await
                .context("failed to continue conversation")?;
        }

        if !response.content.is_empty() {
            self.conversation.push(Message::assistant(&response.content));
            self.log_assistant(&response.content);
            events.push(AgentEvent::content(response.content));
        }

        Ok(events)
    }

    fn log_user(&self, content: &str) {
        if let Some(log) = &self.session_log {
            let mut record = SessionRecord::now("user");
            record.content = Some(content.to_string());
            log.log(&record);
        }
    }

    fn log_content(&self, content: &str) {
        if let Some(log) = &self.session_log {
            let mut record = SessionRecord::now("content");
            record.content = Some(content.to_string());
            log.log(&record);
        }
    }

    fn log_assistant(&self, content: &str) {
        if let Some(log) = &self.session_log {
            let mut record = SessionRecord::now("assistant");
            record.provider = Some(self.provider.id().to_string());
            record.model = Some(self.provider.default_model());
            record.content = Some(content.to_string());
            log.log(&record);
        }
    }

    fn log_tool_call(&self, tool: &str, args: &Value) {
        if let Some(log) = &self.session_log {
            let mut record = SessionRecord::now("tool_call");
            record.tool_name = Some(tool.to_string());
            record.args = Some(redact_json_args(&args.to_string()));
            log.log(&record);
        }
    }

    fn log_tool_result(
        &self,
        tool: &str,
        text: &str,
        blocks: &[super::output::UiBlock],
        is_error: bool,
    ) {
        if let Some(log) = &self.session_log {
            let mut record = SessionRecord::now("tool_result");
            record.tool_name = Some(tool.to_string());
            record.text = Some(text.to_string());
            record.blocks = blocks.to_vec();
            record.is_error = is_error;
            log.log(&record);
        }
    }
}

/// Construct a provider adapter for `id`, resolving its credential through
/// the manager.
pub fn create_provider(manager: &Manager, id: ProviderId) -> Result<Box<dyn Provider>> {
    let key = manager.get_api_key(id)?;

    let provider: Box<dyn Provider> = match id {
        ProviderId::Anthropic => Box::new(AnthropicProvider::new(key, None)?),
        ProviderId::Openai => Box::new(OpenAiCompatProvider::openai(key, None)?),
        ProviderId::Venice => Box::new(OpenAiCompatProvider::venice(key, None)?),
        ProviderId::Copilot => Box::new(OpenAiCompatProvider::copilot(key, None)?),
        ProviderId::Gemini => Box::new(GeminiProvider::new(key, None)?),
        ProviderId::Openrouter => Box::new(OpenAiCompatProvider::openrouter(key, None)?),
    };
    Ok(provider)
}
