//! Anthropic provider
//!
//! Talks to the Messages API directly. The system prompt is delivered
//! out-of-band, tool results travel as `tool_result` content blocks inside
//! a user message, and tool calls come back as `tool_use` blocks.

use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{
    validate_model_id, ChatRequest, ChatResponse, Model, Provider, ProviderId, Role, Tool,
    ToolCall, ToolChoice, ToolChoiceMode, ToolResult, Usage,
};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic's model catalog.
pub fn anthropic_models() -> Vec<Model> {
    let model = |id: &str, name: &str, input: f64, output: f64| Model {
        id: id.to_string(),
        name: name.to_string(),
        context_window: 200_000,
        input_cost: input,
        output_cost: output,
        supports_tools: true,
    };
    vec![
        model("claude-sonnet-4-20250514", "Claude Sonnet 4", 3.0, 15.0),
        model("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet", 3.0, 15.0),
        model("claude-3-5-haiku-20241022", "Claude 3.5 Haiku", 0.80, 4.0),
        model("claude-3-opus-20240229", "Claude 3 Opus", 15.0, 75.0),
    ]
}

pub struct AnthropicProvider {
    api_key: String,
    models: Vec<Model>,
    model: Mutex<String>,
    http: Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        if api_key.is_empty() {
            bail!("API key is required");
        }
        Ok(Self {
            api_key,
            models: anthropic_models(),
            model: Mutex::new(model.unwrap_or_else(|| DEFAULT_MODEL.to_string())),
            http: Client::new(),
        })
    }

    async fn send(&self, body: Value) -> Result<ChatResponse> {
        let url = format!("{ANTHROPIC_BASE_URL}/v1/messages");
        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("message request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("message request failed: {}: {}", status.as_u16(), text);
        }

        let data: Value = resp.json().await.context("failed to parse message response")?;
        Ok(parse_message(&data))
    }

    fn active_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.model.lock().unwrap().clone())
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn name(&self) -> &str {
        "Anthropic"
    }

    fn models(&self) -> &[Model] {
        &self.models
    }

    fn default_model(&self) -> String {
        self.model.lock().unwrap().clone()
    }

    fn set_model(&self, model_id: &str) -> Result<()> {
        validate_model_id(model_id, &self.models)?;
        *self.model.lock().unwrap() = model_id.to_string();
        Ok(())
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.send(build_message_body(&self.active_model(req), req, None, None))
            .await
    }

    async fn chat_with_tool_results(
        &self,
        req: &ChatRequest,
        tool_calls: &[ToolCall],
        tool_results: &[ToolResult],
    ) -> Result<ChatResponse> {
        self.send(build_message_body(
            &self.active_model(req),
            req,
            Some(tool_calls),
            Some(tool_results),
        ))
        .await
    }
}

/// Build a Messages API request body. Pure for translation-rule tests.
fn build_message_body(
    model: &str,
    req: &ChatRequest,
    tool_calls: Option<&[ToolCall]>,
    tool_results: Option<&[ToolResult]>,
) -> Value {
    let mut messages: Vec<Value> = req
        .messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            json!({"role": role, "content": [{"type": "text", "text": msg.content}]})
        })
        .collect();

    // Continuation after tool execution: one assistant message of tool_use
    // blocks, then one user message of tool_result blocks.
    if let Some(calls) = tool_calls {
        if !calls.is_empty() {
            let blocks: Vec<Value> = calls
                .iter()
                .map(|tc| {
                    json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": tc.input,
                    })
                })
                .collect();
            messages.push(json!({"role": "assistant", "content": blocks}));
        }
    }

    if let Some(results) = tool_results {
        if !results.is_empty() {
            let blocks: Vec<Value> = results
                .iter()
                .map(|result| {
                    json!({
                        "type": "tool_result",
                        "tool_use_id": result.tool_use_id,
                        "content": result.content,
                        "is_error": result.is_error,
                    })
                })
                .collect();
            messages.push(json!({"role": "user", "content": blocks}));
        }
    }

    let mut body = json!({
        "model": model,
        "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": messages,
    });

    if !req.system_prompt.is_empty() {
        body["system"] = json!(req.system_prompt);
    }

    if !req.tools.is_empty() {
        body["tools"] = Value::Array(req.tools.iter().map(tool_definition).collect());
        if let Some(tc) = map_tool_choice(&req.tool_choice) {
            body["tool_choice"] = tc;
        }
    }

    body
}

fn tool_definition(tool: &Tool) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

fn map_tool_choice(choice: &ToolChoice) -> Option<Value> {
    match choice.mode {
        ToolChoiceMode::Auto => None, // vendor default
        ToolChoiceMode::None => Some(json!({"type": "none"})),
        ToolChoiceMode::Force => {
            let name = choice.name.as_deref()?;
            Some(json!({"type": "tool", "name": name}))
        }
    }
}

fn parse_message(data: &Value) -> ChatResponse {
    let mut response = ChatResponse {
        stop_reason: data["stop_reason"].as_str().unwrap_or_default().to_string(),
        usage: Usage {
            input_tokens: data["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0),
        },
        ..Default::default()
    };

    if let Some(blocks) = data["content"].as_array() {
        for block in blocks {
            match block["type"].as_str().unwrap_or_default() {
                "text" => {
                    if let Some(text) = block["text"].as_str() {
                        response.content = text.to_string();
                    }
                }
                "tool_use" => {
                    response.tool_calls.push(ToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        input: block["input"].clone(),
                    });
                }
                _ => {}
            }
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{crypto_tools, Message};

    #[test]
    fn test_system_prompt_rides_out_of_band() {
        let req = ChatRequest {
            system_prompt: "be brief".into(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let body = build_message_body("claude-3-5-sonnet-20241022", &req, None, None);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_tool_results_become_user_blocks() {
        let req = ChatRequest {
            messages: vec![Message::user("balance?")],
            tools: crypto_tools(),
            ..Default::default()
        };
        let calls = vec![ToolCall {
            id: "toolu_1".into(),
            name: "get_balances".into(),
            input: json!({"address": "0xabc"}),
        }];
        let results = vec![ToolResult {
            tool_use_id: "toolu_1".into(),
            content: "1.0 ETH".into(),
            is_error: false,
        }];

        let body = build_message_body("claude-3-5-sonnet-20241022", &req, Some(&calls), Some(&results));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);

        let assistant = &messages[1];
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["content"][0]["type"], "tool_use");
        assert_eq!(assistant["content"][0]["id"], "toolu_1");

        let user = &messages[2];
        assert_eq!(user["role"], "user");
        assert_eq!(user["content"][0]["type"], "tool_result");
        assert_eq!(user["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_forced_tool_choice() {
        let choice = ToolChoice {
            mode: ToolChoiceMode::Force,
            name: Some("list_chains".into()),
        };
        let mapped = map_tool_choice(&choice).unwrap();
        assert_eq!(mapped["type"], "tool");
        assert_eq!(mapped["name"], "list_chains");
        assert!(map_tool_choice(&ToolChoice::default()).is_none());
    }

    #[test]
    fn test_parse_message_splits_text_and_tool_use() {
        let data = json!({
            "content": [
                {"type": "text", "text": "checking"},
                {"type": "tool_use", "id": "toolu_9", "name": "list_wallets", "input": {}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 3}
        });
        let resp = parse_message(&data);
        assert_eq!(resp.content, "checking");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "list_wallets");
        assert_eq!(resp.stop_reason, "tool_use");
        assert_eq!(resp.usage.input_tokens, 12);
    }
}
