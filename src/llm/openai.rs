//! OpenAI-compatible provider family
//!
//! One adapter serves every vendor speaking the chat-completions dialect:
//! OpenAI itself, Venice, GitHub Copilot, and OpenRouter. Each is a thin
//! constructor supplying a base URL, a model catalog, and a default model.
//!
//! Requests stream by default (SSE) and are reassembled into a single
//! response; a streaming failure falls back to one non-streaming attempt.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    validate_model_id, ChatRequest, ChatResponse, Model, Provider, ProviderId, Role, Tool,
    ToolCall, ToolChoice, ToolChoiceMode, ToolResult, Usage,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const VENICE_BASE_URL: &str = "https://api.venice.ai/api/v1";
const COPILOT_BASE_URL: &str = "https://api.githubcopilot.com";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Chat adapter for OpenAI-compatible APIs.
pub struct OpenAiCompatProvider {
    id: ProviderId,
    name: &'static str,
    base_url: String,
    api_key: String,
    models: Vec<Model>,
    model: Mutex<String>,
    stream: bool,
    http: Client,
}

fn model(id: &str, name: &str, window: u32, input: f64, output: f64, tools: bool) -> Model {
    Model {
        id: id.to_string(),
        name: name.to_string(),
        context_window: window,
        input_cost: input,
        output_cost: output,
        supports_tools: tools,
    }
}

/// OpenAI's model catalog.
pub fn openai_models() -> Vec<Model> {
    vec![
        model("gpt-4o", "GPT-4o", 128_000, 2.50, 10.0, true),
        model("gpt-4o-mini", "GPT-4o Mini", 128_000, 0.15, 0.60, true),
        model("gpt-4-turbo", "GPT-4 Turbo", 128_000, 10.0, 30.0, true),
        model("gpt-3.5-turbo", "GPT-3.5 Turbo", 16_385, 0.50, 1.50, true),
    ]
}

/// Venice's model catalog. Venice bills in its own credits.
pub fn venice_models() -> Vec<Model> {
    vec![
        model("llama-3.3-70b", "Llama 3.3 70B", 128_000, 0.0, 0.0, true),
        model("llama-3.1-405b", "Llama 3.1 405B", 128_000, 0.0, 0.0, true),
        model("deepseek-r1-671b", "DeepSeek R1", 64_000, 0.0, 0.0, false),
    ]
}

/// Copilot's model catalog. Usage is included in the subscription.
pub fn copilot_models() -> Vec<Model> {
    vec![
        model("gpt-4o", "GPT-4o (Copilot)", 128_000, 0.0, 0.0, true),
        model("claude-3.5-sonnet", "Claude 3.5 Sonnet (Copilot)", 200_000, 0.0, 0.0, true),
    ]
}

/// Popular OpenRouter models. The live list is much larger; unknown ids are
/// resolved through the capability cache.
pub fn openrouter_models() -> Vec<Model> {
    vec![
        model("anthropic/claude-sonnet-4", "Claude Sonnet 4", 200_000, 3.0, 15.0, true),
        model("openai/gpt-4o", "GPT-4o", 128_000, 2.50, 10.0, true),
        model("google/gemini-2.5-pro-preview", "Gemini 2.5 Pro", 1_000_000, 1.25, 10.0, true),
        model("deepseek/deepseek-r1", "DeepSeek R1", 64_000, 0.55, 2.19, false),
    ]
}

impl OpenAiCompatProvider {
    fn new(
        id: ProviderId,
        name: &'static str,
        base_url: &str,
        api_key: String,
        models: Vec<Model>,
        default_model: &str,
        model_override: Option<String>,
    ) -> Result<Self> {
        if api_key.is_empty() {
            bail!("API key is required");
        }
        let active = model_override.unwrap_or_else(|| default_model.to_string());
        Ok(Self {
            id,
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            models,
            model: Mutex::new(active),
            stream: true,
            http: Client::new(),
        })
    }

    pub fn openai(api_key: String, model: Option<String>) -> Result<Self> {
        Self::new(
            ProviderId::Openai,
            "OpenAI",
            OPENAI_BASE_URL,
            api_key,
            openai_models(),
            "gpt-4o",
            model,
        )
    }

    pub fn venice(api_key: String, model: Option<String>) -> Result<Self> {
        Self::new(
            ProviderId::Venice,
            "Venice",
            VENICE_BASE_URL,
            api_key,
            venice_models(),
            "llama-3.3-70b",
            model,
        )
    }

    pub fn copilot(access_token: String, model: Option<String>) -> Result<Self> {
        Self::new(
            ProviderId::Copilot,
            "GitHub Copilot",
            COPILOT_BASE_URL,
            access_token,
            copilot_models(),
            "gpt-4o",
            model,
        )
    }

    pub fn openrouter(api_key: String, model: Option<String>) -> Result<Self> {
        Self::new(
            ProviderId::Openrouter,
            "OpenRouter",
            OPENROUTER_BASE_URL,
            api_key,
            openrouter_models(),
            "anthropic/claude-sonnet-4",
            model,
        )
    }

    fn active_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.model.lock().unwrap().clone())
    }

    async fn complete(&self, body: Value) -> Result<ChatResponse> {
        if self.stream {
            match self.stream_chat(&body).await {
                Ok(resp) => return Ok(resp),
                Err(err) => debug!("streaming failed, retrying non-streaming: {err:#}"),
            }
        }
        self.plain_chat(&body).await
    }

    async fn plain_chat(&self, body: &Value) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("chat completion failed: {}: {}", status.as_u16(), text);
        }

        let data: Value = resp
            .json()
            .await
            .context("failed to parse chat completion response")?;
        parse_completion(&data)
    }

    async fn stream_chat(&self, body: &Value) -> Result<ChatResponse> {
        let mut body = body.clone();
        body["stream"] = json!(true);
        body["stream_options"] = json!({"include_usage": true});

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("streaming chat request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("streaming chat failed: {}: {}", status.as_u16(), text);
        }

        let mut acc = StreamAccumulator::default();
        let mut buffer = String::new();
        let mut stream = resp.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("error reading stream")?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                let line = line.trim();
                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim();
                if payload == "[DONE]" {
                    break 'outer;
                }
                if let Ok(value) = serde_json::from_str::<Value>(payload) {
                    acc.push_chunk(&value);
                }
            }
        }

        Ok(acc.finish())
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn name(&self) -> &str {
        self.name
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
        let body = build_chat_body(&self.active_model(req), req, None, None);
        self.complete(body).await
    }

    async fn chat_with_tool_results(
        &self,
        req: &ChatRequest,
        tool_calls: &[ToolCall],
        tool_results: &[ToolResult],
    ) -> Result<ChatResponse> {
        let body = build_chat_body(
            &self.active_model(req),
            req,
            Some(tool_calls),
            Some(tool_results),
        );
        // Tool-result continuations are non-streaming; they are short
        // follow-ups and the simpler path keeps reassembly out of the loop.
        self.plain_chat(&body).await
    }
}

/// Build the chat-completions request body. Pure so translation rules are
/// testable without a live endpoint.
fn build_chat_body(
    model: &str,
    req: &ChatRequest,
    tool_calls: Option<&[ToolCall]>,
    tool_results: Option<&[ToolResult]>,
) -> Value {
    let mut messages: Vec<Value> = Vec::with_capacity(req.messages.len() + 2);

    // System prompt rides as the first system-role message on this dialect.
    if !req.system_prompt.is_empty() {
        messages.push(json!({"role": "system", "content": req.system_prompt}));
    }

    for msg in &req.messages {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(json!({"role": role, "content": msg.content}));
    }

    if let Some(calls) = tool_calls {
        if !calls.is_empty() {
            let tc_json: Vec<Value> = calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.input.to_string(),
                        }
                    })
                })
                .collect();
            messages.push(json!({"role": "assistant", "tool_calls": tc_json}));
        }
    }

    if let Some(results) = tool_results {
        for result in results {
            messages.push(json!({
                "role": "tool",
                "tool_call_id": result.tool_use_id,
                "content": result.content,
            }));
        }
    }

    let mut body = json!({
        "model": model,
        "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": messages,
    });

    if !req.tools.is_empty() {
        body["tools"] = Value::Array(req.tools.iter().map(tool_to_function).collect());
        if let Some(tc) = map_tool_choice(&req.tool_choice) {
            body["tool_choice"] = tc;
        }
    }

    body
}

fn tool_to_function(tool: &Tool) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

/// Translate the provider-agnostic tool choice. Callers only attach this
/// when tools are present in the request.
fn map_tool_choice(choice: &ToolChoice) -> Option<Value> {
    match choice.mode {
        ToolChoiceMode::Auto => Some(json!("auto")),
        ToolChoiceMode::None => Some(json!("none")),
        ToolChoiceMode::Force => {
            let name = choice.name.as_deref()?;
            Some(json!({"type": "function", "function": {"name": name}}))
        }
    }
}

/// Parse a non-streaming chat-completions response.
fn parse_completion(data: &Value) -> Result<ChatResponse> {
    let choice = data["choices"]
        .get(0)
        .context("no choices in chat completion response")?;
    let message = &choice["message"];

    let mut tool_calls = Vec::new();
    if let Some(tcs) = message["tool_calls"].as_array() {
        for tc in tcs {
            if tc["type"].as_str().unwrap_or("function") != "function" {
                continue;
            }
            let arguments = tc["function"]["arguments"].as_str().unwrap_or("{}");
            tool_calls.push(ToolCall {
                id: tc["id"].as_str().unwrap_or_default().to_string(),
                name: tc["function"]["name"].as_str().unwrap_or_default().to_string(),
                input: serde_json::from_str(arguments).unwrap_or(Value::Null),
            });
        }
    }

    Ok(ChatResponse {
        content: message["content"].as_str().unwrap_or_default().to_string(),
        tool_calls,
        stop_reason: choice["finish_reason"].as_str().unwrap_or_default().to_string(),
        usage: Usage {
            input_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        },
    })
}

/// Folds streamed completion chunks into one synthetic response: content
/// deltas concatenate, tool-call deltas merge by index, and the usage object
/// is taken from whichever chunk supplies one.
#[derive(Default)]
struct StreamAccumulator {
    content: String,
    tool_calls: BTreeMap<u64, PartialToolCall>,
    stop_reason: String,
    usage: Usage,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl StreamAccumulator {
    fn push_chunk(&mut self, chunk: &Value) {
        if let Some(usage) = chunk.get("usage") {
            if usage.is_object() {
                self.usage = Usage {
                    input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
                    output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
                };
            }
        }

        let Some(choice) = chunk["choices"].get(0) else {
            return;
        };

        if let Some(reason) = choice["finish_reason"].as_str() {
            self.stop_reason = reason.to_string();
        }

        let delta = &choice["delta"];
        if let Some(content) = delta["content"].as_str() {
            self.content.push_str(content);
        }

        if let Some(tcs) = delta["tool_calls"].as_array() {
            for tc in tcs {
                let index = tc["index"].as_u64().unwrap_or(0);
                let entry = self.tool_calls.entry(index).or_default();
                if let Some(id) = tc["id"].as_str() {
                    entry.id.push_str(id);
                }
                if let Some(name) = tc["function"]["name"].as_str() {
                    entry.name.push_str(name);
                }
                if let Some(args) = tc["function"]["arguments"].as_str() {
                    entry.arguments.push_str(args);
                }
            }
        }
    }

    fn finish(self) -> ChatResponse {
        let tool_calls = self
            .tool_calls
            .into_values()
            .map(|partial| ToolCall {
                id: partial.id,
                name: partial.name,
                input: serde_json::from_str(&partial.arguments).unwrap_or(Value::Null),
            })
            .collect();

        ChatResponse {
            content: self.content,
            tool_calls,
            stop_reason: self.stop_reason,
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{crypto_tools, Message};

    fn request_with_tools() -> ChatRequest {
        ChatRequest {
            system_prompt: "You are a test agent.".into(),
            messages: vec![Message::user("hello"), Message::assistant("hi")],
            tools: crypto_tools(),
            ..Default::default()
        }
    }

    #[test]
    fn test_system_prompt_is_first_system_message() {
        let body = build_chat_body("gpt-4o", &request_with_tools(), None, None);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You are a test agent.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
    }

    #[test]
    fn test_tool_results_threaded_in_order() {
        let calls = vec![ToolCall {
            id: "call_1".into(),
            name: "list_chains".into(),
            input: json!({}),
        }];
        let results = vec![ToolResult {
            tool_use_id: "call_1".into(),
            content: "Supported Chains: ...".into(),
            is_error: false,
        }];

        let body = build_chat_body("gpt-4o", &request_with_tools(), Some(&calls), Some(&results));
        let messages = body["messages"].as_array().unwrap();

        let assistant = &messages[messages.len() - 2];
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "list_chains");

        let tool = &messages[messages.len() - 1];
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
    }

    #[test]
    fn test_tool_choice_mapping() {
        assert_eq!(
            map_tool_choice(&ToolChoice::default()).unwrap(),
            json!("auto")
        );
        assert_eq!(
            map_tool_choice(&ToolChoice {
                mode: ToolChoiceMode::None,
                name: None
            })
            .unwrap(),
            json!("none")
        );
        let forced = map_tool_choice(&ToolChoice {
            mode: ToolChoiceMode::Force,
            name: Some("get_balances".into()),
        })
        .unwrap();
        assert_eq!(forced["function"]["name"], "get_balances");
        // Force without a name is dropped rather than sent malformed.
        assert!(map_tool_choice(&ToolChoice {
            mode: ToolChoiceMode::Force,
            name: None
        })
        .is_none());
    }

    #[test]
    fn test_tool_choice_omitted_without_tools() {
        let req = ChatRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let body = build_chat_body("gpt-4o", &req, None, None);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_stream_reassembly_merges_deltas() {
        let chunks = [
            json!({"choices": [{"delta": {"content": "Hel"}}]}),
            json!({"choices": [{"delta": {"content": "lo"}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_a", "function": {"name": "get_bal"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"name": "ances", "arguments": "{\"address\":"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"0xabc\"}"}}
            ]}, "finish_reason": "tool_calls"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 10, "completion_tokens": 5}}),
        ];

        let mut acc = StreamAccumulator::default();
        for chunk in &chunks {
            acc.push_chunk(chunk);
        }
        let resp = acc.finish();

        assert_eq!(resp.content, "Hello");
        assert_eq!(resp.stop_reason, "tool_calls");
        assert_eq!(resp.usage.input_tokens, 10);
        assert_eq!(resp.usage.output_tokens, 5);
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].id, "call_a");
        assert_eq!(resp.tool_calls[0].name, "get_balances");
        assert_eq!(resp.tool_calls[0].input["address"], "0xabc");
    }

    #[test]
    fn test_set_model_updates_default_model() {
        let provider = OpenAiCompatProvider::openai("sk-test".into(), None).unwrap();
        assert_eq!(provider.default_model(), "gpt-4o");

        provider.set_model("gpt-4o-mini").unwrap();
        assert_eq!(provider.default_model(), "gpt-4o-mini");

        assert!(provider.set_model("not-a-model").is_err());
        assert_eq!(provider.default_model(), "gpt-4o-mini");
    }

    #[test]
    fn test_parse_completion_extracts_tool_calls() {
        let data = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "list_wallets", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 42, "completion_tokens": 7}
        });

        let resp = parse_completion(&data).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "list_wallets");
        assert_eq!(resp.stop_reason, "tool_calls");
        assert_eq!(resp.usage.input_tokens, 42);
    }
}
