//! Google Gemini provider
//!
//! Uses the `generateContent` REST endpoint. The system prompt rides as
//! `systemInstruction`, tools as function declarations (Gemini accepts a
//! JSON-Schema subset), and tool results as function-response parts. Gemini
//! has no tool-call ids, so the function name doubles as the id.

use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

use super::{
    validate_model_id, ChatRequest, ChatResponse, Model, Provider, ProviderId, Role, Tool,
    ToolCall, ToolChoice, ToolChoiceMode, ToolResult, Usage,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini's model catalog.
pub fn gemini_models() -> Vec<Model> {
    let model = |id: &str, name: &str, window: u32, input: f64, output: f64| Model {
        id: id.to_string(),
        name: name.to_string(),
        context_window: window,
        input_cost: input,
        output_cost: output,
        supports_tools: true,
    };
    vec![
        model("gemini-2.0-flash", "Gemini 2.0 Flash", 1_000_000, 0.10, 0.40),
        model("gemini-1.5-pro", "Gemini 1.5 Pro", 2_000_000, 1.25, 5.0),
        model("gemini-1.5-flash", "Gemini 1.5 Flash", 1_000_000, 0.075, 0.30),
    ]
}

pub struct GeminiProvider {
    api_key: String,
    models: Vec<Model>,
    model: Mutex<String>,
    http: Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        if api_key.is_empty() {
            bail!("API key is required");
        }
        Ok(Self {
            api_key,
            models: gemini_models(),
            model: Mutex::new(model.unwrap_or_else(|| DEFAULT_MODEL.to_string())),
            http: Client::new(),
        })
    }

    async fn send(&self, model: &str, body: Value) -> Result<ChatResponse> {
        let url = format!("{GEMINI_BASE_URL}/models/{model}:generateContent");
        let resp = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("generateContent request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("generateContent failed: {}: {}", status.as_u16(), text);
        }

        let data: Value = resp
            .json()
            .await
            .context("failed to parse generateContent response")?;
        parse_candidates(&data)
    }

    fn active_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.model.lock().unwrap().clone())
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn name(&self) -> &str {
        "Google Gemini"
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
        let model = self.active_model(req);
        self.send(&model, build_generate_body(req, None, None)).await
    }

    async fn chat_with_tool_results(
        &self,
        req: &ChatRequest,
        tool_calls: &[ToolCall],
        tool_results: &[ToolResult],
    ) -> Result<ChatResponse> {
        let model = self.active_model(req);
        self.send(&model, build_generate_body(req, Some(tool_calls), Some(tool_results)))
            .await
    }
}

/// Build a `generateContent` request body. Pure for translation-rule tests.
fn build_generate_body(
    req: &ChatRequest,
    tool_calls: Option<&[ToolCall]>,
    tool_results: Option<&[ToolResult]>,
) -> Value {
    let mut contents: Vec<Value> = req
        .messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            json!({"role": role, "parts": [{"text": msg.content}]})
        })
        .collect();

    if let Some(calls) = tool_calls {
        if !calls.is_empty() {
            let parts: Vec<Value> = calls
                .iter()
                .map(|tc| json!({"functionCall": {"name": tc.name, "args": tc.input}}))
                .collect();
            contents.push(json!({"role": "model", "parts": parts}));
        }
    }

    if let Some(results) = tool_results {
        if !results.is_empty() {
            let parts: Vec<Value> = results
                .iter()
                .map(|result| {
                    json!({
                        "functionResponse": {
                            "name": result.tool_use_id,
                            "response": {"result": result.content},
                        }
                    })
                })
                .collect();
            contents.push(json!({"role": "user", "parts": parts}));
        }
    }

    let mut body = json!({"contents": contents});

    if !req.system_prompt.is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": req.system_prompt}]});
    }

    if !req.tools.is_empty() {
        let declarations: Vec<Value> = req.tools.iter().map(function_declaration).collect();
        body["tools"] = json!([{"functionDeclarations": declarations}]);
        if let Some(mode) = map_tool_choice(&req.tool_choice) {
            body["toolConfig"] = mode;
        }
    }

    body
}

fn function_declaration(tool: &Tool) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": convert_schema(&tool.input_schema),
    })
}

fn map_tool_choice(choice: &ToolChoice) -> Option<Value> {
    match choice.mode {
        ToolChoiceMode::Auto => None, // vendor default
        ToolChoiceMode::None => Some(json!({"functionCallingConfig": {"mode": "NONE"}})),
        ToolChoiceMode::Force => {
            let name = choice.name.as_deref()?;
            Some(json!({
                "functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [name]}
            }))
        }
    }
}

/// Convert a JSON-Schema object to the subset Gemini accepts: type,
/// description, properties, required. Unsupported keywords are dropped.
fn convert_schema(schema: &Value) -> Value {
    let mut out = Map::new();

    if let Some(ty) = schema["type"].as_str() {
        out.insert("type".into(), json!(ty.to_uppercase()));
    }
    if let Some(desc) = schema["description"].as_str() {
        out.insert("description".into(), json!(desc));
    }
    if let Some(items) = schema.get("items") {
        if items.is_object() {
            out.insert("items".into(), convert_schema(items));
        }
    }
    if let Some(props) = schema["properties"].as_object() {
        let converted: Map<String, Value> = props
            .iter()
            .map(|(name, prop)| (name.clone(), convert_schema(prop)))
            .collect();
        out.insert("properties".into(), Value::Object(converted));
    }
    if let Some(required) = schema.get("required") {
        if required.is_array() {
            out.insert("required".into(), required.clone());
        }
    }

    Value::Object(out)
}

fn parse_candidates(data: &Value) -> Result<ChatResponse> {
    let candidate = data["candidates"]
        .get(0)
        .context("no candidates in response")?;

    let mut response = ChatResponse {
        stop_reason: candidate["finishReason"].as_str().unwrap_or_default().to_string(),
        usage: Usage {
            input_tokens: data["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
            output_tokens: data["usageMetadata"]["candidatesTokenCount"]
                .as_u64()
                .unwrap_or(0),
        },
        ..Default::default()
    };

    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                response.content = text.to_string();
            } else if let Some(call) = part.get("functionCall") {
                let name = call["name"].as_str().unwrap_or_default().to_string();
                response.tool_calls.push(ToolCall {
                    id: name.clone(),
                    name,
                    input: call["args"].clone(),
                });
            }
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{crypto_tools, Message};

    #[test]
    fn test_assistant_maps_to_model_role() {
        let req = ChatRequest {
            system_prompt: "be brief".into(),
            messages: vec![Message::user("hi"), Message::assistant("hello")],
            ..Default::default()
        };
        let body = build_generate_body(&req, None, None);
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
    }

    #[test]
    fn test_tool_results_become_function_response_parts() {
        let req = ChatRequest {
            messages: vec![Message::user("chains?")],
            tools: crypto_tools(),
            ..Default::default()
        };
        let calls = vec![ToolCall {
            id: "list_chains".into(),
            name: "list_chains".into(),
            input: json!({}),
        }];
        let results = vec![ToolResult {
            tool_use_id: "list_chains".into(),
            content: "ethereum, base".into(),
            is_error: false,
        }];

        let body = build_generate_body(&req, Some(&calls), Some(&results));
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "list_chains");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["name"],
            "list_chains"
        );
    }

    #[test]
    fn test_schema_conversion_keeps_supported_subset() {
        let schema = json!({
            "type": "object",
            "properties": {
                "address": {"type": "string", "description": "0x..."},
                "chains": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["address"],
            "additionalProperties": false
        });
        let converted = convert_schema(&schema);
        assert_eq!(converted["type"], "OBJECT");
        assert_eq!(converted["properties"]["address"]["type"], "STRING");
        assert_eq!(converted["properties"]["chains"]["items"]["type"], "STRING");
        assert_eq!(converted["required"][0], "address");
        assert!(converted.get("additionalProperties").is_none());
    }

    #[test]
    fn test_parse_candidates_uses_name_as_call_id() {
        let data = json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "get_balances", "args": {"address": "0xabc"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 2}
        });
        let resp = parse_candidates(&data).unwrap();
        assert_eq!(resp.tool_calls[0].id, "get_balances");
        assert_eq!(resp.tool_calls[0].input["address"], "0xabc");
        assert_eq!(resp.usage.output_tokens, 2);
    }
}
