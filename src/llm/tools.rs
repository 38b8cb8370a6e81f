//! Tool catalog
//!
//! The built-in crypto tools exposed to the model, with their JSON-Schema
//! input declarations. Schemas are forwarded to providers verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A tool the model may call. `input_schema` is an opaque JSON-Schema blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The outcome of executing one tool call, keyed back to the call id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

/// How the model may use the tool catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    #[default]
    Auto,
    None,
    Force,
}

/// Tool-choice directive. `name` is required when mode is `Force`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolChoice {
    pub mode: ToolChoiceMode,
    pub name: Option<String>,
}

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// The standard crypto tool catalog for the agent.
pub fn crypto_tools() -> Vec<Tool> {
    vec![
        tool(
            "get_balances",
            "Get native token balances for an address across multiple chains",
            json!({
                "type": "object",
                "properties": {
                    "address": {
                        "type": "string",
                        "description": "Ethereum address to check (0x...)"
                    },
                    "chains": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of chains to query (e.g., ethereum, base, arbitrum)"
                    }
                },
                "required": ["address"]
            }),
        ),
        tool(
            "get_token_balance",
            "Get the balance of a specific ERC20 token",
            json!({
                "type": "object",
                "properties": {
                    "address": {"type": "string", "description": "Wallet address to check"},
                    "token": {"type": "string", "description": "Token contract address"},
                    "chain": {"type": "string", "description": "Chain name (e.g., ethereum, base)"}
                },
                "required": ["address", "token", "chain"]
            }),
        ),
        tool(
            "list_wallets",
            "List all wallets in the local keystore",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "get_chain_info",
            "Get information about a specific chain (chain ID, native currency, etc.)",
            json!({
                "type": "object",
                "properties": {
                    "chain": {"type": "string", "description": "Chain name (e.g., ethereum, base, arbitrum)"}
                },
                "required": ["chain"]
            }),
        ),
        tool(
            "list_chains",
            "List all supported chains",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "send_native",
            "Send native tokens on an EVM chain with safety checks and confirmation",
            json!({
                "type": "object",
                "properties": {
                    "from": {"type": "string", "description": "Sender address (0x...), defaults to first keystore account"},
                    "to": {"type": "string", "description": "Recipient address (0x...)"},
                    "chain": {"type": "string", "description": "Chain name, e.g., ethereum, base, arbitrum, optimism, polygon"},
                    "amount_eth": {"type": "string", "description": "Amount in ETH (decimal string)"},
                    "password": {"type": "string", "description": "Keystore password for the from account"},
                    "confirm": {"type": "boolean", "description": "Set true to broadcast after preview", "default": false},
                    "wait": {"type": "boolean", "description": "Wait for receipt (default true)", "default": true}
                },
                "required": ["to", "chain", "amount_eth"]
            }),
        ),
        tool(
            "send_token",
            "Send ERC20 tokens on an EVM chain with safety checks and confirmation",
            json!({
                "type": "object",
                "properties": {
                    "from": {"type": "string", "description": "Sender address (0x...), defaults to first keystore account"},
                    "to": {"type": "string", "description": "Recipient address (0x...)"},
                    "token": {"type": "string", "description": "ERC20 contract address"},
                    "chain": {"type": "string", "description": "Chain name, e.g., ethereum, base"},
                    "amount_tokens": {"type": "string", "description": "Token amount in human-readable units"},
                    "password": {"type": "string", "description": "Keystore password for the from account"},
                    "confirm": {"type": "boolean", "description": "Set true to broadcast after preview", "default": false},
                    "wait": {"type": "boolean", "description": "Wait for receipt (default true)", "default": true}
                },
                "required": ["to", "token", "chain", "amount_tokens"]
            }),
        ),
        tool(
            "approve_token",
            "Approve ERC20 spend for a spender",
            json!({
                "type": "object",
                "properties": {
                    "from": {"type": "string", "description": "Owner address (0x...), defaults to first keystore account"},
                    "spender": {"type": "string", "description": "Spender address (0x...)"},
                    "token": {"type": "string", "description": "ERC20 contract address"},
                    "chain": {"type": "string", "description": "Chain name, e.g., ethereum, base"},
                    "amount_tokens": {"type": "string", "description": "Allowance amount in human-readable units"},
                    "password": {"type": "string", "description": "Keystore password"},
                    "confirm": {"type": "boolean", "description": "Set true to broadcast after preview", "default": false},
                    "wait": {"type": "boolean", "description": "Wait for receipt (default true)", "default": true}
                },
                "required": ["spender", "token", "chain", "amount_tokens"]
            }),
        ),
        tool(
            "get_receipt",
            "Get a transaction receipt (cached when available) for an EVM chain",
            json!({
                "type": "object",
                "properties": {
                    "chain": {"type": "string", "description": "Chain name, e.g., ethereum, base"},
                    "tx_hash": {"type": "string", "description": "Transaction hash (0x...)"}
                },
                "required": ["chain", "tx_hash"]
            }),
        ),
        tool(
            "wait_receipt",
            "Wait for a transaction to be mined and return its receipt",
            json!({
                "type": "object",
                "properties": {
                    "chain": {"type": "string", "description": "Chain name, e.g., ethereum, base"},
                    "tx_hash": {"type": "string", "description": "Transaction hash (0x...)"},
                    "timeout_sec": {"type": "integer", "description": "Timeout in seconds (default 120)", "default": 120}
                },
                "required": ["chain", "tx_hash"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique_and_complete() {
        let tools = crypto_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();

        for expected in [
            "get_balances",
            "get_token_balance",
            "list_wallets",
            "get_chain_info",
            "list_chains",
            "send_native",
            "send_token",
            "approve_token",
            "get_receipt",
            "wait_receipt",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }

        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        let tools = crypto_tools();
        let send = tools.iter().find(|t| t.name == "send_native").unwrap();
        let required = send.input_schema["required"].as_array().unwrap();
        let required: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(required, vec!["to", "chain", "amount_eth"]);
    }
}
