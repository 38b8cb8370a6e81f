//! Tool output types
//!
//! Tools answer on two channels: `text` is the canonical string handed back
//! to the LLM, `blocks` a parallel structured payload the UI can render
//! without parsing prose.

use serde::{Deserialize, Serialize};

/// Dual-channel tool response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<UiBlock>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: Vec::new(),
        }
    }

    pub fn with_block(mut self, block: UiBlock) -> Self {
        self.blocks.push(block);
        self
    }
}

/// A structured rendering block.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UiBlock {
    Table(UiTable),
    Kv(UiKv),
}

/// Tabular data for list-like results.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UiTable {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl UiTable {
    pub fn new(title: &str, headers: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cells: &[String]) {
        self.rows.push(cells.to_vec());
    }
}

/// Key-value pairs for single-entity summaries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UiKv {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub items: Vec<KvItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KvItem {
    pub key: String,
    pub value: String,
}

impl UiKv {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            items: Vec::new(),
        }
    }

    pub fn item(&mut self, key: &str, value: impl Into<String>) {
        self.items.push(KvItem {
            key: key.to_string(),
            value: value.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_serialization_is_tagged() {
        let mut table = UiTable::new("Balances", &["Chain", "Balance"]);
        table.row(&["base".to_string(), "1.0 ETH".to_string()]);
        let json = serde_json::to_value(UiBlock::Table(table)).unwrap();
        assert_eq!(json["kind"], "table");
        assert_eq!(json["headers"][0], "Chain");
        assert_eq!(json["rows"][0][1], "1.0 ETH");

        let mut kv = UiKv::new("Chain");
        kv.item("Chain ID", "8453");
        let json = serde_json::to_value(UiBlock::Kv(kv)).unwrap();
        assert_eq!(json["kind"], "kv");
        assert_eq!(json["items"][0]["value"], "8453");
    }
}
