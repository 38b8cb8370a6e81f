//! The agent core
//!
//! Orchestrator, tool registry, receipt store, session transcripts, and
//! redaction. The UI layers import this module and `llm` only.

pub mod orchestrator;
pub mod output;
pub mod receipts;
pub mod redact;
pub mod session_log;
pub mod tools;
pub mod tx_flow;

pub use orchestrator::{create_provider, Agent, AgentEvent, AgentEventKind, SYSTEM_PROMPT};
pub use output::{KvItem, ToolOutput, UiBlock, UiKv, UiTable};
pub use receipts::{ReceiptStore, StoredReceipt};
pub use redact::{redact_json_args, redact_value, REDACTED};
pub use session_log::{SessionLogger, SessionRecord};
pub use tools::ToolRegistry;
