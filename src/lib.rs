//! clifi -- terminal-first crypto operator agent
//!
//! An LLM-planned agent over EVM chains: natural-language requests expand
//! into tool calls against live RPCs and a local encrypted keystore, with
//! an explicit preview/confirm gate in front of anything that signs.

pub mod agent;
pub mod auth;
pub mod chain;
pub mod cli;
pub mod config;
pub mod llm;
pub mod tx;
pub mod wallet;
