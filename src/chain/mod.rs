//! EVM chain access
//!
//! Named chain configurations, a failover-capable client pool, and ERC-20
//! read helpers.

pub mod client;
pub mod config;
pub mod erc20;

pub use client::ChainClient;
pub use config::{default_chains, ChainConfig};
pub use erc20::{decode_string, format_units, left_pad_32, NativeBalance, TokenBalance};
