//! Tool registry
//!
//! Named handlers for every tool in the catalog. Each handler parses and
//! validates its JSON input, talks to the chain through bounded operations,
//! and answers on both channels (LLM text + UI blocks). State-changing
//! handlers run the preview/confirm/broadcast protocol and never sign
//! without `confirm=true` and a password.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::chain::{format_units, left_pad_32, ChainClient};
use crate::llm::{crypto_tools, Tool};
use crate::tx::amounts::{parse_eth_to_wei, parse_units, wei_to_eth, wei_to_gwei};
use crate::tx::{self, Intent, Policy, SuggestedFees};
use crate::wallet::{KeystoreManager, WalletError};

use super::output::{ToolOutput, UiBlock, UiKv, UiTable};
use super::receipts::ReceiptStore;
use super::tx_flow;

/// Chains queried when `get_balances` gets no explicit list.
const DEFAULT_BALANCE_CHAINS: &[&str] = &["ethereum", "base", "arbitrum", "optimism", "polygon"];

/// Default receipt wait after a broadcast.
const DEFAULT_WAIT: Duration = Duration::from_secs(120);

/// ERC-20 transfer(address,uint256)
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// ERC-20 approve(address,uint256)
const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// Dispatches tool calls to their handlers. Handlers own no mutable state;
/// they borrow the chain client, keystore, and receipt store from here.
pub struct ToolRegistry {
    tools: Vec<Tool>,
    chain_client: Arc<ChainClient>,
    keystore: KeystoreManager,
    receipts: ReceiptStore,
}

impl ToolRegistry {
    /// Registry bound to a data directory for wallet and receipt
    /// persistence.
    pub fn new(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            tools: crypto_tools(),
            chain_client: Arc::new(ChainClient::new()),
            keystore: KeystoreManager::new(data_dir)?,
            receipts: ReceiptStore::open(data_dir)?,
        })
    }

    /// Registry with an in-memory receipt store; wallets still live under
    /// `data_dir`.
    pub fn ephemeral(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            tools: crypto_tools(),
            chain_client: Arc::new(ChainClient::new()),
            keystore: KeystoreManager::new(data_dir)?,
            receipts: ReceiptStore::open_in_memory()?,
        })
    }

    /// The tool catalog as sent to providers.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn chain_client(&self) -> Arc<ChainClient> {
        Arc::clone(&self.chain_client)
    }

    /// Execute a tool by name. Unknown names are an error before any
    /// parsing happens.
    pub async fn execute(&self, name: &str, input: &Value) -> Result<ToolOutput> {
        match name {
            "get_balances" => self.get_balances(input).await,
            "get_token_balance" => self.get_token_balance(input).await,
            "list_wallets" => self.list_wallets().await,
            "get_chain_info" => self.get_chain_info(input).await,
            "list_chains" => self.list_chains().await,
            "send_native" => self.send_native(input).await,
            "send_token" => self.send_token(input).await,
            "approve_token" => self.approve_token(input).await,
            "get_receipt" => self.get_receipt(input).await,
            "wait_receipt" => self.wait_receipt(input).await,
            _ => bail!("unknown tool: {name}"),
        }
    }

    // ── Read handlers ────────────────────────────────────────────────

    async fn get_balances(&self, input: &Value) -> Result<ToolOutput> {
        #[derive(Deserialize)]
        struct Input {
            address: String,
            #[serde(default)]
            chains: Vec<String>,
        }

        let params: Input = parse_input(input)?;
        let address = parse_address(&params.address, "address")?;

        let chains: Vec<String> = if params.chains.is_empty() {
            DEFAULT_BALANCE_CHAINS.iter().map(|s| s.to_string()).collect()
        } else {
            params.chains
        };

        // Validate every chain name before touching the network.
        for chain in &chains {
            self.chain_client
                .chain_config(chain)
                .await
                .map_err(|_| anyhow!("unknown chain: {chain}"))?;
        }

        let mut table = UiTable::new("Balances", &["Chain", "Balance"]);
        let mut lines = Vec::with_capacity(chains.len());

        for chain in &chains {
            match self.chain_client.native_balance(chain, address).await {
                Ok(balance) => {
                    let formatted =
                        format!("{} {}", format_units(balance.balance, balance.decimals), balance.symbol);
                    lines.push(format!("{chain}: {formatted}"));
                    table.row(&[chain.clone(), formatted]);
                }
                Err(err) => {
                    lines.push(format!("{chain}: error - {err:#}"));
                    table.row(&[chain.clone(), format!("error - {err:#}")]);
                }
            }
        }

        Ok(ToolOutput::text(format!(
            "Balances for {}:\n{}",
            params.address,
            lines.join("\n")
        ))
        .with_block(UiBlock::Table(table)))
    }

    async fn get_token_balance(&self, input: &Value) -> Result<ToolOutput> {
        #[derive(Deserialize)]
        struct Input {
            address: String,
            token: String,
            chain: String,
        }

        let params: Input = parse_input(input)?;
        let holder = parse_address(&params.address, "wallet address")?;
        let token = parse_address(&params.token, "token address")?;

        let balance = self
            .chain_client
            .token_balance(&params.chain, token, holder)
            .await?;

        let formatted = format_units(balance.balance, balance.decimals);
        let mut kv = UiKv::new("Token balance");
        kv.item("Chain", params.chain.clone());
        kv.item("Token", format!("{} ({})", balance.symbol, params.token));
        kv.item("Balance", format!("{formatted} {}", balance.symbol));

        Ok(ToolOutput::text(format!(
            "Token balance on {}:\n{} {} ({})",
            params.chain, formatted, balance.symbol, balance.name
        ))
        .with_block(UiBlock::Kv(kv)))
    }

    async fn list_wallets(&self) -> Result<ToolOutput> {
        let accounts = self.keystore.list_accounts();
        if accounts.is_empty() {
            return Ok(ToolOutput::text(
                "No wallets found. Use 'clifi wallet create' to create one.",
            ));
        }

        let mut table = UiTable::new("Wallets", &["#", "Address"]);
        let lines: Vec<String> = accounts
            .iter()
            .enumerate()
            .map(|(i, acc)| {
                table.row(&[(i + 1).to_string(), acc.address.to_string()]);
                format!("{}. {}", i + 1, acc.address)
            })
            .collect();

        Ok(ToolOutput::text(format!(
            "Found {} wallet(s):\n{}",
            accounts.len(),
            lines.join("\n")
        ))
        .with_block(UiBlock::Table(table)))
    }

    async fn get_chain_info(&self, input: &Value) -> Result<ToolOutput> {
        #[derive(Deserialize)]
        struct Input {
            chain: String,
        }

        let params: Input = parse_input(input)?;
        let config = self.chain_client.chain_config(&params.chain).await?;

        let mut kv = UiKv::new(&config.name);
        kv.item("Chain", params.chain.clone());
        kv.item("Chain ID", config.chain_id.to_string());
        kv.item("Native Currency", config.native_currency.clone());
        kv.item("Explorer", config.explorer_url.clone());
        kv.item("Testnet", config.is_testnet.to_string());

        Ok(ToolOutput::text(format!(
            "Chain: {}\nName: {}\nChain ID: {}\nNative Currency: {}\nExplorer: {}\nTestnet: {}",
            params.chain,
            config.name,
            config.chain_id,
            config.native_currency,
            config.explorer_url,
            config.is_testnet,
        ))
        .with_block(UiBlock::Kv(kv)))
    }

    async fn list_chains(&self) -> Result<ToolOutput> {
        let names = self.chain_client.list_chains().await;

        let mut mainnets = Vec::new();
        let mut testnets = Vec::new();
        let mut table = UiTable::new("Supported chains", &["Name", "Chain ID", "Network"]);

        for name in &names {
            let Ok(config) = self.chain_client.chain_config(name).await else {
                continue;
            };
            let entry = format!("- {} ({}, Chain ID: {})", name, config.name, config.chain_id);
            table.row(&[
                name.clone(),
                config.chain_id.to_string(),
                if config.is_testnet { "testnet" } else { "mainnet" }.to_string(),
            ]);
            if config.is_testnet {
                testnets.push(entry);
            } else {
                mainnets.push(entry);
            }
        }

        let mut text = format!("Supported Chains:\n\nMainnets:\n{}", mainnets.join("\n"));
        if !testnets.is_empty() {
            text.push_str(&format!("\n\nTestnets:\n{}", testnets.join("\n")));
        }

        Ok(ToolOutput::text(text).with_block(UiBlock::Table(table)))
    }

    // ── Signing handlers ─────────────────────────────────────────────

    async fn send_native(&self, input: &Value) -> Result<ToolOutput> {
        #[derive(Deserialize)]
        struct Input {
            #[serde(default)]
            from: String,
            to: String,
            chain: String,
            amount_eth: String,
            #[serde(default)]
            password: String,
            #[serde(default)]
            confirm: bool,
            wait: Option<bool>,
        }

        let params: Input = parse_input(input)?;
        let to = parse_address(&params.to, "recipient address")?;
        if params.chain.is_empty() {
            bail!("chain is required");
        }
        if params.amount_eth.is_empty() {
            bail!("amount_eth is required");
        }

        let wei = parse_eth_to_wei(&params.amount_eth)
            .with_context(|| format!("invalid amount_eth: {}", params.amount_eth))?;
        if wei.is_zero() {
            bail!("amount_eth must be greater than zero");
        }

        let from = self.resolve_from(&params.from)?;
        let config = self.chain_client.chain_config(&params.chain).await?;

        let intent = Intent::new(&params.chain, from, to, wei);
        tx::validate(&intent, &policy_from_env())?;

        let (unsigned, fees) = tx::build_unsigned(&self.chain_client, &intent).await?;

        let summary = render_native_preview(&params.chain, from, &params.to, &params.amount_eth, &fees);
        let block = preview_block("Send preview", &params.chain, from, "To", &params.to, &fees);

        if !params.confirm {
            let hint = if params.password.is_empty() {
                "\nSet confirm=true and provide password to sign and broadcast."
            } else {
                "\nSet confirm=true to sign and broadcast."
            };
            return Ok(ToolOutput::text(format!("{summary}{hint}")).with_block(block));
        }
        if params.password.is_empty() {
            return Err(WalletError::PasswordRequired.into());
        }

        let tx_hash = tx_flow::sign_and_send(
            &self.keystore,
            &self.chain_client,
            &params.chain,
            from,
            &params.password,
            unsigned,
            config.chain_id,
        )
        .await?;
        info!("broadcast {tx_hash} on {}", params.chain);

        let mut result = format!("{summary}\n\nBroadcasted tx: {tx_hash}");
        if let Some(receipt_line) = self
            .maybe_wait_and_persist(&params.chain, tx_hash, params.wait)
            .await
        {
            result.push('\n');
            result.push_str(&receipt_line);
        }

        Ok(ToolOutput::text(result).with_block(block))
    }

    async fn send_token(&self, input: &Value) -> Result<ToolOutput> {
        #[derive(Deserialize)]
        struct Input {
            #[serde(default)]
            from: String,
            to: String,
            token: String,
            chain: String,
            amount_tokens: String,
            #[serde(default)]
            password: String,
            #[serde(default)]
            confirm: bool,
            wait: Option<bool>,
        }

        let params: Input = parse_input(input)?;
        let to = parse_address(&params.to, "recipient address")?;
        let token = parse_address(&params.token, "token address")?;
        if params.chain.is_empty() {
            bail!("chain is required");
        }
        if params.amount_tokens.is_empty() {
            bail!("amount_tokens is required");
        }

        let from = self.resolve_from(&params.from)?;
        let config = self.chain_client.chain_config(&params.chain).await?;

        let (decimals, symbol) = self.token_meta(&params.chain, token).await;
        let amount = parse_units(&params.amount_tokens, decimals)
            .with_context(|| format!("invalid amount_tokens: {}", params.amount_tokens))?;
        if amount.is_zero() {
            bail!("amount_tokens must be greater than zero");
        }

        let data = erc20_transfer_data(to, amount);
        let intent = Intent::new(&params.chain, from, token, U256::ZERO).with_data(data);
        tx::validate(&intent, &policy_from_env())?;

        let (unsigned, fees) = tx::build_unsigned(&self.chain_client, &intent).await?;

        let summary = render_token_preview(
            "Preview ERC20 transfer:",
            &params.token,
            &symbol,
            &params.chain,
            from,
            "To",
            &params.to,
            &params.amount_tokens,
            &fees,
        );
        let block = preview_block("Token transfer preview", &params.chain, from, "To", &params.to, &fees);

        if !params.confirm {
            return Ok(ToolOutput::text(format!(
                "{summary}\nSet confirm=true and provide password to broadcast."
            ))
            .with_block(block));
        }
        if params.password.is_empty() {
            return Err(WalletError::PasswordRequired.into());
        }

        let tx_hash = tx_flow::sign_and_send(
            &self.keystore,
            &self.chain_client,
            &params.chain,
            from,
            &params.password,
            unsigned,
            config.chain_id,
        )
        .await?;
        info!("broadcast {tx_hash} on {}", params.chain);

        let mut result = format!("{summary}\n\nBroadcasted tx: {tx_hash}");
        if let Some(receipt_line) = self
            .maybe_wait_and_persist(&params.chain, tx_hash, params.wait)
            .await
        {
            result.push('\n');
            result.push_str(&receipt_line);
        }

        Ok(ToolOutput::text(result).with_block(block))
    }

    async fn approve_token(&self, input: &Value) -> Result<ToolOutput> {
        #[derive(Deserialize)]
        struct Input {
            #[serde(default)]
            from: String,
            spender: String,
            token: String,
            chain: String,
            amount_tokens: String,
            #[serde(default)]
            password: String,
            #[serde(default)]
            confirm: bool,
            wait: Option<bool>,
        }

        let params: Input = parse_input(input)?;
        let spender = parse_address(&params.spender, "spender address")?;
        let token = parse_address(&params.token, "token address")?;
        if params.chain.is_empty() {
            bail!("chain is required");
        }
        if params.amount_tokens.is_empty() {
            bail!("amount_tokens is required");
        }

        let from = self.resolve_from(&params.from)?;
        let config = self.chain_client.chain_config(&params.chain).await?;

        let (decimals, symbol) = self.token_meta(&params.chain, token).await;
        let amount = parse_units(&params.amount_tokens, decimals)
            .with_context(|| format!("invalid amount_tokens: {}", params.amount_tokens))?;
        if amount.is_zero() {
            bail!("amount_tokens must be greater than zero");
        }

        let data = erc20_approve_data(spender, amount);
        let intent = Intent::new(&params.chain, from, token, U256::ZERO).with_data(data);
        tx::validate(&intent, &policy_from_env())?;

        let (unsigned, fees) = tx::build_unsigned(&self.chain_client, &intent).await?;

        let summary = render_token_preview(
            "Preview ERC20 approval:",
            &params.token,
            &symbol,
            &params.chain,
            from,
            "Spender",
            &params.spender,
            &params.amount_tokens,
            &fees,
        );
        let block = preview_block(
            "Token approval preview",
            &params.chain,
            from,
            "Spender",
            &params.spender,
            &fees,
        );

        if !params.confirm {
            return Ok(ToolOutput::text(format!(
                "{summary}\nSet confirm=true and provide password to broadcast."
            ))
            .with_block(block));
        }
        if params.password.is_empty() {
            return Err(WalletError::PasswordRequired.into());
        }

        let tx_hash = tx_flow::sign_and_send(
            &self.keystore,
            &self.chain_client,
            &params.chain,
            from,
            &params.password,
            unsigned,
            config.chain_id,
        )
        .await?;
        info!("broadcast {tx_hash} on {}", params.chain);

        let mut result = format!("{summary}\n\nBroadcasted tx: {tx_hash}");
        if let Some(receipt_line) = self
            .maybe_wait_and_persist(&params.chain, tx_hash, params.wait)
            .await
        {
            result.push('\n');
            result.push_str(&receipt_line);
        }

        Ok(ToolOutput::text(result).with_block(block))
    }

    // ── Receipt handlers ─────────────────────────────────────────────

    async fn get_receipt(&self, input: &Value) -> Result<ToolOutput> {
        #[derive(Deserialize)]
        struct Input {
            chain: String,
            tx_hash: String,
        }

        let params: Input = parse_input(input)?;
        if params.chain.is_empty() {
            bail!("chain is required");
        }
        self.chain_client
            .chain_config(&params.chain)
            .await
            .map_err(|_| anyhow!("unknown chain: {}", params.chain))?;
        let tx_hash = parse_tx_hash(&params.tx_hash)?;

        // Cache first: a stored receipt answers without any RPC traffic.
        if let Some(stored) = self.receipts.get(&params.chain, &params.tx_hash)? {
            let mut kv = UiKv::new("Receipt (cached)");
            kv.item("Chain", stored.chain.clone());
            kv.item("Tx", stored.tx_hash.clone());
            kv.item("Status", stored.status.to_string());
            kv.item("Gas used", stored.gas_used.to_string());
            return Ok(ToolOutput::text(format!(
                "Receipt (cached):\n- Chain: {}\n- Tx: {}\n- Status: {}\n- Gas used: {}",
                stored.chain, stored.tx_hash, stored.status, stored.gas_used
            ))
            .with_block(UiBlock::Kv(kv)));
        }

        let receipt = self
            .chain_client
            .get_receipt(&params.chain, tx_hash)
            .await?
            .context("receipt not found (tx may be pending)")?;

        let _ = self.receipts.upsert(&params.chain, &receipt);

        let status = receipt.status() as u64;
        let mut kv = UiKv::new("Receipt");
        kv.item("Chain", params.chain.clone());
        kv.item("Tx", params.tx_hash.clone());
        kv.item("Status", status.to_string());
        kv.item("Gas used", receipt.gas_used.to_string());

        Ok(ToolOutput::text(format!(
            "Receipt:\n- Chain: {}\n- Tx: {}\n- Status: {}\n- Gas used: {}",
            params.chain, params.tx_hash, status, receipt.gas_used
        ))
        .with_block(UiBlock::Kv(kv)))
    }

    async fn wait_receipt(&self, input: &Value) -> Result<ToolOutput> {
        #[derive(Deserialize)]
        struct Input {
            chain: String,
            tx_hash: String,
            #[serde(default)]
            timeout_sec: u64,
        }

        let params: Input = parse_input(input)?;
        if params.chain.is_empty() {
            bail!("chain is required");
        }
        self.chain_client
            .chain_config(&params.chain)
            .await
            .map_err(|_| anyhow!("unknown chain: {}", params.chain))?;
        let tx_hash = parse_tx_hash(&params.tx_hash)?;

        let budget = clamp_wait_timeout(params.timeout_sec);
        let receipt = self
            .chain_client
            .wait_mined(&params.chain, tx_hash, budget)
            .await
            .context("wait mined")?;

        let _ = self.receipts.upsert(&params.chain, &receipt);

        let status = receipt.status() as u64;
        let mut kv = UiKv::new("Receipt");
        kv.item("Chain", params.chain.clone());
        kv.item("Tx", params.tx_hash.clone());
        kv.item("Status", status.to_string());
        kv.item("Gas used", receipt.gas_used.to_string());

        Ok(ToolOutput::text(format!(
            "Receipt:\n- Chain: {}\n- Tx: {}\n- Status: {}\n- Gas used: {}",
            params.chain, params.tx_hash, status, receipt.gas_used
        ))
        .with_block(UiBlock::Kv(kv)))
    }

    // ── Shared helpers ───────────────────────────────────────────────

    /// The sender: an explicit, validated `from`, or the first keystore
    /// account.
    fn resolve_from(&self, from: &str) -> Result<Address> {
        if !from.is_empty() {
            return parse_address(from, "from address");
        }
        let accounts = self.keystore.list_accounts();
        accounts
            .first()
            .map(|acc| acc.address)
            .ok_or_else(|| anyhow!("no wallets found in keystore"))
    }

    /// Token display metadata with defaults that never block a preview.
    async fn token_meta(&self, chain: &str, token: Address) -> (u8, String) {
        let decimals = self.chain_client.token_decimals(chain, token).await.unwrap_or(18);
        let symbol = {
            let s = self.chain_client.token_symbol(chain, token).await;
            if s.is_empty() {
                "TOKEN".to_string()
            } else {
                s
            }
        };
        (decimals, symbol)
    }

    async fn maybe_wait_and_persist(
        &self,
        chain: &str,
        tx_hash: B256,
        wait: Option<bool>,
    ) -> Option<String> {
        if !wait.unwrap_or(true) {
            return None;
        }
        let receipt = self
            .chain_client
            .wait_mined(chain, tx_hash, DEFAULT_WAIT)
            .await
            .ok()?;
        let _ = self.receipts.upsert(chain, &receipt);
        Some(format!(
            "Receipt status: {}, gas used: {}",
            receipt.status() as u64,
            receipt.gas_used
        ))
    }
}

// ── Free functions ───────────────────────────────────────────────────

fn parse_input<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T> {
    serde_json::from_value(input.clone()).context("invalid input")
}

fn parse_address(value: &str, what: &str) -> Result<Address> {
    if value.is_empty() {
        bail!("invalid {what}");
    }
    value
        .parse()
        .map_err(|_| anyhow!("invalid {what}: {value}"))
}

/// A tx hash is exactly 0x + 64 hex characters.
pub fn parse_tx_hash(value: &str) -> Result<B256> {
    if !value.starts_with("0x") || value.len() != 66 {
        bail!("invalid tx hash");
    }
    value.parse().map_err(|_| anyhow!("invalid tx hash"))
}

/// Clamp `wait_receipt`'s timeout into [5, 600] seconds; zero means the
/// 120-second default.
pub fn clamp_wait_timeout(timeout_sec: u64) -> Duration {
    if timeout_sec == 0 {
        return DEFAULT_WAIT;
    }
    Duration::from_secs(timeout_sec.clamp(5, 600))
}

/// Policy from the environment: `CLIFI_MAX_TX_ETH` (decimal ETH),
/// `CLIFI_ALLOW_TO` and `CLIFI_DENY_TO` (comma-separated addresses).
/// Malformed entries are skipped.
pub fn policy_from_env() -> Policy {
    let mut policy = Policy::default();

    if let Ok(max) = std::env::var("CLIFI_MAX_TX_ETH") {
        if let Ok(wei) = parse_eth_to_wei(&max) {
            policy.max_per_tx_wei = Some(wei);
        }
    }
    if let Ok(allow) = std::env::var("CLIFI_ALLOW_TO") {
        policy.allow_to = parse_address_list(&allow);
    }
    if let Ok(deny) = std::env::var("CLIFI_DENY_TO") {
        policy.deny_to = parse_address_list(&deny);
    }

    policy
}

fn parse_address_list(raw: &str) -> Vec<Address> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

/// ERC-20 transfer calldata: selector ++ padded address ++ big-endian
/// amount.
pub fn erc20_transfer_data(to: Address, amount: U256) -> Vec<u8> {
    encode_selector_address_amount(TRANSFER_SELECTOR, to, amount)
}

/// ERC-20 approve calldata, same layout with the approve selector.
pub fn erc20_approve_data(spender: Address, amount: U256) -> Vec<u8> {
    encode_selector_address_amount(APPROVE_SELECTOR, spender, amount)
}

fn encode_selector_address_amount(selector: [u8; 4], address: Address, amount: U256) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&selector);
    data.extend_from_slice(&left_pad_32(address.as_slice()));
    data.extend_from_slice(&amount.to_be_bytes::<32>());
    data
}

fn render_native_preview(
    chain: &str,
    from: Address,
    to: &str,
    amount_eth: &str,
    fees: &SuggestedFees,
) -> String {
    format!(
        "Preview:\n- Chain: {chain}\n- From: {from}\n- To: {to}\n- Amount: {amount_eth} ETH\n\
         - Gas limit: {}\n- Max fee: {} gwei\n- Max priority fee: {} gwei\n- Estimated total: {} ETH\n",
        fees.gas_limit,
        wei_to_gwei(U256::from(fees.max_fee)),
        wei_to_gwei(U256::from(fees.max_priority_fee)),
        wei_to_eth(fees.estimated_cost_wei),
    )
}

#[allow(clippy::too_many_arguments)]
fn render_token_preview(
    heading: &str,
    token: &str,
    symbol: &str,
    chain: &str,
    from: Address,
    counterparty_label: &str,
    counterparty: &str,
    amount: &str,
    fees: &SuggestedFees,
) -> String {
    format!(
        "{heading}\n- Token: {token} ({symbol})\n- Chain: {chain}\n- From: {from}\n\
         - {counterparty_label}: {counterparty}\n- Amount: {amount} {symbol}\n- Gas limit: {}\n\
         - Max fee: {} gwei\n- Max priority fee: {} gwei\n- Estimated total (gas only): {} ETH\n",
        fees.gas_limit,
        wei_to_gwei(U256::from(fees.max_fee)),
        wei_to_gwei(U256::from(fees.max_priority_fee)),
        wei_to_eth(fees.estimated_cost_wei),
    )
}

fn preview_block(
    title: &str,
    chain: &str,
    from: Address,
    counterparty_label: &str,
    counterparty: &str,
    fees: &SuggestedFees,
) -> UiBlock {
    let mut kv = UiKv::new(title);
    kv.item("Chain", chain.to_string());
    kv.item("From", from.to_string());
    kv.item(counterparty_label, counterparty.to_string());
    kv.item("Gas limit", fees.gas_limit.to_string());
    kv.item("Max fee", format!("{} gwei", wei_to_gwei(U256::from(fees.max_fee))));
    kv.item(
        "Max priority fee",
        format!("{} gwei", wei_to_gwei(U256::from(fees.max_priority_fee))),
    );
    kv.item(
        "Estimated total",
        format!("{} ETH", wei_to_eth(fees.estimated_cost_wei)),
    );
    UiBlock::Kv(kv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn registry() -> (tempfile::TempDir, ToolRegistry) {
        let dir = tempdir().unwrap();
        let registry = ToolRegistry::ephemeral(dir.path()).unwrap();
        (dir, registry)
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let (_dir, registry) = registry();
        let err = registry.execute("not_a_tool", &json!({})).await.unwrap_err();
        assert!(err.to_string().contains("unknown tool: not_a_tool"));
    }

    #[tokio::test]
    async fn test_list_chains_answers_offline() {
        let (_dir, registry) = registry();
        let output = registry.execute("list_chains", &json!({})).await.unwrap();
        assert!(output.text.starts_with("Supported Chains:"));
        assert!(output.text.contains("Mainnets:"));
        assert!(output.text.contains("Testnets:"));
        assert!(output.text.contains("ethereum"));
        assert_eq!(output.blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_list_wallets_empty_keystore() {
        let (_dir, registry) = registry();
        let output = registry.execute("list_wallets", &json!({})).await.unwrap();
        assert!(output.text.starts_with("No wallets found."));
    }

    #[tokio::test]
    async fn test_get_chain_info_renders_kv() {
        let (_dir, registry) = registry();
        let output = registry
            .execute("get_chain_info", &json!({"chain": "base"}))
            .await
            .unwrap();
        assert!(output.text.contains("Chain ID: 8453"));
        assert!(matches!(output.blocks[0], UiBlock::Kv(_)));
    }

    #[tokio::test]
    async fn test_get_balances_rejects_bad_address_and_chain() {
        let (_dir, registry) = registry();

        let err = registry
            .execute("get_balances", &json!({"address": "nothex"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid address"));

        let err = registry
            .execute(
                "get_balances",
                &json!({"address": "0x000000000000000000000000000000000000dEaD", "chains": ["nope"]}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown chain: nope"));
    }

    #[tokio::test]
    async fn test_send_native_policy_deny_stops_before_preview() {
        let (_dir, registry) = registry();
        registry.keystore.create_account("pw").unwrap();

        std::env::set_var(
            "CLIFI_DENY_TO",
            "0x000000000000000000000000000000000000beef",
        );
        let err = registry
            .execute(
                "send_native",
                &json!({
                    "to": "0x000000000000000000000000000000000000beef",
                    "chain": "sepolia",
                    "amount_eth": "0.01"
                }),
            )
            .await
            .unwrap_err();
        std::env::remove_var("CLIFI_DENY_TO");

        assert_eq!(
            err.downcast_ref::<tx::PolicyError>(),
            Some(&tx::PolicyError::DeniedDestination)
        );
    }

    #[tokio::test]
    async fn test_send_native_validates_input_before_network() {
        let (_dir, registry) = registry();

        let err = registry
            .execute("send_native", &json!({"to": "bad", "chain": "base", "amount_eth": "1"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid recipient address"));

        let err = registry
            .execute(
                "send_native",
                &json!({
                    "to": "0x000000000000000000000000000000000000dEaD",
                    "chain": "base",
                    "amount_eth": "0"
                }),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[tokio::test]
    async fn test_get_receipt_cache_hit_skips_rpc() {
        let (_dir, registry) = registry();
        let hash = format!("0x{}", "ab".repeat(32));
        registry
            .receipts
            .upsert_row("base", &hash, 1, 21_000, "{}")
            .unwrap();

        let output = registry
            .execute("get_receipt", &json!({"chain": "base", "tx_hash": hash}))
            .await
            .unwrap();
        assert!(output.text.starts_with("Receipt (cached):"));
        assert!(output.text.contains("- Status: 1"));
        assert!(output.text.contains("- Gas used: 21000"));
    }

    #[tokio::test]
    async fn test_receipt_handlers_validate_hash() {
        let (_dir, registry) = registry();
        for bad in ["abc", "0x1234", &format!("0x{}", "zz".repeat(32))] {
            let err = registry
                .execute("get_receipt", &json!({"chain": "base", "tx_hash": bad}))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("invalid tx hash"), "{bad}");
        }
    }

    #[test]
    fn test_erc20_calldata_layout() {
        let to = Address::from([0x11u8; 20]);
        let amount = U256::from(1_000_000u64);

        let data = erc20_transfer_data(to, amount);
        assert_eq!(data.len(), 68);
        assert_eq!(&data[..4], &TRANSFER_SELECTOR);
        assert_eq!(&data[4..16], &[0u8; 12]); // address left-padding
        assert_eq!(&data[16..36], to.as_slice());
        assert_eq!(U256::from_be_slice(&data[36..]), amount);

        let approve = erc20_approve_data(to, amount);
        assert_eq!(&approve[..4], &APPROVE_SELECTOR);
        assert_eq!(&approve[4..], &data[4..]);
    }

    #[test]
    fn test_clamp_wait_timeout() {
        assert_eq!(clamp_wait_timeout(0), Duration::from_secs(120));
        assert_eq!(clamp_wait_timeout(1), Duration::from_secs(5));
        assert_eq!(clamp_wait_timeout(60), Duration::from_secs(60));
        assert_eq!(clamp_wait_timeout(10_000), Duration::from_secs(600));
    }

    #[test]
    fn test_policy_from_env_parses_all_knobs() {
        std::env::set_var("CLIFI_MAX_TX_ETH", "0.5");
        std::env::set_var(
            "CLIFI_ALLOW_TO",
            "0x0000000000000000000000000000000000000001, 0x0000000000000000000000000000000000000002",
        );
        let policy = policy_from_env();
        std::env::remove_var("CLIFI_MAX_TX_ETH");
        std::env::remove_var("CLIFI_ALLOW_TO");

        assert_eq!(policy.max_per_tx_wei, Some(U256::from(500_000_000_000_000_000u64)));
        assert_eq!(policy.allow_to.len(), 2);
    }

    #[test]
    fn test_native_preview_format() {
        let fees = SuggestedFees::new(21_000, 50_000_000_000, 2_000_000_000, U256::from(10_000_000_000_000_000u64));
        let from = Address::from([1u8; 20]);
        let preview = render_native_preview("sepolia", from, "0x00...01", "0.01", &fees);

        assert!(preview.starts_with("Preview:\n"));
        assert!(preview.contains("- Chain: sepolia\n"));
        assert!(preview.contains("- To: 0x00...01\n"));
        assert!(preview.contains("- Amount: 0.01 ETH\n"));
        assert!(preview.contains("- Gas limit: 21000\n"));
        assert!(preview.contains("- Max fee: 50.00 gwei\n"));
        assert!(preview.contains("- Max priority fee: 2.00 gwei\n"));
        assert!(preview.contains("- Estimated total: 0.011050 ETH\n"));
    }
}
