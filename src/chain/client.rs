//! Multi-chain EVM client
//!
//! Caches one RPC handle per chain, dialing the configured URLs in order
//! and rejecting any endpoint whose `eth_chainId` does not match the
//! declared id. The pool lives behind a single async mutex; `get_client`
//! holds it across the dial so contending callers never dial twice.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::config::{default_chains, ChainConfig};

/// Probe budget for a fresh RPC endpoint.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
/// Budget for the chain-id verification query.
const CHAIN_ID_TIMEOUT: Duration = Duration::from_secs(5);
/// Budget for a single chain operation (balance, estimate, send, receipt).
const OP_TIMEOUT: Duration = Duration::from_secs(20);
/// How often `wait_mined` polls for the receipt.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

struct Pool {
    chains: HashMap<String, ChainConfig>,
    clients: HashMap<String, DynProvider>,
}

/// Connection manager for all configured EVM chains.
pub struct ChainClient {
    pool: Mutex<Pool>,
}

impl Default for ChainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainClient {
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(Pool {
                chains: default_chains(),
                clients: HashMap::new(),
            }),
        }
    }

    /// Add or override a chain configuration. Drops any cached client for
    /// the name so the next call re-dials against the new URLs.
    pub async fn add_chain(&self, name: &str, config: ChainConfig) {
        let mut pool = self.pool.lock().await;
        pool.clients.remove(name);
        pool.chains.insert(name.to_string(), config);
    }

    pub async fn chain_config(&self, chain: &str) -> Result<ChainConfig> {
        let pool = self.pool.lock().await;
        pool.chains
            .get(chain)
            .cloned()
            .ok_or_else(|| anyhow!("unknown chain: {chain}"))
    }

    /// All configured chain names, sorted.
    pub async fn list_chains(&self) -> Vec<String> {
        let pool = self.pool.lock().await;
        let mut names: Vec<String> = pool.chains.keys().cloned().collect();
        names.sort();
        names
    }

    /// Return the cached provider for a chain, dialing on first use. URLs
    /// are tried in order; an endpoint reporting the wrong chain id is
    /// skipped. The HTTP transport connects lazily, so the chain-id probe
    /// doubles as the connectivity check.
    async fn get_client(&self, chain: &str) -> Result<(DynProvider, ChainConfig)> {
        let mut pool = self.pool.lock().await;

        let config = pool
            .chains
            .get(chain)
            .cloned()
            .ok_or_else(|| anyhow!("unknown chain: {chain}"))?;

        if let Some(client) = pool.clients.get(chain) {
            return Ok((client.clone(), config));
        }

        let mut last_err = anyhow!("no RPC URLs configured");
        for rpc_url in &config.rpc_urls {
            let url = match rpc_url.parse() {
                Ok(url) => url,
                Err(err) => {
                    last_err = anyhow!("invalid RPC URL {rpc_url}: {err}");
                    continue;
                }
            };

            let provider = match dial(url) {
                Ok(provider) => provider,
                Err(err) => {
                    last_err = anyhow!("{rpc_url}: {err}");
                    continue;
                }
            };

            let chain_id = match tokio::time::timeout(CHAIN_ID_TIMEOUT, provider.get_chain_id())
                .await
            {
                Ok(Ok(id)) => id,
                Ok(Err(err)) => {
                    warn!("rpc {rpc_url} failed chain-id query: {err}");
                    last_err = anyhow!("{rpc_url}: {err}");
                    continue;
                }
                Err(_) => {
                    warn!("rpc {rpc_url} timed out");
                    last_err = anyhow!("{rpc_url}: chain-id query timed out");
                    continue;
                }
            };

            if chain_id != config.chain_id {
                last_err = anyhow!(
                    "{rpc_url}: chain ID mismatch: expected {}, got {chain_id}",
                    config.chain_id
                );
                continue;
            }

            debug!("connected to {chain} via {rpc_url}");
            pool.clients.insert(chain.to_string(), provider.clone());
            return Ok((provider, config));
        }

        Err(last_err.context(format!("failed to connect to {chain}")))
    }

    /// Native balance in wei.
    pub async fn get_balance(&self, chain: &str, address: Address) -> Result<U256> {
        let (client, _) = self.get_client(chain).await?;
        bounded(OP_TIMEOUT, "get balance", async move {
            Ok(client.get_balance(address).await?)
        })
        .await
    }

    /// Next nonce including pending transactions.
    pub async fn pending_nonce(&self, chain: &str, address: Address) -> Result<u64> {
        let (client, _) = self.get_client(chain).await?;
        bounded(OP_TIMEOUT, "get nonce", async move {
            Ok(client.get_transaction_count(address).pending().await?)
        })
        .await
    }

    /// Suggested max fee per gas, in wei.
    pub async fn suggest_gas_price(&self, chain: &str) -> Result<u128> {
        let (client, _) = self.get_client(chain).await?;
        bounded(OP_TIMEOUT, "suggest gas price", async move {
            Ok(client.get_gas_price().await?)
        })
        .await
    }

    /// Suggested priority fee (tip), in wei.
    pub async fn suggest_gas_tip_cap(&self, chain: &str) -> Result<u128> {
        let (client, _) = self.get_client(chain).await?;
        bounded(OP_TIMEOUT, "suggest gas tip", async move {
            Ok(client.get_max_priority_fee_per_gas().await?)
        })
        .await
    }

    /// Estimate gas for a call.
    pub async fn estimate_gas(&self, chain: &str, tx: TransactionRequest) -> Result<u64> {
        let (client, _) = self.get_client(chain).await?;
        bounded(OP_TIMEOUT, "estimate gas", async move {
            Ok(client.estimate_gas(tx).await?)
        })
        .await
    }

    /// Read-only contract call.
    pub async fn call(&self, chain: &str, tx: TransactionRequest) -> Result<Bytes> {
        let (client, _) = self.get_client(chain).await?;
        bounded(OP_TIMEOUT, "eth_call", async move { Ok(client.call(tx).await?) }).await
    }

    /// Broadcast a signed, RLP-encoded transaction. Returns its hash.
    pub async fn send_raw_transaction(&self, chain: &str, raw: &[u8]) -> Result<B256> {
        let (client, _) = self.get_client(chain).await?;
        let raw = raw.to_vec();
        bounded(OP_TIMEOUT, "send transaction", async move {
            let pending = client.send_raw_transaction(&raw).await?;
            Ok(*pending.tx_hash())
        })
        .await
    }

    /// Fetch the receipt for a mined transaction, if available.
    pub async fn get_receipt(
        &self,
        chain: &str,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>> {
        let (client, _) = self.get_client(chain).await?;
        bounded(OP_TIMEOUT, "get receipt", async move {
            Ok(client.get_transaction_receipt(tx_hash).await?)
        })
        .await
    }

    /// Poll every two seconds until the transaction is mined or the wait
    /// budget runs out.
    pub async fn wait_mined(
        &self,
        chain: &str,
        tx_hash: B256,
        wait_budget: Duration,
    ) -> Result<TransactionReceipt> {
        let (client, _) = self.get_client(chain).await?;

        let poll = async {
            let mut ticker = tokio::time::interval(RECEIPT_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                match client.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return Ok::<_, anyhow::Error>(receipt),
                    Ok(None) => {}
                    // Transient RPC errors should not abort the wait.
                    Err(err) => debug!("receipt poll error: {err}"),
                }
            }
        };

        match tokio::time::timeout(wait_budget, poll).await {
            Ok(result) => result,
            Err(_) => bail!(
                "timed out after {}s waiting for transaction {tx_hash} on {chain}",
                wait_budget.as_secs()
            ),
        }
    }
}

/// Build a provider over an HTTP transport with a bounded connect timeout.
/// The transport connects lazily, so this does no I/O itself.
fn dial(url: reqwest::Url) -> Result<DynProvider> {
    let http_client = reqwest::Client::builder()
        .connect_timeout(DIAL_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;
    let transport = alloy::transports::http::Http::with_client(http_client, url);
    let rpc_client = alloy::rpc::client::RpcClient::new(transport, false);
    Ok(ProviderBuilder::new().connect_client(rpc_client).erased())
}

/// Bound an operation with a finite timeout on top of whatever deadline the
/// caller already carries.
async fn bounded<T, F>(budget: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(budget, fut)
        .await
        .with_context(|| format!("{what} timed out after {}s", budget.as_secs()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_chain_is_an_error() {
        let client = ChainClient::new();
        let err = client.chain_config("notachain").await.unwrap_err();
        assert!(err.to_string().contains("unknown chain: notachain"));
    }

    #[tokio::test]
    async fn test_list_chains_is_sorted_and_complete() {
        let client = ChainClient::new();
        let chains = client.list_chains().await;
        assert_eq!(chains.len(), 7);
        let mut sorted = chains.clone();
        sorted.sort();
        assert_eq!(chains, sorted);
        assert!(chains.contains(&"ethereum".to_string()));
    }

    #[tokio::test]
    async fn test_add_chain_overrides_config() {
        let client = ChainClient::new();
        let mut config = client.chain_config("ethereum").await.unwrap();
        config.rpc_urls = vec!["https://example.invalid/rpc".into()];
        client.add_chain("ethereum", config).await;

        let updated = client.chain_config("ethereum").await.unwrap();
        assert_eq!(updated.rpc_urls, vec!["https://example.invalid/rpc"]);
        assert_eq!(updated.chain_id, 1);
    }
}
