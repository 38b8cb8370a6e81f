//! Chain configurations
//!
//! Built-in EVM chains with public RPC endpoints. A connected RPC must
//! report the declared chain id or it is rejected.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Configuration for one EVM chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub explorer_url: String,
    pub native_currency: String,
    pub is_testnet: bool,
}

fn chain(
    name: &str,
    chain_id: u64,
    rpc_urls: &[&str],
    explorer_url: &str,
    native_currency: &str,
    is_testnet: bool,
) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        chain_id,
        rpc_urls: rpc_urls.iter().map(|s| s.to_string()).collect(),
        explorer_url: explorer_url.to_string(),
        native_currency: native_currency.to_string(),
        is_testnet,
    }
}

/// The default chain set keyed by short name.
pub fn default_chains() -> HashMap<String, ChainConfig> {
    let mut chains = HashMap::new();
    chains.insert(
        "ethereum".to_string(),
        chain(
            "Ethereum Mainnet",
            1,
            &["https://eth.llamarpc.com", "https://rpc.ankr.com/eth"],
            "https://etherscan.io",
            "ETH",
            false,
        ),
    );
    chains.insert(
        "base".to_string(),
        chain(
            "Base",
            8453,
            &["https://mainnet.base.org", "https://base.llamarpc.com"],
            "https://basescan.org",
            "ETH",
            false,
        ),
    );
    chains.insert(
        "arbitrum".to_string(),
        chain(
            "Arbitrum One",
            42161,
            &["https://arb1.arbitrum.io/rpc", "https://arbitrum.llamarpc.com"],
            "https://arbiscan.io",
            "ETH",
            false,
        ),
    );
    chains.insert(
        "optimism".to_string(),
        chain(
            "Optimism",
            10,
            &["https://mainnet.optimism.io", "https://optimism.llamarpc.com"],
            "https://optimistic.etherscan.io",
            "ETH",
            false,
        ),
    );
    chains.insert(
        "polygon".to_string(),
        chain(
            "Polygon",
            137,
            &["https://polygon-rpc.com", "https://polygon.llamarpc.com"],
            "https://polygonscan.com",
            "MATIC",
            false,
        ),
    );
    chains.insert(
        "sepolia".to_string(),
        chain(
            "Sepolia Testnet",
            11155111,
            &["https://rpc.sepolia.org", "https://sepolia.drpc.org"],
            "https://sepolia.etherscan.io",
            "ETH",
            true,
        ),
    );
    chains.insert(
        "base-sepolia".to_string(),
        chain(
            "Base Sepolia Testnet",
            84532,
            &["https://sepolia.base.org"],
            "https://sepolia.basescan.org",
            "ETH",
            true,
        ),
    );
    chains
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chain_ids() {
        let chains = default_chains();
        let expected = [
            ("ethereum", 1u64),
            ("base", 8453),
            ("arbitrum", 42161),
            ("optimism", 10),
            ("polygon", 137),
            ("sepolia", 11155111),
            ("base-sepolia", 84532),
        ];
        assert_eq!(chains.len(), expected.len());
        for (name, id) in expected {
            assert_eq!(chains[name].chain_id, id, "{name}");
        }
    }

    #[test]
    fn test_every_chain_has_rpc_and_explorer() {
        for (name, config) in default_chains() {
            assert!(!config.rpc_urls.is_empty(), "{name} has no RPC URLs");
            assert!(
                config.rpc_urls.iter().all(|u| u.starts_with("https://")),
                "{name} has a non-HTTPS RPC"
            );
            assert!(config.explorer_url.starts_with("https://"), "{name}");
        }
    }
}
