//! ERC-20 read helpers
//!
//! Token metadata and balances via `eth_call` with the canonical 4-byte
//! selectors. Tokens disagree on how `symbol()`/`name()` are encoded, so the
//! string decoder accepts both the standard ABI shape and raw padded bytes.

use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use anyhow::{Context, Result};

use super::client::ChainClient;

/// balanceOf(address)
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
/// decimals()
const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
/// symbol()
const SYMBOL_SELECTOR: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
/// name()
const NAME_SELECTOR: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];

/// An ERC-20 balance with display metadata.
#[derive(Clone, Debug)]
pub struct TokenBalance {
    pub token_address: Address,
    pub symbol: String,
    pub name: String,
    pub balance: U256,
    pub decimals: u8,
}

/// A native-token balance. Native decimals are always 18.
#[derive(Clone, Debug)]
pub struct NativeBalance {
    pub chain: String,
    pub symbol: String,
    pub balance: U256,
    pub decimals: u8,
}

impl ChainClient {
    /// Native balance with the chain's currency symbol attached.
    pub async fn native_balance(&self, chain: &str, address: Address) -> Result<NativeBalance> {
        let config = self.chain_config(chain).await?;
        let balance = self.get_balance(chain, address).await?;
        Ok(NativeBalance {
            chain: chain.to_string(),
            symbol: config.native_currency,
            balance,
            decimals: 18,
        })
    }

    /// ERC-20 balance plus symbol/name/decimals metadata. Metadata lookups
    /// are best-effort; the balance query is not.
    pub async fn token_balance(
        &self,
        chain: &str,
        token: Address,
        holder: Address,
    ) -> Result<TokenBalance> {
        let mut calldata = Vec::with_capacity(36);
        calldata.extend_from_slice(&BALANCE_OF_SELECTOR);
        calldata.extend_from_slice(&left_pad_32(holder.as_slice()));

        let result = self
            .call(chain, call_request(token, calldata))
            .await
            .context("failed to get token balance")?;
        let balance = U256::from_be_slice(&result);

        let symbol = self.token_string(chain, token, SYMBOL_SELECTOR).await;
        let name = self.token_string(chain, token, NAME_SELECTOR).await;
        let decimals = self.token_decimals(chain, token).await.unwrap_or(18);

        Ok(TokenBalance {
            token_address: token,
            symbol,
            name,
            balance,
            decimals,
        })
    }

    /// decimals(), defaulting to 18 on any failure.
    pub async fn token_decimals(&self, chain: &str, token: Address) -> Result<u8> {
        let out = self
            .call(chain, call_request(token, DECIMALS_SELECTOR.to_vec()))
            .await?;
        if out.is_empty() {
            return Ok(18);
        }
        Ok(U256::from_be_slice(&out).to::<u64>() as u8)
    }

    /// symbol(), empty on failure.
    pub async fn token_symbol(&self, chain: &str, token: Address) -> String {
        self.token_string(chain, token, SYMBOL_SELECTOR).await
    }

    async fn token_string(&self, chain: &str, token: Address, selector: [u8; 4]) -> String {
        match self.call(chain, call_request(token, selector.to_vec())).await {
            Ok(out) => decode_string(&out),
            Err(_) => String::new(),
        }
    }
}

fn call_request(to: Address, data: Vec<u8>) -> TransactionRequest {
    TransactionRequest {
        to: Some(TxKind::Call(to)),
        input: TransactionInput::new(Bytes::from(data)),
        ..Default::default()
    }
}

/// Left-pad a byte slice to 32 bytes.
pub fn left_pad_32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let start = 32 - bytes.len().min(32);
    out[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(32)..]);
    out
}

/// Decode an ABI-encoded string. Standard encoding is
/// offset (32) + length (32) + data; some tokens return a raw 32-byte
/// padded string instead, which is decoded by trimming NULs. Lengths larger
/// than the remaining bytes are rejected.
pub fn decode_string(data: &[u8]) -> String {
    if data.len() < 64 {
        return String::from_utf8_lossy(data)
            .trim_end_matches('\0')
            .to_string();
    }

    let length = U256::from_be_slice(&data[32..64]);
    let length = if length > U256::from(data.len()) {
        return String::new();
    } else {
        length.to::<u64>() as usize
    };

    if length == 0 || length > data.len() - 64 {
        return String::new();
    }

    String::from_utf8_lossy(&data[64..64 + length])
        .trim_end_matches('\0')
        .to_string()
}

/// Format an integer token amount with its decimals, keeping at most six
/// fractional digits.
pub fn format_units(amount: U256, decimals: u8) -> String {
    let scale = U256::from(10u64).pow(U256::from(decimals as u64));
    if scale.is_zero() {
        return amount.to_string();
    }

    let whole = amount / scale;
    let frac = amount % scale;

    let shown = decimals.min(6) as usize;
    if shown == 0 {
        return whole.to_string();
    }

    // Render the full fractional part, then truncate to the shown digits.
    let frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{whole}.{}", &frac_str[..shown])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abi_string(s: &str) -> Vec<u8> {
        let mut out = vec![0u8; 64];
        out[31] = 32; // offset
        out[63] = s.len() as u8; // length
        let mut data = s.as_bytes().to_vec();
        data.resize(32, 0);
        out.extend_from_slice(&data);
        out
    }

    #[test]
    fn test_decode_standard_abi_string() {
        assert_eq!(decode_string(&abi_string("USDC")), "USDC");
        assert_eq!(decode_string(&abi_string("Wrapped Ether")), "Wrapped Ether");
    }

    #[test]
    fn test_decode_raw_padded_string() {
        let mut raw = b"MKR".to_vec();
        raw.resize(32, 0);
        assert_eq!(decode_string(&raw), "MKR");
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut data = vec![0u8; 96];
        data[31] = 32;
        data[63] = 200; // claims more bytes than exist
        assert_eq!(decode_string(&data), "");
    }

    #[test]
    fn test_decode_empty_input() {
        assert_eq!(decode_string(&[]), "");
    }

    #[test]
    fn test_left_pad_32() {
        let padded = left_pad_32(&[0xab, 0xcd]);
        assert_eq!(padded[30..], [0xab, 0xcd]);
        assert!(padded[..30].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_format_units() {
        // 1.5 ETH in wei
        let wei = U256::from(1_500_000_000_000_000_000u64);
        assert_eq!(format_units(wei, 18), "1.500000");

        // 2500.25 USDC (6 decimals)
        let usdc = U256::from(2_500_250_000u64);
        assert_eq!(format_units(usdc, 6), "2500.250000");

        // Zero-decimal token
        assert_eq!(format_units(U256::from(42u64), 0), "42");
    }
}
