//! Transaction intents
//!
//! Translates an operator intent into a preview-ready unsigned EIP-1559
//! transaction: policy validation first, then nonce/fee/gas resolution
//! against the chain, then a best-effort simulation. The signer fills the
//! chain id at signing time.

pub mod amounts;

use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use anyhow::Result;
use thiserror::Error;
use tracing::debug;

use crate::chain::ChainClient;

/// A state-changing transaction the operator wants to perform.
#[derive(Clone, Debug)]
pub struct Intent {
    pub chain: String,
    pub from: Address,
    pub to: Address,
    /// Native value. Required; token transfers carry zero.
    pub value_wei: Option<U256>,
    /// Calldata; empty for a native send.
    pub data: Vec<u8>,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub max_fee: Option<u128>,
    pub max_priority_fee: Option<u128>,
}

impl Intent {
    pub fn new(chain: &str, from: Address, to: Address, value_wei: U256) -> Self {
        Self {
            chain: chain.to_string(),
            from,
            to,
            value_wei: Some(value_wei),
            data: Vec::new(),
            nonce: None,
            gas_limit: None,
            max_fee: None,
            max_priority_fee: None,
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }
}

/// Safety constraints applied before any transaction is built.
#[derive(Clone, Debug, Default)]
pub struct Policy {
    pub max_per_tx_wei: Option<U256>,
    pub allow_to: Vec<Address>,
    pub deny_to: Vec<Address>,
}

/// A policy rejection, with the sub-reason distinguishable.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("value missing")]
    ValueMissing,
    #[error("destination denied by policy")]
    DeniedDestination,
    #[error("destination not in allowlist")]
    NotAllowlisted,
    #[error("value exceeds max per tx limit")]
    OverPerTxLimit,
}

/// Gas figures surfaced to the operator in previews.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuggestedFees {
    pub gas_limit: u64,
    pub max_fee: u128,
    pub max_priority_fee: u128,
    /// `max_fee * gas_limit + value`: the worst-case total spend.
    pub estimated_cost_wei: U256,
}

impl SuggestedFees {
    pub fn new(gas_limit: u64, max_fee: u128, max_priority_fee: u128, value: U256) -> Self {
        let estimated_cost_wei = U256::from(max_fee) * U256::from(gas_limit) + value;
        Self {
            gas_limit,
            max_fee,
            max_priority_fee,
            estimated_cost_wei,
        }
    }
}

/// Apply deny-list, allow-list, and spend-cap checks, in that order.
pub fn validate(intent: &Intent, policy: &Policy) -> Result<(), PolicyError> {
    let value = intent.value_wei.ok_or(PolicyError::ValueMissing)?;

    if policy.deny_to.contains(&intent.to) {
        return Err(PolicyError::DeniedDestination);
    }
    if !policy.allow_to.is_empty() && !policy.allow_to.contains(&intent.to) {
        return Err(PolicyError::NotAllowlisted);
    }
    if let Some(max) = policy.max_per_tx_wei {
        if value > max {
            return Err(PolicyError::OverPerTxLimit);
        }
    }
    Ok(())
}

/// Resolve nonce, fees, and gas, then emit the unsigned dynamic-fee
/// transaction alongside the preview figures.
pub async fn build_unsigned(
    client: &ChainClient,
    intent: &Intent,
) -> Result<(TxEip1559, SuggestedFees)> {
    let value = intent.value_wei.ok_or(PolicyError::ValueMissing)?;

    let nonce = match intent.nonce {
        Some(n) => n,
        None => client.pending_nonce(&intent.chain, intent.from).await?,
    };

    let (max_fee, max_priority_fee) = match (intent.max_fee, intent.max_priority_fee) {
        (Some(fee), Some(tip)) => (fee, tip),
        (fee, tip) => {
            let suggested_tip = client.suggest_gas_tip_cap(&intent.chain).await?;
            let suggested_fee = client.suggest_gas_price(&intent.chain).await?;
            (fee.unwrap_or(suggested_fee), tip.unwrap_or(suggested_tip))
        }
    };

    let call = TransactionRequest {
        from: Some(intent.from),
        to: Some(TxKind::Call(intent.to)),
        value: Some(value),
        max_fee_per_gas: Some(max_fee),
        max_priority_fee_per_gas: Some(max_priority_fee),
        input: TransactionInput::new(Bytes::from(intent.data.clone())),
        ..Default::default()
    };

    let gas_limit = match intent.gas_limit {
        Some(limit) => limit,
        None => client.estimate_gas(&intent.chain, call.clone()).await?,
    };

    // Simulation hint only; a revert here must not block the preview.
    if let Err(err) = client.call(&intent.chain, call).await {
        debug!("simulation call failed: {err:#}");
    }

    let tx = TxEip1559 {
        chain_id: 0, // set by the signer
        nonce,
        gas_limit,
        max_fee_per_gas: max_fee,
        max_priority_fee_per_gas: max_priority_fee,
        to: TxKind::Call(intent.to),
        value,
        access_list: Default::default(),
        input: Bytes::from(intent.data.clone()),
    };

    Ok((tx, SuggestedFees::new(gas_limit, max_fee, max_priority_fee, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn intent_to(to: Address, value: u64) -> Intent {
        Intent::new("sepolia", addr(1), to, U256::from(value))
    }

    #[test]
    fn test_empty_policy_allows() {
        assert!(validate(&intent_to(addr(2), 100), &Policy::default()).is_ok());
    }

    #[test]
    fn test_missing_value_is_rejected() {
        let mut intent = intent_to(addr(2), 0);
        intent.value_wei = None;
        assert_eq!(
            validate(&intent, &Policy::default()),
            Err(PolicyError::ValueMissing)
        );
    }

    #[test]
    fn test_deny_list_wins() {
        let policy = Policy {
            deny_to: vec![addr(0xbe)],
            ..Default::default()
        };
        assert_eq!(
            validate(&intent_to(addr(0xbe), 1), &policy),
            Err(PolicyError::DeniedDestination)
        );
        assert!(validate(&intent_to(addr(2), 1), &policy).is_ok());
    }

    #[test]
    fn test_allow_list_excludes_others() {
        let policy = Policy {
            allow_to: vec![addr(7)],
            ..Default::default()
        };
        assert!(validate(&intent_to(addr(7), 1), &policy).is_ok());
        assert_eq!(
            validate(&intent_to(addr(8), 1), &policy),
            Err(PolicyError::NotAllowlisted)
        );
    }

    #[test]
    fn test_per_tx_cap() {
        let policy = Policy {
            max_per_tx_wei: Some(U256::from(1000u64)),
            ..Default::default()
        };
        assert!(validate(&intent_to(addr(2), 1000), &policy).is_ok());
        assert_eq!(
            validate(&intent_to(addr(2), 1001), &policy),
            Err(PolicyError::OverPerTxLimit)
        );
    }

    #[test]
    fn test_estimated_cost_formula() {
        let fees = SuggestedFees::new(21_000, 50_000_000_000, 2_000_000_000, U256::from(7u64));
        let expected = U256::from(50_000_000_000u128) * U256::from(21_000u64) + U256::from(7u64);
        assert_eq!(fees.estimated_cost_wei, expected);
    }
}
