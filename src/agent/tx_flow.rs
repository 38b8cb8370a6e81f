//! Sign-and-broadcast flow
//!
//! The only path from an unsigned transaction to the network. The signer is
//! unlocked per call with the operator's password, used once, and locked
//! again before returning, so key material never outlives the broadcast.

use alloy::consensus::TxEip1559;
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};

use crate::chain::ChainClient;
use crate::wallet::KeystoreManager;

/// Unlock, sign with the chain's canonical id, broadcast, and return the
/// transaction hash.
pub async fn sign_and_send(
    keystore: &KeystoreManager,
    chain_client: &ChainClient,
    chain: &str,
    from: Address,
    password: &str,
    unsigned: TxEip1559,
    chain_id: u64,
) -> Result<B256> {
    let signer = keystore
        .get_signer(from, password)
        .context("failed to unlock signer")?;

    let envelope = signer.sign_tx(unsigned, chain_id);
    signer.lock();
    let envelope = envelope.context("failed to sign tx")?;

    let raw = envelope.encoded_2718();
    chain_client
        .send_raw_transaction(chain, &raw)
        .await
        .context("failed to send tx")
}
