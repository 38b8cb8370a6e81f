//! Wallet key management
//!
//! An encrypted on-disk keystore and a lockable signer. The signer is the
//! only component that ever touches raw key material; locking it scrubs the
//! key bytes from memory.

pub mod keystore;

use thiserror::Error;

pub use keystore::{Account, KeystoreManager, KeystoreSigner};

/// Wallet errors callers need to distinguish.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("account not found")]
    AccountNotFound,
    #[error("account is locked")]
    AccountLocked,
    #[error("invalid private key")]
    InvalidKey,
    #[error("password required to sign")]
    PasswordRequired,
}
