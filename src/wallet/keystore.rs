//! Encrypted keystore
//!
//! One JSON file per account under `<data_dir>/keystore/`, each holding the
//! private key encrypted with an argon2id-derived AES-256-GCM key. The
//! decrypted key lives only inside a `KeystoreSigner`, which zeroizes it on
//! `lock()`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::network::TxSignerSync;
use alloy::primitives::{eip191_hash_message, keccak256, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use anyhow::{anyhow, Context, Result};
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::WalletError;

const KEYSTORE_DIR_NAME: &str = "keystore";
const NONCE_LEN: usize = 12;

/// A keystore account as listed to callers. The first account by creation
/// time is the default signer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub created_at: String,
}

/// On-disk account file.
#[derive(Serialize, Deserialize)]
struct KeystoreFile {
    address: String,
    crypto: CryptoBlob,
    created_at: String,
}

/// Encrypted key material: argon2id salt plus base64(nonce + ciphertext).
#[derive(Serialize, Deserialize)]
struct CryptoBlob {
    kdf: String,
    salt: String,
    payload: String,
}

/// Manages the keystore directory and its accounts.
pub struct KeystoreManager {
    dir: PathBuf,
}

impl KeystoreManager {
    /// Open (or create) the keystore directory under `data_dir` with mode
    /// 0700.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join(KEYSTORE_DIR_NAME);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create keystore directory: {}", dir.display()))?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
            .context("failed to set keystore directory permissions")?;
        Ok(Self { dir })
    }

    /// Generate a fresh account encrypted with `password`.
    pub fn create_account(&self, password: &str) -> Result<Account> {
        let signer = PrivateKeySigner::random();
        let key_bytes: Zeroizing<[u8; 32]> =
            Zeroizing::new(signer.credential().to_bytes().into());
        self.write_account(signer.address(), &key_bytes, password)
    }

    /// Import a hex private key (with or without `0x`) and encrypt it with
    /// `password`.
    pub fn import_key(&self, private_key_hex: &str, password: &str) -> Result<Account> {
        let hex_str = private_key_hex.trim().trim_start_matches("0x");
        let mut raw = hex::decode(hex_str).map_err(|_| WalletError::InvalidKey)?;
        if raw.len() != 32 {
            raw.zeroize();
            return Err(WalletError::InvalidKey.into());
        }

        let mut key_bytes = Zeroizing::new([0u8; 32]);
        key_bytes.copy_from_slice(&raw);
        raw.zeroize();

        let signer = PrivateKeySigner::from_bytes(&B256::from(*key_bytes))
            .map_err(|_| WalletError::InvalidKey)?;
        self.write_account(signer.address(), &key_bytes, password)
    }

    /// All accounts, sorted by creation time.
    pub fn list_accounts(&self) -> Vec<Account> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut accounts: Vec<Account> = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| {
                let contents = fs::read_to_string(e.path()).ok()?;
                let file: KeystoreFile = serde_json::from_str(&contents).ok()?;
                Some(Account {
                    address: file.address.parse().ok()?,
                    created_at: file.created_at,
                })
            })
            .collect();

        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        accounts
    }

    /// Decrypt the key for `address` and return an unlocked signer. Fails
    /// with `AccountNotFound` for unknown addresses; a wrong password shows
    /// up as a decryption failure.
    pub fn get_signer(&self, address: Address, password: &str) -> Result<KeystoreSigner> {
        let path = self.account_path(address);
        if !path.exists() {
            return Err(WalletError::AccountNotFound.into());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: KeystoreFile =
            serde_json::from_str(&contents).context("failed to parse keystore file")?;

        let key_bytes = decrypt_key(&file.crypto, password)?;
        Ok(KeystoreSigner::new(address, key_bytes))
    }

    fn account_path(&self, address: Address) -> PathBuf {
        self.dir
            .join(format!("{}.json", address.to_string().to_lowercase()))
    }

    fn write_account(
        &self,
        address: Address,
        key_bytes: &[u8; 32],
        password: &str,
    ) -> Result<Account> {
        let created_at = Utc::now().to_rfc3339();
        let file = KeystoreFile {
            address: address.to_string(),
            crypto: encrypt_key(key_bytes, password)?,
            created_at: created_at.clone(),
        };

        let path = self.account_path(address);
        let json = serde_json::to_string_pretty(&file).context("failed to serialize keystore")?;
        fs::write(&path, &json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .context("failed to set keystore file permissions")?;

        Ok(Account {
            address,
            created_at,
        })
    }
}

/// Derive an AES-256 key from the password and salt via argon2id.
fn derive_key(password: &str, salt: &SaltString) -> Result<Zeroizing<[u8; 32]>> {
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), salt)
        .map_err(|e| anyhow!("key derivation failed: {e}"))?;
    let raw = hash.hash.ok_or_else(|| anyhow!("key derivation produced no output"))?;

    let mut key = Zeroizing::new([0u8; 32]);
    let bytes = raw.as_bytes();
    if bytes.len() < 32 {
        return Err(anyhow!("derived key too short"));
    }
    key.copy_from_slice(&bytes[..32]);
    Ok(key)
}

fn encrypt_key(key_bytes: &[u8; 32], password: &str) -> Result<CryptoBlob> {
    let salt = SaltString::generate(&mut OsRng);
    let derived = derive_key(password, &salt)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(derived.as_ref()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, key_bytes.as_slice())
        .map_err(|e| anyhow!("encryption failed: {e}"))?;

    let mut payload = nonce.to_vec();
    payload.extend_from_slice(&ciphertext);

    Ok(CryptoBlob {
        kdf: "argon2id".to_string(),
        salt: salt.as_str().to_string(),
        payload: BASE64.encode(payload),
    })
}

fn decrypt_key(blob: &CryptoBlob, password: &str) -> Result<Zeroizing<[u8; 32]>> {
    let salt = SaltString::from_b64(&blob.salt).map_err(|e| anyhow!("invalid salt: {e}"))?;
    let derived = derive_key(password, &salt)?;

    let payload = BASE64
        .decode(&blob.payload)
        .context("invalid keystore payload")?;
    if payload.len() < NONCE_LEN {
        return Err(anyhow!("invalid keystore payload: too short"));
    }

    let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(derived.as_ref()));
    let mut plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| anyhow!("failed to unlock account: wrong password?"))?;

    if plaintext.len() != 32 {
        plaintext.zeroize();
        return Err(anyhow!("invalid key material in keystore"));
    }

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&plaintext);
    plaintext.zeroize();
    Ok(key)
}

/// An unlocked signing handle. The private key stays inside until `lock()`
/// overwrites it; every signing call after that fails `AccountLocked`.
#[derive(Debug)]
pub struct KeystoreSigner {
    address: Address,
    key: Mutex<Option<Zeroizing<[u8; 32]>>>,
}

impl KeystoreSigner {
    fn new(address: Address, key: Zeroizing<[u8; 32]>) -> Self {
        Self {
            address,
            key: Mutex::new(Some(key)),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign an EIP-1559 transaction, binding it to `chain_id` (EIP-155
    /// replay protection). Returns the signed envelope ready for encoding.
    pub fn sign_tx(&self, mut tx: TxEip1559, chain_id: u64) -> Result<TxEnvelope> {
        let guard = self.key.lock().unwrap();
        let key = guard.as_ref().ok_or(WalletError::AccountLocked)?;

        let signer = PrivateKeySigner::from_bytes(&B256::from(**key))
            .map_err(|_| WalletError::InvalidKey)?;

        tx.chain_id = chain_id;
        let signature = signer
            .sign_transaction_sync(&mut tx)
            .context("failed to sign transaction")?;

        Ok(TxEnvelope::from(tx.into_signed(signature)))
    }

    /// Sign an arbitrary message under the EIP-191 personal-sign prefix.
    /// The prefix keeps signed messages from doubling as transactions; V is
    /// shifted to {27, 28} for ecrecover compatibility.
    pub fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = eip191_hash_message(message);
        self.sign_digest(digest)
    }

    /// Sign typed data by hashing the raw payload. This is not full EIP-712
    /// domain/struct hashing; callers needing compliant typed-data
    /// signatures must hash the structure themselves first.
    pub fn sign_typed_data(&self, typed_data: &[u8]) -> Result<Vec<u8>> {
        self.sign_digest(keccak256(typed_data))
    }

    fn sign_digest(&self, digest: B256) -> Result<Vec<u8>> {
        let guard = self.key.lock().unwrap();
        let key = guard.as_ref().ok_or(WalletError::AccountLocked)?;

        let signer = PrivateKeySigner::from_bytes(&B256::from(**key))
            .map_err(|_| WalletError::InvalidKey)?;
        let signature = signer
            .sign_hash_sync(&digest)
            .context("failed to sign digest")?;

        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&signature.r().to_be_bytes::<32>());
        out.extend_from_slice(&signature.s().to_be_bytes::<32>());
        out.push(27 + signature.v() as u8);
        Ok(out)
    }

    /// Overwrite the key material and drop it. Idempotent; all signing
    /// calls fail `AccountLocked` afterwards.
    pub fn lock(&self) {
        let mut guard = self.key.lock().unwrap();
        if let Some(mut key) = guard.take() {
            key.as_mut().zeroize();
        }
    }
}

impl Drop for KeystoreSigner {
    fn drop(&mut self) {
        self.lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::WalletError;
    use alloy::primitives::{TxKind, U256};
    use tempfile::tempdir;

    fn unsigned_tx() -> TxEip1559 {
        TxEip1559 {
            chain_id: 0,
            nonce: 1,
            gas_limit: 21_000,
            max_fee_per_gas: 50_000_000_000,
            max_priority_fee_per_gas: 2_000_000_000,
            to: TxKind::Call(Address::from([2u8; 20])),
            value: U256::from(1u64),
            access_list: Default::default(),
            input: Default::default(),
        }
    }

    #[test]
    fn test_create_and_list_accounts() {
        let dir = tempdir().unwrap();
        let km = KeystoreManager::new(dir.path()).unwrap();
        assert!(km.list_accounts().is_empty());

        let account = km.create_account("hunter2").unwrap();
        let listed = km.list_accounts();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].address, account.address);
    }

    #[test]
    fn test_keystore_file_mode_is_0600() {
        let dir = tempdir().unwrap();
        let km = KeystoreManager::new(dir.path()).unwrap();
        let account = km.create_account("pw").unwrap();

        let path = dir
            .path()
            .join(KEYSTORE_DIR_NAME)
            .join(format!("{}.json", account.address.to_string().to_lowercase()));
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_unlock_and_sign_with_correct_password() {
        let dir = tempdir().unwrap();
        let km = KeystoreManager::new(dir.path()).unwrap();
        let account = km.create_account("pw").unwrap();

        let signer = km.get_signer(account.address, "pw").unwrap();
        assert_eq!(signer.address(), account.address);

        let envelope = signer.sign_tx(unsigned_tx(), 11155111).unwrap();
        assert!(envelope.is_eip1559());
    }

    #[test]
    fn test_wrong_password_fails_to_unlock() {
        let dir = tempdir().unwrap();
        let km = KeystoreManager::new(dir.path()).unwrap();
        let account = km.create_account("correct").unwrap();
        assert!(km.get_signer(account.address, "wrong").is_err());
    }

    #[test]
    fn test_unknown_address_is_account_not_found() {
        let dir = tempdir().unwrap();
        let km = KeystoreManager::new(dir.path()).unwrap();
        let err = km.get_signer(Address::from([9u8; 20]), "pw").unwrap_err();
        assert_eq!(
            err.downcast_ref::<WalletError>(),
            Some(&WalletError::AccountNotFound)
        );
    }

    #[test]
    fn test_import_round_trips_address() {
        let dir = tempdir().unwrap();
        let km = KeystoreManager::new(dir.path()).unwrap();

        let original = PrivateKeySigner::random();
        let hex_key = format!("0x{}", hex::encode(original.credential().to_bytes()));
        let account = km.import_key(&hex_key, "pw").unwrap();
        assert_eq!(account.address, original.address());
    }

    #[test]
    fn test_import_rejects_invalid_key() {
        let dir = tempdir().unwrap();
        let km = KeystoreManager::new(dir.path()).unwrap();

        for bad in ["zz", "0x1234", ""] {
            let err = km.import_key(bad, "pw").unwrap_err();
            assert_eq!(
                err.downcast_ref::<WalletError>(),
                Some(&WalletError::InvalidKey),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_lock_is_idempotent_and_blocks_signing() {
        let dir = tempdir().unwrap();
        let km = KeystoreManager::new(dir.path()).unwrap();
        let account = km.create_account("pw").unwrap();
        let signer = km.get_signer(account.address, "pw").unwrap();

        signer.lock();
        signer.lock(); // no-op

        let err = signer.sign_tx(unsigned_tx(), 1).unwrap_err();
        assert_eq!(
            err.downcast_ref::<WalletError>(),
            Some(&WalletError::AccountLocked)
        );
        let err = signer.sign_message(b"hello").unwrap_err();
        assert_eq!(
            err.downcast_ref::<WalletError>(),
            Some(&WalletError::AccountLocked)
        );
        let err = signer.sign_typed_data(b"{}").unwrap_err();
        assert_eq!(
            err.downcast_ref::<WalletError>(),
            Some(&WalletError::AccountLocked)
        );
    }

    #[test]
    fn test_sign_message_is_65_bytes_with_legacy_v() {
        let dir = tempdir().unwrap();
        let km = KeystoreManager::new(dir.path()).unwrap();
        let account = km.create_account("pw").unwrap();
        let signer = km.get_signer(account.address, "pw").unwrap();

        let sig = signer.sign_message(b"clifi").unwrap();
        assert_eq!(sig.len(), 65);
        assert!(sig[64] == 27 || sig[64] == 28);
    }
}
