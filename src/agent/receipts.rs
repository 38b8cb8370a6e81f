//! Receipt store
//!
//! SQLite-backed persistence for transaction receipts, keyed by
//! `(chain, tx_hash)`. Upserts are idempotent so re-fetching a receipt
//! never duplicates rows.

use std::path::Path;
use std::sync::Mutex;

use alloy::rpc::types::TransactionReceipt;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS receipts (
    chain TEXT NOT NULL,
    tx_hash TEXT NOT NULL,
    status INTEGER,
    gas_used INTEGER,
    raw_json TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (chain, tx_hash)
);
";

/// A stored receipt row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredReceipt {
    pub chain: String,
    pub tx_hash: String,
    pub status: u64,
    pub gas_used: u64,
    pub raw_json: String,
    pub created_at: String,
}

/// Receipt persistence over an embedded SQLite file.
pub struct ReceiptStore {
    conn: Mutex<Connection>,
}

impl ReceiptStore {
    /// Open (or create) `<data_dir>/receipts.db`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("receipts.db");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open receipts db: {}", db_path.display()))?;
        Self::with_connection(conn)
    }

    /// In-memory store for tests and data-dir-less operation.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE)
            .context("failed to create receipts table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist a chain receipt. Replaces any prior row for the same
    /// `(chain, tx_hash)`.
    pub fn upsert(&self, chain: &str, receipt: &TransactionReceipt) -> Result<()> {
        let raw = serde_json::to_string(receipt).context("failed to serialize receipt")?;
        self.upsert_row(
            chain,
            &receipt.transaction_hash.to_string(),
            receipt.status() as u64,
            receipt.gas_used as u64,
            &raw,
        )
    }

    /// Row-level upsert; the typed `upsert` delegates here.
    pub fn upsert_row(
        &self,
        chain: &str,
        tx_hash: &str,
        status: u64,
        gas_used: u64,
        raw_json: &str,
    ) -> Result<()> {
        if chain.is_empty() {
            bail!("chain is required");
        }
        if tx_hash.is_empty() {
            bail!("tx hash is required");
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO receipts (chain, tx_hash, status, gas_used, raw_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(chain, tx_hash) DO UPDATE SET
                 status = excluded.status,
                 gas_used = excluded.gas_used,
                 raw_json = excluded.raw_json",
            params![chain, tx_hash, status as i64, gas_used as i64, raw_json],
        )
        .context("failed to persist receipt")?;
        Ok(())
    }

    /// Point lookup by `(chain, tx_hash)`.
    pub fn get(&self, chain: &str, tx_hash: &str) -> Result<Option<StoredReceipt>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT chain, tx_hash, COALESCE(status, 0), COALESCE(gas_used, 0),
                        COALESCE(raw_json, ''), created_at
                 FROM receipts WHERE chain = ?1 AND tx_hash = ?2",
                params![chain, tx_hash],
                |row| {
                    Ok(StoredReceipt {
                        chain: row.get(0)?,
                        tx_hash: row.get(1)?,
                        status: row.get::<_, i64>(2)? as u64,
                        gas_used: row.get::<_, i64>(3)? as u64,
                        raw_json: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0xabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabc0";

    #[test]
    fn test_upsert_then_get() {
        let store = ReceiptStore::open_in_memory().unwrap();
        store.upsert_row("base", HASH, 1, 21_000, "{}").unwrap();

        let stored = store.get("base", HASH).unwrap().unwrap();
        assert_eq!(stored.chain, "base");
        assert_eq!(stored.tx_hash, HASH);
        assert_eq!(stored.status, 1);
        assert_eq!(stored.gas_used, 21_000);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = ReceiptStore::open_in_memory().unwrap();
        store.upsert_row("base", HASH, 1, 21_000, "{\"a\":1}").unwrap();
        let first = store.get("base", HASH).unwrap().unwrap();

        store.upsert_row("base", HASH, 1, 21_000, "{\"a\":1}").unwrap();
        let second = store.get("base", HASH).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_upsert_replaces_prior_body() {
        let store = ReceiptStore::open_in_memory().unwrap();
        store.upsert_row("base", HASH, 0, 21_000, "{}").unwrap();
        store.upsert_row("base", HASH, 1, 42_000, "{\"r\":2}").unwrap();

        let stored = store.get("base", HASH).unwrap().unwrap();
        assert_eq!(stored.status, 1);
        assert_eq!(stored.gas_used, 42_000);
        assert_eq!(stored.raw_json, "{\"r\":2}");
    }

    #[test]
    fn test_miss_returns_none() {
        let store = ReceiptStore::open_in_memory().unwrap();
        assert!(store.get("base", HASH).unwrap().is_none());
        store.upsert_row("base", HASH, 1, 1, "{}").unwrap();
        assert!(store.get("ethereum", HASH).unwrap().is_none());
    }

    #[test]
    fn test_empty_keys_rejected() {
        let store = ReceiptStore::open_in_memory().unwrap();
        assert!(store.upsert_row("", HASH, 1, 1, "{}").is_err());
        assert!(store.upsert_row("base", "", 1, 1, "{}").is_err());
    }
}
