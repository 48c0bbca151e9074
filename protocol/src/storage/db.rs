//! # LedgerDb - Persistent Storage Engine
//!
//! The sled-backed [`LedgerStore`]. All on-disk ledger state flows through
//! this module.
//!
//! ## Tree Layout
//!
//! | Tree               | Key                        | Value                   |
//! |--------------------|----------------------------|-------------------------|
//! | `wallets`          | address (UTF-8)            | `bincode(Wallet)`       |
//! | `positions`        | position id (UTF-8)        | `bincode(YieldPosition)`|
//! | `wallet_positions` | `address \0 position id`   | empty                   |
//!
//! The NUL separator keeps one wallet's index entries from matching
//! another wallet whose address happens to extend it.
//!
//! ## Atomicity
//!
//! Wallet swaps use sled's native `compare_and_swap` on the serialized
//! bytes. Position swaps run as a multi-tree transaction so the position
//! and its index entry land together or not at all.

use std::path::Path;

use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::{Db, Transactional, Tree};

use super::{sort_positions, LedgerStore, StoreError, StoreResult};
use crate::ledger::{Wallet, YieldPosition};

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn index_key(address: &str, position_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(address.len() + 1 + position_id.len());
    key.extend_from_slice(address.as_bytes());
    key.push(0);
    key.extend_from_slice(position_id.as_bytes());
    key
}

fn index_prefix(address: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(address.len() + 1);
    prefix.extend_from_slice(address.as_bytes());
    prefix.push(0);
    prefix
}

/// Persistent ledger store.
///
/// # Thread Safety
///
/// sled trees are safe for concurrent use, so `LedgerDb` can be shared via
/// `Arc` without extra locking.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    wallets: Tree,
    positions: Tree,
    wallet_positions: Tree,
}

impl LedgerDb {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Throwaway database, removed when dropped.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let wallets = db.open_tree("wallets")?;
        let positions = db.open_tree("positions")?;
        let wallet_positions = db.open_tree("wallet_positions")?;
        Ok(Self {
            db,
            wallets,
            positions,
            wallet_positions,
        })
    }

    /// Blocks until pending writes are durable.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl LedgerStore for LedgerDb {
    fn load_wallet(&self, address: &str) -> StoreResult<Option<Wallet>> {
        match self.wallets.get(address.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_wallet(&self, wallet: &Wallet) -> StoreResult<()> {
        self.wallets
            .insert(wallet.address().as_bytes(), encode(wallet)?)?;
        Ok(())
    }

    fn swap_wallet(&self, expected: Option<&Wallet>, new: &Wallet) -> StoreResult<bool> {
        let old = expected.map(encode).transpose()?;
        let swapped =
            self.wallets
                .compare_and_swap(new.address().as_bytes(), old, Some(encode(new)?))?;
        Ok(swapped.is_ok())
    }

    fn load_position(&self, position_id: &str) -> StoreResult<Option<YieldPosition>> {
        match self.positions.get(position_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_position(&self, position: &YieldPosition) -> StoreResult<()> {
        let bytes = encode(position)?;
        let key = position.position_id().as_bytes();
        let index = index_key(position.wallet(), position.position_id());

        (&self.positions, &self.wallet_positions)
            .transaction(
                |(positions, idx)| -> ConflictableTransactionResult<(), ()> {
                    positions.insert(key, bytes.clone())?;
                    idx.insert(index.clone(), Vec::<u8>::new())?;
                    Ok(())
                },
            )
            .map_err(transaction_error)
    }

    fn swap_position(
        &self,
        expected: Option<&YieldPosition>,
        new: &YieldPosition,
    ) -> StoreResult<bool> {
        let old = expected.map(encode).transpose()?;
        let bytes = encode(new)?;
        let key = new.position_id().as_bytes();
        let index = index_key(new.wallet(), new.position_id());

        (&self.positions, &self.wallet_positions)
            .transaction(
                |(positions, idx)| -> ConflictableTransactionResult<bool, ()> {
                    let current = positions.get(key)?;
                    if current.as_deref() != old.as_deref() {
                        return Ok(false);
                    }
                    positions.insert(key, bytes.clone())?;
                    idx.insert(index.clone(), Vec::<u8>::new())?;
                    Ok(true)
                },
            )
            .map_err(transaction_error)
    }

    fn positions_for_wallet(&self, address: &str) -> StoreResult<Vec<YieldPosition>> {
        let prefix = index_prefix(address);
        let mut owned = Vec::new();
        for entry in self.wallet_positions.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let position_id = &key[prefix.len()..];
            if let Some(bytes) = self.positions.get(position_id)? {
                owned.push(decode::<YieldPosition>(&bytes)?);
            }
        }
        sort_positions(&mut owned);
        Ok(owned)
    }

    fn wallet_count(&self) -> StoreResult<usize> {
        Ok(self.wallets.len())
    }

    fn position_count(&self) -> StoreResult<usize> {
        Ok(self.positions.len())
    }
}

fn transaction_error(err: TransactionError<()>) -> StoreError {
    match err {
        TransactionError::Storage(e) => StoreError::Sled(e),
        TransactionError::Abort(()) => StoreError::Transaction("aborted".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::units;

    #[test]
    fn open_temporary_database() {
        let db = LedgerDb::open_temporary().expect("should create temp db");
        assert_eq!(db.wallet_count().unwrap(), 0);
        assert_eq!(db.position_count().unwrap(), 0);
    }

    #[test]
    fn wallet_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = LedgerDb::open(dir.path()).expect("open");
            let mut w = Wallet::new("0xabc");
            w.credit(units(42)).unwrap();
            db.put_wallet(&w).unwrap();
            db.flush().unwrap();
        }

        let db = LedgerDb::open(dir.path()).expect("reopen");
        let w = db.load_wallet("0xabc").unwrap().expect("persisted");
        assert_eq!(w.balance(), units(42));
    }

    #[test]
    fn wallet_compare_and_swap() {
        let db = LedgerDb::open_temporary().unwrap();
        let original = Wallet::new("0xabc");
        assert!(db.swap_wallet(None, &original).unwrap());
        assert!(!db.swap_wallet(None, &original).unwrap());

        let mut next = original.clone();
        next.credit(units(5)).unwrap();
        assert!(db.swap_wallet(Some(&original), &next).unwrap());
        assert!(!db.swap_wallet(Some(&original), &next).unwrap());
        assert_eq!(db.load_wallet("0xabc").unwrap().unwrap(), next);
    }

    #[test]
    fn position_swap_maintains_index() {
        let db = LedgerDb::open_temporary().unwrap();
        let p = YieldPosition::open("0xabc-0001".into(), "0xabc", "aave", units(10), 450);
        assert!(db.swap_position(None, &p).unwrap());
        assert!(!db.swap_position(None, &p).unwrap());

        let mut closed = p.clone();
        closed.close().unwrap();
        assert!(db.swap_position(Some(&p), &closed).unwrap());

        let listed = db.positions_for_wallet("0xabc").unwrap();
        assert_eq!(listed, vec![closed]);
    }

    #[test]
    fn index_prefix_does_not_leak_between_wallets() {
        let db = LedgerDb::open_temporary().unwrap();
        let short = YieldPosition::open("0xab-1".into(), "0xab", "aave", units(1), 450);
        let long = YieldPosition::open("0xabc-1".into(), "0xabc", "aave", units(1), 450);
        db.put_position(&short).unwrap();
        db.put_position(&long).unwrap();

        let listed = db.positions_for_wallet("0xab").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].wallet(), "0xab");
    }
}
