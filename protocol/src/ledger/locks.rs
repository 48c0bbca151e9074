//! Per-wallet lock table.
//!
//! One `Mutex<()>` per wallet address, created on first use and kept for
//! the life of the process. The ledger only locks addresses that already
//! have a wallet or are about to get one, and wallets are never deleted, so
//! the table is bounded by the wallet count. Operations on different wallets
//! never contend.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct WalletLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding `address`'s lock.
    ///
    /// The lock handle is cloned out of the map before locking, so the
    /// shard guard is released and a long critical section on one wallet
    /// does not block lookups for its neighbours.
    pub fn with_wallet<R>(&self, address: &str, f: impl FnOnce() -> R) -> R {
        let lock = self
            .locks
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();
        f()
    }

    /// Number of wallets that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
