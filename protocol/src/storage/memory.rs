//! In-memory [`LedgerStore`] on `DashMap`.
//!
//! Compare-and-swap runs under the key's shard lock via the entry API, so
//! it is atomic with respect to every other operation on the same key.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{sort_positions, LedgerStore, StoreResult};
use crate::ledger::{Wallet, YieldPosition};

#[derive(Debug, Default)]
pub struct MemoryStore {
    wallets: DashMap<String, Wallet>,
    positions: DashMap<String, YieldPosition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared compare-and-swap over a DashMap entry.
fn swap_entry<V: Clone + PartialEq>(
    map: &DashMap<String, V>,
    key: &str,
    expected: Option<&V>,
    new: &V,
) -> bool {
    match map.entry(key.to_string()) {
        Entry::Occupied(mut slot) => match expected {
            Some(exp) if slot.get() == exp => {
                slot.insert(new.clone());
                true
            }
            _ => false,
        },
        Entry::Vacant(slot) => match expected {
            None => {
                slot.insert(new.clone());
                true
            }
            Some(_) => false,
        },
    }
}

impl LedgerStore for MemoryStore {
    fn load_wallet(&self, address: &str) -> StoreResult<Option<Wallet>> {
        Ok(self.wallets.get(address).map(|w| w.value().clone()))
    }

    fn put_wallet(&self, wallet: &Wallet) -> StoreResult<()> {
        self.wallets
            .insert(wallet.address().to_string(), wallet.clone());
        Ok(())
    }

    fn swap_wallet(&self, expected: Option<&Wallet>, new: &Wallet) -> StoreResult<bool> {
        Ok(swap_entry(&self.wallets, new.address(), expected, new))
    }

    fn load_position(&self, position_id: &str) -> StoreResult<Option<YieldPosition>> {
        Ok(self.positions.get(position_id).map(|p| p.value().clone()))
    }

    fn put_position(&self, position: &YieldPosition) -> StoreResult<()> {
        self.positions
            .insert(position.position_id().to_string(), position.clone());
        Ok(())
    }

    fn swap_position(
        &self,
        expected: Option<&YieldPosition>,
        new: &YieldPosition,
    ) -> StoreResult<bool> {
        Ok(swap_entry(&self.positions, new.position_id(), expected, new))
    }

    fn positions_for_wallet(&self, address: &str) -> StoreResult<Vec<YieldPosition>> {
        let mut owned: Vec<YieldPosition> = self
            .positions
            .iter()
            .filter(|p| p.wallet() == address)
            .map(|p| p.value().clone())
            .collect();
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
