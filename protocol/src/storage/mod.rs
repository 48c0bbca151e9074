//! # Storage Module
//!
//! The ledger's repository abstraction. The ledger never touches a map or a
//! database directly; it talks to a [`LedgerStore`], which offers get, put
//! and compare-and-swap per key.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs    - LedgerStore trait and StoreError
//! memory.rs - DashMap-backed store for tests and ephemeral nodes
//! db.rs     - sled-backed persistent store
//! ```
//!
//! ## Layout
//!
//! | Table       | Key           | Value           |
//! |-------------|---------------|-----------------|
//! | wallets     | address       | `Wallet`        |
//! | positions   | position id   | `YieldPosition` |
//!
//! The sled store adds a `wallet_positions` index tree so listing a
//! wallet's positions is a prefix scan rather than a full table walk.
//!
//! ## Compare-and-Swap
//!
//! `swap_*(expected, new)` replaces the stored record only if it currently
//! equals `expected`, where `None` means "absent". It returns `Ok(false)`
//! on a mismatch and never partially applies.

pub mod db;
pub mod memory;

pub use db::LedgerDb;
pub use memory::MemoryStore;

use crate::ledger::{Wallet, YieldPosition};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors from a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transaction aborted: {0}")]
    Transaction(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// What the ledger needs from a backing store.
pub trait LedgerStore: Send + Sync {
    fn load_wallet(&self, address: &str) -> StoreResult<Option<Wallet>>;

    /// Unconditional write.
    fn put_wallet(&self, wallet: &Wallet) -> StoreResult<()>;

    /// Writes `new` only if the stored wallet equals `expected`.
    fn swap_wallet(&self, expected: Option<&Wallet>, new: &Wallet) -> StoreResult<bool>;

    fn load_position(&self, position_id: &str) -> StoreResult<Option<YieldPosition>>;

    /// Unconditional write.
    fn put_position(&self, position: &YieldPosition) -> StoreResult<()>;

    /// Writes `new` only if the stored position equals `expected`.
    fn swap_position(
        &self,
        expected: Option<&YieldPosition>,
        new: &YieldPosition,
    ) -> StoreResult<bool>;

    /// Every position owned by `address`, oldest first.
    fn positions_for_wallet(&self, address: &str) -> StoreResult<Vec<YieldPosition>>;

    fn wallet_count(&self) -> StoreResult<usize>;

    fn position_count(&self) -> StoreResult<usize>;
}

/// Oldest first, position id as tiebreak.
pub(crate) fn sort_positions(positions: &mut [YieldPosition]) {
    positions.sort_by(|a, b| {
        a.opened_at()
            .cmp(&b.opened_at())
            .then_with(|| a.position_id().cmp(b.position_id()))
    });
}
