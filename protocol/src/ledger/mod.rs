//! # Ledger
//!
//! The only component in Harbor that owns mutable state. Wallets and yield
//! positions live here, and every change to them goes through
//! [`engine::Ledger`], which runs each wallet's check-then-write sequence as
//! one critical section keyed by the wallet address.
//!
//! ## Architecture
//!
//! ```text
//! wallet.rs   - Wallet record: balance, collateral ratio, KYC state
//! position.rs - YieldPosition record and its one-way lifecycle
//! receipt.rs  - Mint / redeem receipts handed back to callers
//! ids.rs      - Injectable transaction and position id generation
//! locks.rs    - Per-wallet lock table
//! engine.rs   - The Ledger itself
//! ```
//!
//! Writes go through the store's compare-and-swap even though the wallet
//! lock is held. A failed swap under the lock means another writer bypassed
//! the lock, and the operation aborts with an invariant violation instead of
//! silently overwriting.

pub mod engine;
pub mod ids;
pub mod locks;
pub mod position;
pub mod receipt;
pub mod wallet;

pub use engine::{Ledger, LedgerBuilder};
pub use ids::{position_id, IdGenerator, SequentialIds, UuidGenerator};
pub use locks::WalletLocks;
pub use position::{PositionStatus, YieldPosition};
pub use receipt::{MintReceipt, RedeemReceipt};
pub use wallet::Wallet;
