// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Harbor Protocol - Core Library
//!
//! Harbor decides where deposited stablecoin capital should earn yield,
//! whether hauling that capital to another chain is worth the bridge fees,
//! and whether a wallet is allowed to mint or redeem at all. It also owns
//! the ledger that records the outcome, and that ledger stays consistent
//! when a thousand callers hit the same wallet at once.
//!
//! ## Architecture
//!
//! ```text
//!   mint / redeem / deposit
//!            │
//!            ▼
//!   ┌─────────────────┐     ┌──────────────────┐
//!   │ ComplianceGate  │────▶│      Ledger      │──▶ LedgerStore (memory | sled)
//!   └─────────────────┘     └────────┬─────────┘
//!                                    │ APY snapshot
//!                                    ▼
//!   ┌─────────────────┐     ┌──────────────────┐
//!   │ YieldOptimizer  │────▶│ ProtocolRegistry │
//!   └─────────────────┘     └──────────────────┘
//!
//!   CrossChainRouter and PriceMonitor are pure and stand on their own.
//! ```
//!
//! - **market** - Protocol registry, yield optimizer, cross-chain router,
//!   price deviation monitor. Pure decision logic, no state between calls.
//! - **compliance** - KYC tiers and the gate that enforces their ceilings.
//! - **ledger** - Wallets, yield positions and the per-wallet critical
//!   sections that keep them honest.
//! - **storage** - The repository abstraction plus in-memory and sled
//!   backends.
//! - **events** - Structured ledger events for whoever is listening.
//! - **service** - One facade over all of the above for outer surfaces.
//! - **units** - Fixed-point money. Micros and basis points, never floats.
//! - **config** - Documented defaults and the runtime configuration object.
//!
//! ## Design Philosophy
//!
//! 1. Money is an integer. Display formatting is the only place a decimal
//!    point shows up.
//! 2. Every rejection is a value the caller can match on.
//! 3. The registry, optimizer and router never lock anything. Only the
//!    ledger does, and only per wallet.

pub mod compliance;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod market;
pub mod service;
pub mod storage;
pub mod units;

pub use error::{CoreError, CoreResult, ErrorKind};
pub use service::ProtocolService;
