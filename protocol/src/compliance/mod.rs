//! # Compliance
//!
//! KYC tiers and the gate that enforces them. A wallet starts at
//! [`KycTier::None`], gets verified once into `basic` or `full`, and can
//! only ever move up from there. Each tier carries a per-transaction
//! ceiling that the ledger checks on mint.

pub mod gate;
pub mod tier;

pub use gate::{
    ComplianceDecision, ComplianceGate, FixedProvider, LimitCheck, ProviderSelector,
    RandomProvider, RoundRobinProvider,
};
pub use tier::KycTier;
