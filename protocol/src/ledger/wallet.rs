//! # Wallet Record
//!
//! A [`Wallet`] is created the first time an address is referenced and is
//! never deleted. It starts empty and unverified:
//!
//! | Field              | Initial |
//! |--------------------|---------|
//! | `balance`          | 0       |
//! | `collateral_ratio` | 0       |
//! | `kyc_tier`         | none    |
//! | `kyc_verified`     | false   |
//!
//! Fields are private. The ledger mutates them through the methods below,
//! each of which bumps `version` so compare-and-swap can tell two otherwise
//! identical snapshots apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compliance::{ComplianceDecision, KycTier};
use crate::error::LedgerError;
use crate::units::{Bps, Micros};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    address: String,
    balance: Micros,
    collateral_ratio_bps: Bps,
    kyc_tier: KycTier,
    kyc_verified: bool,
    kyc_provider: Option<String>,
    /// Monotonic write counter.
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Fresh, empty, unverified wallet.
    pub fn new(address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            address: address.into(),
            balance: 0,
            collateral_ratio_bps: 0,
            kyc_tier: KycTier::None,
            kyc_verified: false,
            kyc_provider: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn balance(&self) -> Micros {
        self.balance
    }

    pub fn collateral_ratio_bps(&self) -> Bps {
        self.collateral_ratio_bps
    }

    pub fn kyc_tier(&self) -> KycTier {
        self.kyc_tier
    }

    pub fn kyc_verified(&self) -> bool {
        self.kyc_verified
    }

    pub fn kyc_provider(&self) -> Option<&str> {
        self.kyc_provider.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // -- Mutations (ledger only) -------------------------------------------

    /// Adds `amount` to the balance.
    pub(crate) fn credit(&mut self, amount: Micros) -> Result<Micros, LedgerError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::BalanceOverflow {
                wallet: self.address.clone(),
            })?;
        self.touch();
        Ok(self.balance)
    }

    /// Removes `amount` from the balance. Never goes below zero.
    pub(crate) fn debit(&mut self, amount: Micros) -> Result<Micros, LedgerError> {
        self.balance =
            self.balance
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::InsufficientBalance {
                    wallet: self.address.clone(),
                    available: self.balance,
                    requested: amount,
                })?;
        self.touch();
        Ok(self.balance)
    }

    /// Records a verification outcome. Tier only moves up; the gate has
    /// already rejected downgrades.
    pub(crate) fn apply_verification(&mut self, decision: &ComplianceDecision) {
        if decision.tier.rank() >= self.kyc_tier.rank() {
            self.kyc_tier = decision.tier;
        }
        self.kyc_verified = self.kyc_verified || decision.verified;
        self.kyc_provider = Some(decision.provider.clone());
        self.touch();
    }

    pub(crate) fn set_collateral_ratio(&mut self, ratio_bps: Bps) {
        self.collateral_ratio_bps = ratio_bps;
        self.touch();
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::units;

    fn decision(tier: KycTier) -> ComplianceDecision {
        ComplianceDecision {
            wallet: "0xabc".into(),
            verified: true,
            tier,
            max_transaction: 0,
            provider: "elliptic".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_wallet_is_empty_and_unverified() {
        let w = Wallet::new("0xabc");
        assert_eq!(w.address(), "0xabc");
        assert_eq!(w.balance(), 0);
        assert_eq!(w.collateral_ratio_bps(), 0);
        assert_eq!(w.kyc_tier(), KycTier::None);
        assert!(!w.kyc_verified());
        assert!(w.kyc_provider().is_none());
        assert_eq!(w.version(), 0);
    }

    #[test]
    fn credit_and_debit_bump_version() {
        let mut w = Wallet::new("0xabc");
        assert_eq!(w.credit(units(100)).unwrap(), units(100));
        assert_eq!(w.debit(units(30)).unwrap(), units(70));
        assert_eq!(w.version(), 2);
    }

    #[test]
    fn debit_below_zero_leaves_balance_untouched() {
        let mut w = Wallet::new("0xabc");
        w.credit(units(50)).unwrap();
        let err = w.debit(units(100)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { available, requested, .. }
                if available == units(50) && requested == units(100)
        ));
        assert_eq!(w.balance(), units(50));
        assert_eq!(w.version(), 1);
    }

    #[test]
    fn credit_overflow_detected() {
        let mut w = Wallet::new("0xabc");
        w.credit(u64::MAX).unwrap();
        assert!(matches!(w.credit(1), Err(LedgerError::BalanceOverflow { .. })));
        assert_eq!(w.balance(), u64::MAX);
    }

    #[test]
    fn verification_is_sticky() {
        let mut w = Wallet::new("0xabc");
        w.apply_verification(&decision(KycTier::Full));
        assert!(w.kyc_verified());
        assert_eq!(w.kyc_tier(), KycTier::Full);
        assert_eq!(w.kyc_provider(), Some("elliptic"));

        w.apply_verification(&decision(KycTier::Basic));
        assert_eq!(w.kyc_tier(), KycTier::Full);
    }

    #[test]
    fn bincode_roundtrip() {
        let mut w = Wallet::new("0xabc");
        w.set_collateral_ratio(15_000);
        let bytes = bincode::serialize(&w).unwrap();
        let back: Wallet = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, w);
    }
}
