//! # Yield Positions
//!
//! A deposit into a protocol, frozen at the APY the registry quoted when it
//! was opened. Later catalog swaps do not change what an open position
//! earns. Lifecycle is one-way: `active → closed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::units::{prorated_yield, Bps, Micros};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldPosition {
    position_id: String,
    wallet: String,
    protocol: String,
    deposited_amount: Micros,
    /// APY snapshot at creation.
    apy_bps: Bps,
    earned_yield: Micros,
    status: PositionStatus,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    version: u64,
}

impl YieldPosition {
    pub(crate) fn open(
        position_id: String,
        wallet: &str,
        protocol: &str,
        deposited_amount: Micros,
        apy_bps: Bps,
    ) -> Self {
        Self {
            position_id,
            wallet: wallet.to_string(),
            protocol: protocol.to_string(),
            deposited_amount,
            apy_bps,
            earned_yield: 0,
            status: PositionStatus::Active,
            opened_at: Utc::now(),
            closed_at: None,
            version: 0,
        }
    }

    pub fn position_id(&self) -> &str {
        &self.position_id
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn deposited_amount(&self) -> Micros {
        self.deposited_amount
    }

    pub fn apy_bps(&self) -> Bps {
        self.apy_bps
    }

    pub fn earned_yield(&self) -> Micros {
        self.earned_yield
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Adds `days` worth of yield at the snapshot APY. Returns the amount
    /// accrued by this call.
    pub(crate) fn accrue(&mut self, days: u32, days_per_year: u32) -> Result<Micros, LedgerError> {
        self.ensure_active()?;
        let accrued = prorated_yield(self.deposited_amount, self.apy_bps, days, days_per_year);
        self.earned_yield = self.earned_yield.saturating_add(accrued);
        self.version += 1;
        Ok(accrued)
    }

    pub(crate) fn close(&mut self) -> Result<(), LedgerError> {
        self.ensure_active()?;
        self.status = PositionStatus::Closed;
        self.closed_at = Some(Utc::now());
        self.version += 1;
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), LedgerError> {
        match self.status {
            PositionStatus::Active => Ok(()),
            PositionStatus::Closed => Err(LedgerError::PositionClosed {
                position_id: self.position_id.clone(),
            }),
        }
    }
}
