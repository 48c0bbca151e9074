//! Receipts returned from successful mints and redeems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::units::Micros;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub tx_id: String,
    pub wallet: String,
    pub amount: Micros,
    pub collateral_token: String,
    pub new_balance: Micros,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemReceipt {
    pub tx_id: String,
    pub wallet: String,
    pub amount: Micros,
    /// Collateral released, reported as a multiple of `amount`.
    pub collateral_returned: Micros,
    pub new_balance: Micros,
    pub timestamp: DateTime<Utc>,
}
