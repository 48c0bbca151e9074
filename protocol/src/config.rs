//! # Protocol Configuration & Constants
//!
//! Every tunable number in Harbor starts life here as a documented default,
//! and every default can be overridden at runtime through [`CoreConfig`].
//! If you find a hardcoded threshold anywhere else, it's a bug.
//!
//! Amounts are micros and rates are basis points (see [`crate::units`]).

use serde::{Deserialize, Serialize};

use crate::units::{units, Bps, Micros};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate version, reported by the node's status endpoint.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Yield Optimizer
// ---------------------------------------------------------------------------

/// Token against which rebalance opportunities are priced.
pub const DEFAULT_REFERENCE_TOKEN: &str = "USDC";

/// A rebalance is recommended only when the best APY beats the current one
/// by strictly more than this. 100 bps = one percentage point.
pub const DEFAULT_REBALANCE_THRESHOLD_BPS: Bps = 100;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Minimum collateral ratio required to mint: 1.5x.
pub const MIN_COLLATERAL_RATIO_BPS: Bps = 15_000;

/// Collateral reported back on redeem, as a multiple of the redeemed amount.
pub const REDEEM_COLLATERAL_BPS: Bps = 15_000;

/// Characters of the wallet address used as the position id prefix.
pub const POSITION_ID_PREFIX_LEN: usize = 8;

/// Hex characters of the random suffix in a position id.
pub const POSITION_ID_SUFFIX_LEN: usize = 8;

/// How many fresh ids to try before giving up on a position insert.
pub const MAX_POSITION_ID_ATTEMPTS: u32 = 4;

// ---------------------------------------------------------------------------
// Compliance
// ---------------------------------------------------------------------------

/// Per-transaction ceiling for the `basic` tier.
pub const BASIC_TIER_LIMIT: Micros = units(10_000);

/// Per-transaction ceiling for the `full` tier.
pub const FULL_TIER_LIMIT: Micros = units(1_000_000);

/// KYC providers a verification may be attributed to.
pub const DEFAULT_KYC_PROVIDERS: [&str; 3] = ["kyc_aml", "chainalysis", "elliptic"];

// ---------------------------------------------------------------------------
// Cross-Chain Router
// ---------------------------------------------------------------------------

/// Projection horizon for bridge profitability.
pub const PROJECTION_HORIZON_DAYS: u32 = 30;

/// Day count convention for annual rates.
pub const DAYS_PER_YEAR: u32 = 365;

// ---------------------------------------------------------------------------
// Price Monitor
// ---------------------------------------------------------------------------

/// Alert band for stablecoins: 0.5%.
pub const STABLE_DEVIATION_BPS: Bps = 50;

/// Alert band for everything else: 5%.
pub const VOLATILE_DEVIATION_BPS: Bps = 500;

/// Tokens monitored with the stable band.
pub const DEFAULT_STABLE_TOKENS: [&str; 3] = ["USDC", "USDT", "DAI"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A configuration value is out of range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("basic tier limit ({basic}) must not exceed full tier limit ({full})")]
    TierLimitsInverted { basic: Micros, full: Micros },

    #[error("{field} of {value} bps is out of range")]
    RateOutOfRange { field: &'static str, value: Bps },
}

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Optimizer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub reference_token: String,
    pub improvement_threshold_bps: Bps,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            reference_token: DEFAULT_REFERENCE_TOKEN.to_string(),
            improvement_threshold_bps: DEFAULT_REBALANCE_THRESHOLD_BPS,
        }
    }
}

/// Ledger invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub min_collateral_ratio_bps: Bps,
    pub redeem_collateral_bps: Bps,
    pub position_id_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_collateral_ratio_bps: MIN_COLLATERAL_RATIO_BPS,
            redeem_collateral_bps: REDEEM_COLLATERAL_BPS,
            position_id_attempts: MAX_POSITION_ID_ATTEMPTS,
        }
    }
}

/// Tier ceilings and the provider pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub basic_limit: Micros,
    pub full_limit: Micros,
    pub providers: Vec<String>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            basic_limit: BASIC_TIER_LIMIT,
            full_limit: FULL_TIER_LIMIT,
            providers: DEFAULT_KYC_PROVIDERS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Bridge projection horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub horizon_days: u32,
    pub days_per_year: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            horizon_days: PROJECTION_HORIZON_DAYS,
            days_per_year: DAYS_PER_YEAR,
        }
    }
}

/// Price deviation bands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub stable_deviation_bps: Bps,
    pub volatile_deviation_bps: Bps,
    pub stable_tokens: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stable_deviation_bps: STABLE_DEVIATION_BPS,
            volatile_deviation_bps: VOLATILE_DEVIATION_BPS,
            stable_tokens: DEFAULT_STABLE_TOKENS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Everything the core needs to know at construction time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub optimizer: OptimizerConfig,
    pub ledger: LedgerConfig,
    pub compliance: ComplianceConfig,
    pub router: RouterConfig,
    pub monitor: MonitorConfig,
}

impl CoreConfig {
    /// Rejects configurations the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.optimizer.reference_token.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "optimizer.reference_token",
            });
        }
        if self.ledger.min_collateral_ratio_bps == 0 {
            return Err(ConfigError::Zero {
                field: "ledger.min_collateral_ratio_bps",
            });
        }
        if self.ledger.position_id_attempts == 0 {
            return Err(ConfigError::Zero {
                field: "ledger.position_id_attempts",
            });
        }
        if self.compliance.basic_limit > self.compliance.full_limit {
            return Err(ConfigError::TierLimitsInverted {
                basic: self.compliance.basic_limit,
                full: self.compliance.full_limit,
            });
        }
        if self.compliance.providers.is_empty() {
            return Err(ConfigError::Empty {
                field: "compliance.providers",
            });
        }
        if self.router.days_per_year == 0 {
            return Err(ConfigError::Zero {
                field: "router.days_per_year",
            });
        }
        if self.monitor.stable_deviation_bps > self.monitor.volatile_deviation_bps {
            return Err(ConfigError::RateOutOfRange {
                field: "monitor.stable_deviation_bps",
                value: self.monitor.stable_deviation_bps,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
