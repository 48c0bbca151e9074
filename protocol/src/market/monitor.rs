//! # Price Deviation Monitor
//!
//! Flags a token whose price has wandered from its reference by more than
//! its band allows. Stablecoins get a tight band (0.5% by default), anything
//! else a loose one (5%). The monitor does not fetch prices; callers hand
//! it both numbers.
//!
//! Prices are micros per unit, like every other amount in Harbor.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::error::ValidationError;
use crate::units::{Bps, Micros, BPS_DENOMINATOR};

/// Which band a token is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Stable,
    Volatile,
}

/// Outcome of one deviation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceDeviation {
    pub token: String,
    pub class: AssetClass,
    pub reference_price: Micros,
    pub current_price: Micros,
    /// `|current − reference| / reference`, in basis points, rounded down.
    pub deviation_bps: Bps,
    pub threshold_bps: Bps,
    /// True when the exact deviation strictly exceeds `threshold_bps`.
    pub alert: bool,
}

#[derive(Debug, Clone)]
pub struct PriceMonitor {
    config: MonitorConfig,
    stable: HashSet<String>,
}

impl PriceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let stable = config.stable_tokens.iter().cloned().collect();
        Self { config, stable }
    }

    pub fn classify(&self, token: &str) -> AssetClass {
        if self.stable.contains(token) {
            AssetClass::Stable
        } else {
            AssetClass::Volatile
        }
    }

    pub fn threshold_for(&self, class: AssetClass) -> Bps {
        match class {
            AssetClass::Stable => self.config.stable_deviation_bps,
            AssetClass::Volatile => self.config.volatile_deviation_bps,
        }
    }

    /// Compares `current_price` with `reference_price`.
    ///
    /// Deviation is computed exactly in `u128` and compared before
    /// rounding, so a move of 0.5000001% on a stablecoin still alerts.
    pub fn check_deviation(
        &self,
        token: &str,
        reference_price: Micros,
        current_price: Micros,
    ) -> Result<PriceDeviation, ValidationError> {
        if reference_price == 0 {
            return Err(ValidationError::ZeroReferencePrice {
                token: token.to_string(),
            });
        }

        let class = self.classify(token);
        let threshold_bps = self.threshold_for(class);

        let diff = reference_price.abs_diff(current_price) as u128;
        let scaled = diff * BPS_DENOMINATOR as u128;
        let reference = reference_price as u128;

        // deviation > threshold  ⇔  diff × 10_000 > threshold × reference
        let alert = scaled > threshold_bps as u128 * reference;
        let deviation_bps = (scaled / reference).min(Bps::MAX as u128) as Bps;

        if alert {
            tracing::warn!(
                token,
                reference_price,
                current_price,
                deviation_bps,
                threshold_bps,
                "price deviation above band"
            );
        }

        Ok(PriceDeviation {
            token: token.to_string(),
            class,
            reference_price,
            current_price,
            deviation_bps,
            threshold_bps,
            alert,
        })
    }
}

impl Default for PriceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::units;

    #[test]
    fn stablecoins_use_tight_band() {
        let monitor = PriceMonitor::default();
        assert_eq!(monitor.classify("USDC"), AssetClass::Stable);
        assert_eq!(monitor.classify("ETH"), AssetClass::Volatile);

        // 1.00 → 0.994 is a 0.6% move.
        let check = monitor.check_deviation("USDC", units(1), 994_000).unwrap();
        assert_eq!(check.deviation_bps, 60);
        assert_eq!(check.threshold_bps, 50);
        assert!(check.alert);
    }

    #[test]
    fn exactly_at_band_does_not_alert() {
        let monitor = PriceMonitor::default();
        let check = monitor.check_deviation("DAI", units(1), 995_000).unwrap();
        assert_eq!(check.deviation_bps, 50);
        assert!(!check.alert);
    }

    #[test]
    fn sub_basis_point_overshoot_still_alerts() {
        let monitor = PriceMonitor::default();
        // 0.5001% move rounds down to 50 bps but is above the band.
        let check = monitor
            .check_deviation("USDT", units(10_000), units(10_000) + 50_010_000)
            .unwrap();
        assert_eq!(check.deviation_bps, 50);
        assert!(check.alert);
    }

    #[test]
    fn volatile_assets_tolerate_wider_moves() {
        let monitor = PriceMonitor::default();
        let calm = monitor
            .check_deviation("ETH", units(3_000), units(3_120))
            .unwrap();
        assert_eq!(calm.deviation_bps, 400);
        assert!(!calm.alert);

        let wild = monitor
            .check_deviation("ETH", units(3_000), units(2_700))
            .unwrap();
        assert_eq!(wild.deviation_bps, 1_000);
        assert!(wild.alert);
    }

    #[test]
    fn zero_reference_is_rejected() {
        let monitor = PriceMonitor::default();
        assert!(matches!(
            monitor.check_deviation("USDC", 0, units(1)),
            Err(ValidationError::ZeroReferencePrice { .. })
        ));
    }
}
