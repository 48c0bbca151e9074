//! # Cross-Chain Router
//!
//! Decides whether capital sitting on one chain would earn more somewhere
//! else once you pay to get there and back. Pure: feed it APY and fee
//! quotes, get a [`BridgeEvaluation`]. It never moves anything.
//!
//! ## The Math
//!
//! Over a horizon of `H` days in a `Y`-day year:
//!
//! ```text
//!   current   = amount × apy[current] × H / Y
//!   candidate = amount × apy[c] × H / Y − (fee[current] + fee[c])
//! ```
//!
//! The winner is the strictly greatest candidate that strictly beats
//! `current`. A tie at the top is a HOLD: the router does not pick favorites.
//! A chain with no fee quote cannot be priced and is skipped, as is every
//! candidate when the current chain itself has no fee quote.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::RouterConfig;
use crate::units::{prorated_yield, to_signed, Bps, Micros, SignedMicros};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the router recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BridgeAction {
    Bridge,
    Hold,
}

/// Projection for one candidate chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProjection {
    pub chain: String,
    pub apy_bps: Bps,
    pub gross_profit: Micros,
    pub round_trip_fee: Micros,
    pub net_profit: SignedMicros,
}

/// The router's verdict. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEvaluation {
    pub action: BridgeAction,
    pub source_chain: String,
    /// Absent on HOLD.
    pub target_chain: Option<String>,
    pub amount: Micros,
    pub horizon_days: u32,
    /// Staying put, over the horizon.
    pub current_profit: SignedMicros,
    /// Net of fees on BRIDGE; equal to `current_profit` on HOLD.
    pub projected_net_profit: SignedMicros,
    /// Round-trip fee of the chosen move; zero on HOLD.
    pub estimated_gas: Micros,
    /// Every chain that could be priced, in chain-name order.
    pub candidates: Vec<ChainProjection>,
}

impl BridgeEvaluation {
    pub fn is_bridge(&self) -> bool {
        self.action == BridgeAction::Bridge
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CrossChainRouter {
    config: RouterConfig,
}

impl CrossChainRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Bridge-or-hold for `amount` currently on `current_chain`.
    ///
    /// A current chain missing from `apy_by_chain` earns zero.
    pub fn evaluate(
        &self,
        current_chain: &str,
        amount: Micros,
        apy_by_chain: &BTreeMap<String, Bps>,
        fee_by_chain: &BTreeMap<String, Micros>,
    ) -> BridgeEvaluation {
        let horizon = self.config.horizon_days;
        let year = self.config.days_per_year;

        let current_apy = apy_by_chain.get(current_chain).copied().unwrap_or(0);
        let current_profit = to_signed(prorated_yield(amount, current_apy, horizon, year));
        let current_fee = fee_by_chain.get(current_chain).copied();

        let mut candidates = Vec::new();
        if let Some(current_fee) = current_fee {
            for (chain, &apy) in apy_by_chain {
                if chain == current_chain {
                    continue;
                }
                let Some(&fee) = fee_by_chain.get(chain) else {
                    tracing::debug!(chain = %chain, "no fee quote; chain skipped");
                    continue;
                };
                let gross = prorated_yield(amount, apy, horizon, year);
                let round_trip_fee = current_fee.saturating_add(fee);
                candidates.push(ChainProjection {
                    chain: chain.clone(),
                    apy_bps: apy,
                    gross_profit: gross,
                    round_trip_fee,
                    net_profit: to_signed(gross).saturating_sub(to_signed(round_trip_fee)),
                });
            }
        } else {
            tracing::debug!(chain = current_chain, "no fee quote for current chain; holding");
        }

        // Strictly greatest net among those strictly above current. A tie at
        // the top clears the winner.
        let mut winner: Option<&ChainProjection> = None;
        let mut tied = false;
        for candidate in candidates.iter().filter(|c| c.net_profit > current_profit) {
            match winner {
                Some(w) if candidate.net_profit == w.net_profit => tied = true,
                Some(w) if candidate.net_profit < w.net_profit => {}
                _ => {
                    winner = Some(candidate);
                    tied = false;
                }
            }
        }

        let chosen = winner.filter(|_| !tied).cloned();

        let evaluation = match chosen {
            Some(w) => BridgeEvaluation {
                action: BridgeAction::Bridge,
                source_chain: current_chain.to_string(),
                target_chain: Some(w.chain),
                amount,
                horizon_days: horizon,
                current_profit,
                projected_net_profit: w.net_profit,
                estimated_gas: w.round_trip_fee,
                candidates,
            },
            None => BridgeEvaluation {
                action: BridgeAction::Hold,
                source_chain: current_chain.to_string(),
                target_chain: None,
                amount,
                horizon_days: horizon,
                current_profit,
                projected_net_profit: current_profit,
                estimated_gas: 0,
                candidates,
            },
        };

        tracing::debug!(
            source = current_chain,
            action = ?evaluation.action,
            target = evaluation.target_chain.as_deref().unwrap_or("-"),
            current_profit = evaluation.current_profit,
            net_profit = evaluation.projected_net_profit,
            "cross-chain evaluation"
        );

        evaluation
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
