//! # Yield Optimizer
//!
//! Three questions, answered from the registry and nothing else:
//!
//! 1. Where does this token earn the most? ([`YieldOptimizer::best_yield`])
//! 2. Which of my positions should move? ([`YieldOptimizer::rebalance_recommendations`])
//! 3. What does my whole portfolio earn? ([`YieldOptimizer::portfolio_yield`])
//!
//! The optimizer never fails on well-formed input. Unknown tokens rank to
//! nothing and unknown protocols earn zero.
//!
//! ## Ordering
//!
//! Opportunities sort by APY descending, then by protocol id ascending, so
//! two protocols paying the same rate always come out in the same order
//! regardless of catalog order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::registry::{ProtocolRegistry, RiskTier};
use crate::config::OptimizerConfig;
use crate::ledger::{PositionStatus, YieldPosition};
use crate::units::{apply_bps, Bps, Micros, BPS_DENOMINATOR};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One ranked place to put `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldOpportunity {
    pub protocol: String,
    pub name: String,
    pub apy_bps: Bps,
    /// `amount × apy` over one year.
    pub annual_yield: Micros,
    pub risk: RiskTier,
}

/// Result of [`YieldOptimizer::best_yield`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestYield {
    pub token: String,
    pub amount: Micros,
    /// Ranked, best first.
    pub opportunities: Vec<YieldOpportunity>,
    /// First element of `opportunities`, absent when nothing supports the
    /// token.
    pub best: Option<YieldOpportunity>,
}

/// A suggested move from one protocol to a better one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceRecommendation {
    pub from_protocol: String,
    pub to_protocol: String,
    pub amount: Micros,
    pub current_apy_bps: Bps,
    pub new_apy_bps: Bps,
    /// Extra yield per year from making the move.
    pub additional_annual_yield: Micros,
}

/// Aggregate yield of a set of holdings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioYield {
    pub total_value: Micros,
    /// Amount-weighted APY, rounded down. Zero for an empty portfolio.
    pub weighted_apy_bps: Bps,
    pub annual_yield: Micros,
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Stateless ranking over a shared registry.
#[derive(Debug, Clone)]
pub struct YieldOptimizer {
    registry: Arc<ProtocolRegistry>,
    config: OptimizerConfig,
}

impl YieldOptimizer {
    pub fn new(registry: Arc<ProtocolRegistry>, config: OptimizerConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Ranks every protocol that accepts `token` by what `amount` would earn.
    pub fn best_yield(&self, token: &str, amount: Micros) -> BestYield {
        let mut opportunities: Vec<YieldOpportunity> = self
            .registry
            .quotes_for(token)
            .into_iter()
            .map(|q| YieldOpportunity {
                annual_yield: apply_bps(amount, q.supply_apy_bps),
                apy_bps: q.supply_apy_bps,
                protocol: q.protocol,
                name: q.name,
                risk: q.risk,
            })
            .collect();

        opportunities.sort_by(rank);
        let best = opportunities.first().cloned();

        tracing::debug!(
            token,
            amount,
            candidates = opportunities.len(),
            best = best.as_ref().map(|b| b.protocol.as_str()).unwrap_or("none"),
            "ranked yield opportunities"
        );

        BestYield {
            token: token.to_string(),
            amount,
            opportunities,
            best,
        }
    }

    /// For each holding, recommends a move when the best protocol for the
    /// reference token beats the current APY by strictly more than the
    /// configured threshold. Zero-amount holdings are skipped.
    pub fn rebalance_recommendations(
        &self,
        holdings: &BTreeMap<String, Micros>,
    ) -> Vec<RebalanceRecommendation> {
        let mut recommendations = Vec::new();

        for (protocol, &amount) in holdings {
            if amount == 0 {
                continue;
            }

            let current_apy = self.registry.apy_of(protocol);
            let ranked = self.best_yield(&self.config.reference_token, amount);
            let Some(best) = ranked.best else {
                continue;
            };

            let improvement = best.apy_bps.saturating_sub(current_apy);
            if improvement <= self.config.improvement_threshold_bps {
                continue;
            }

            tracing::debug!(
                from = %protocol,
                to = %best.protocol,
                amount,
                improvement_bps = improvement,
                "rebalance recommended"
            );

            recommendations.push(RebalanceRecommendation {
                from_protocol: protocol.clone(),
                to_protocol: best.protocol,
                amount,
                current_apy_bps: current_apy,
                new_apy_bps: best.apy_bps,
                additional_annual_yield: apply_bps(amount, improvement),
            });
        }

        recommendations
    }

    /// Weighted APY and annual yield of a set of holdings.
    pub fn portfolio_yield(&self, holdings: &BTreeMap<String, Micros>) -> PortfolioYield {
        let mut total: u128 = 0;
        let mut weighted_sum: u128 = 0;

        for (protocol, &amount) in holdings {
            let apy = self.registry.apy_of(protocol) as u128;
            total += amount as u128;
            weighted_sum += amount as u128 * apy;
        }

        let weighted_apy_bps = if total == 0 {
            0
        } else {
            (weighted_sum / total).min(Bps::MAX as u128) as Bps
        };
        let annual_yield = weighted_sum / BPS_DENOMINATOR as u128;

        PortfolioYield {
            total_value: total.min(u64::MAX as u128) as Micros,
            weighted_apy_bps,
            annual_yield: annual_yield.min(u64::MAX as u128) as Micros,
        }
    }
}

/// APY descending, then protocol id ascending.
fn rank(a: &YieldOpportunity, b: &YieldOpportunity) -> Ordering {
    b.apy_bps
        .cmp(&a.apy_bps)
        .then_with(|| a.protocol.cmp(&b.protocol))
}

/// Sums active positions by protocol, the shape the optimizer consumes.
pub fn holdings_from_positions(positions: &[YieldPosition]) -> BTreeMap<String, Micros> {
    let mut holdings: BTreeMap<String, Micros> = BTreeMap::new();
    for position in positions
        .iter()
        .filter(|p| p.status() == PositionStatus::Active)
    {
        let slot = holdings.entry(position.protocol().to_string()).or_insert(0);
        *slot = slot.saturating_add(position.deposited_amount());
    }
    holdings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
