//! # Market Decisions
//!
//! The read-only half of Harbor: where capital should sit, whether it
//! should move chains, and whether a price has wandered too far. Nothing
//! in here holds state between calls or touches the ledger.
//!
//! - [`registry`] - Catalog of yield sources. Whole-table swaps only.
//! - [`optimizer`] - Ranking, rebalance recommendations, portfolio yield.
//! - [`cross_chain`] - Bridge-or-hold over supplied APY and fee quotes.
//! - [`monitor`] - Price deviation bands for stable and volatile assets.

pub mod cross_chain;
pub mod monitor;
pub mod optimizer;
pub mod registry;

pub use cross_chain::{BridgeAction, BridgeEvaluation, CrossChainRouter};
pub use monitor::{AssetClass, PriceDeviation, PriceMonitor};
pub use optimizer::{
    BestYield, PortfolioYield, RebalanceRecommendation, YieldOpportunity, YieldOptimizer,
};
pub use registry::{ProtocolQuote, ProtocolRegistry, RiskTier};
