//! # Protocol Service
//!
//! One handle over the whole core, for outer surfaces (the node's HTTP
//! API, the demo, benches). It owns the shared registry and wires it into
//! both the optimizer and the ledger, so a catalog swap is seen everywhere
//! at once.
//!
//! All methods are synchronous and never block on I/O beyond what the
//! configured store does.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compliance::{
    ComplianceDecision, ComplianceGate, LimitCheck, ProviderSelector, RandomProvider,
};
use crate::config::{ConfigError, CoreConfig};
use crate::error::CoreResult;
use crate::events::{SharedSink, TracingSink};
use crate::ledger::{
    IdGenerator, Ledger, MintReceipt, RedeemReceipt, UuidGenerator, Wallet, YieldPosition,
};
use crate::market::optimizer::holdings_from_positions;
use crate::market::{
    BestYield, BridgeEvaluation, CrossChainRouter, PortfolioYield, PriceDeviation, PriceMonitor,
    ProtocolQuote, ProtocolRegistry, RebalanceRecommendation, YieldOptimizer,
};
use crate::storage::{LedgerStore, MemoryStore};
use crate::units::{Bps, Micros};

/// Optional collaborators for [`ProtocolService::with_parts`].
pub struct ServiceParts {
    pub store: Arc<dyn LedgerStore>,
    pub events: SharedSink,
    pub ids: Arc<dyn IdGenerator>,
    pub selector: Arc<dyn ProviderSelector>,
    pub registry: Arc<ProtocolRegistry>,
}

impl ServiceParts {
    /// Defaults for everything but the store.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            events: Arc::new(TracingSink),
            ids: Arc::new(UuidGenerator),
            selector: Arc::new(RandomProvider),
            registry: Arc::new(ProtocolRegistry::with_default_catalog()),
        }
    }
}

#[derive(Debug)]
pub struct ProtocolService {
    config: CoreConfig,
    registry: Arc<ProtocolRegistry>,
    optimizer: YieldOptimizer,
    router: CrossChainRouter,
    monitor: PriceMonitor,
    ledger: Ledger,
}

impl ProtocolService {
    /// Service over `store`, reporting events to `events`.
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn LedgerStore>,
        events: SharedSink,
    ) -> Result<Self, ConfigError> {
        let mut parts = ServiceParts::new(store);
        parts.events = events;
        Self::with_parts(config, parts)
    }

    /// Default config over a fresh in-memory store.
    pub fn in_memory() -> Self {
        let parts = ServiceParts::new(Arc::new(MemoryStore::new()));
        Self::assemble(CoreConfig::default(), parts)
    }

    /// Full control over every injected collaborator.
    pub fn with_parts(config: CoreConfig, parts: ServiceParts) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(config, parts))
    }

    fn assemble(config: CoreConfig, parts: ServiceParts) -> Self {
        let gate = ComplianceGate::new(config.compliance.clone(), parts.selector);
        let ledger = Ledger::builder(parts.store)
            .registry(Arc::clone(&parts.registry))
            .gate(gate)
            .ids(parts.ids)
            .events(parts.events)
            .config(config.ledger.clone())
            .build();

        tracing::debug!(
            protocols = parts.registry.len(),
            reference_token = %config.optimizer.reference_token,
            "protocol service assembled"
        );

        Self {
            optimizer: YieldOptimizer::new(Arc::clone(&parts.registry), config.optimizer.clone()),
            router: CrossChainRouter::new(config.router.clone()),
            monitor: PriceMonitor::new(config.monitor.clone()),
            registry: parts.registry,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // -- Market -------------------------------------------------------------

    pub fn quotes_for(&self, token: &str) -> Vec<ProtocolQuote> {
        self.registry.quotes_for(token)
    }

    /// The whole catalog, including borrow rates.
    pub fn protocol_rates(&self) -> Vec<ProtocolQuote> {
        self.registry.snapshot().as_ref().clone()
    }

    pub fn best_yield(&self, token: &str, amount: Micros) -> BestYield {
        self.optimizer.best_yield(token, amount)
    }

    pub fn rebalance_recommendations(
        &self,
        holdings: &BTreeMap<String, Micros>,
    ) -> Vec<RebalanceRecommendation> {
        self.optimizer.rebalance_recommendations(holdings)
    }

    pub fn portfolio_yield(&self, holdings: &BTreeMap<String, Micros>) -> PortfolioYield {
        self.optimizer.portfolio_yield(holdings)
    }

    /// Rebalance recommendations over a wallet's active positions.
    pub fn rebalance_wallet(&self, address: &str) -> CoreResult<Vec<RebalanceRecommendation>> {
        let holdings = holdings_from_positions(&self.ledger.positions(address)?);
        Ok(self.optimizer.rebalance_recommendations(&holdings))
    }

    /// Portfolio yield over a wallet's active positions.
    pub fn wallet_portfolio(&self, address: &str) -> CoreResult<PortfolioYield> {
        let holdings = holdings_from_positions(&self.ledger.positions(address)?);
        Ok(self.optimizer.portfolio_yield(&holdings))
    }

    pub fn evaluate_cross_chain(
        &self,
        current_chain: &str,
        amount: Micros,
        apy_by_chain: &BTreeMap<String, Bps>,
        fee_by_chain: &BTreeMap<String, Micros>,
    ) -> BridgeEvaluation {
        self.router
            .evaluate(current_chain, amount, apy_by_chain, fee_by_chain)
    }

    pub fn check_price(
        &self,
        token: &str,
        reference_price: Micros,
        current_price: Micros,
    ) -> CoreResult<PriceDeviation> {
        Ok(self
            .monitor
            .check_deviation(token, reference_price, current_price)?)
    }

    // -- Compliance ---------------------------------------------------------

    pub fn verify(&self, address: &str, tier: &str) -> CoreResult<ComplianceDecision> {
        self.ledger.verify(address, tier)
    }

    pub fn check_limit(&self, address: &str, amount: Micros) -> CoreResult<LimitCheck> {
        self.ledger.check_limit(address, amount)
    }

    // -- Ledger -------------------------------------------------------------

    pub fn register_wallet(&self, address: &str) -> CoreResult<Wallet> {
        self.ledger.register_wallet(address)
    }

    pub fn wallet(&self, address: &str) -> CoreResult<Wallet> {
        self.ledger.wallet(address)
    }

    pub fn update_collateral_ratio(&self, address: &str, ratio_bps: Bps) -> CoreResult<Wallet> {
        self.ledger.update_collateral_ratio(address, ratio_bps)
    }

    pub fn mint(
        &self,
        address: &str,
        amount: Micros,
        collateral_token: &str,
    ) -> CoreResult<MintReceipt> {
        self.ledger.mint(address, amount, collateral_token)
    }

    pub fn redeem(&self, address: &str, amount: Micros) -> CoreResult<RedeemReceipt> {
        self.ledger.redeem(address, amount)
    }

    pub fn open_position(
        &self,
        address: &str,
        protocol: &str,
        amount: Micros,
    ) -> CoreResult<YieldPosition> {
        self.ledger.open_position(address, protocol, amount)
    }

    pub fn positions(&self, address: &str) -> CoreResult<Vec<YieldPosition>> {
        self.ledger.positions(address)
    }

    pub fn position(&self, position_id: &str) -> CoreResult<YieldPosition> {
        self.ledger.position(position_id)
    }

    /// Accrues `days` of yield using the router's day-count convention.
    pub fn accrue_yield(&self, position_id: &str, days: u32) -> CoreResult<YieldPosition> {
        self.ledger
            .accrue_yield(position_id, days, self.config.router.days_per_year)
    }

    pub fn close_position(&self, position_id: &str) -> CoreResult<YieldPosition> {
        self.ledger.close_position(position_id)
    }
}
