//! # Protocol Registry
//!
//! The catalog of places capital can earn yield. Each entry is a
//! [`ProtocolQuote`]: an immutable snapshot of one lending protocol's
//! supply APY, optional borrow APY, the tokens it accepts, and how nervous
//! it should make you.
//!
//! ## Concurrency
//!
//! Readers grab an `Arc` to the current table and go on their way. An
//! update builds a brand-new table and swaps the pointer, so a reader never
//! sees half a catalog. The `RwLock` is held only long enough to clone or
//! replace the `Arc`.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::units::Bps;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Qualitative risk grade attached to a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// One yield source, frozen at the moment it was loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolQuote {
    /// Stable identifier, e.g. `"aave"`.
    pub protocol: String,
    /// Human-facing name, e.g. `"Aave V3"`.
    pub name: String,
    /// Annual supply rate.
    pub supply_apy_bps: Bps,
    /// Annual borrow rate, where the protocol lends.
    pub borrow_apy_bps: Option<Bps>,
    /// Tokens this protocol accepts.
    pub tokens: Vec<String>,
    pub risk: RiskTier,
}

impl ProtocolQuote {
    pub fn new(
        protocol: impl Into<String>,
        name: impl Into<String>,
        supply_apy_bps: Bps,
        tokens: &[&str],
        risk: RiskTier,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            name: name.into(),
            supply_apy_bps,
            borrow_apy_bps: None,
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            risk,
        }
    }

    /// Attach a borrow rate.
    pub fn with_borrow_apy(mut self, borrow_apy_bps: Bps) -> Self {
        self.borrow_apy_bps = Some(borrow_apy_bps);
        self
    }

    /// Whether this protocol accepts `token`. Case-sensitive; token symbols
    /// are canonical upper case everywhere in Harbor.
    pub fn supports(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }
}

/// The catalog a fresh registry starts with.
pub fn default_catalog() -> Vec<ProtocolQuote> {
    vec![
        ProtocolQuote::new(
            "aave",
            "Aave V3",
            450,
            &["USDC", "USDT", "DAI", "ETH"],
            RiskTier::Low,
        )
        .with_borrow_apy(820),
        ProtocolQuote::new(
            "compound",
            "Compound V3",
            380,
            &["USDC", "USDT", "ETH"],
            RiskTier::Low,
        )
        .with_borrow_apy(750),
        ProtocolQuote::new(
            "curve",
            "Curve Finance",
            250,
            &["USDC", "USDT", "DAI", "FRAX"],
            RiskTier::Medium,
        ),
        ProtocolQuote::new(
            "yearn",
            "Yearn Finance",
            650,
            &["USDC", "USDT"],
            RiskTier::Medium,
        ),
    ]
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Read-mostly catalog of protocol quotes.
#[derive(Debug)]
pub struct ProtocolRegistry {
    table: RwLock<Arc<Vec<ProtocolQuote>>>,
}

impl ProtocolRegistry {
    /// Registry over an explicit catalog. Order is preserved and is the
    /// order `quotes_for` reports in.
    pub fn new(quotes: Vec<ProtocolQuote>) -> Self {
        Self {
            table: RwLock::new(Arc::new(quotes)),
        }
    }

    /// Registry over [`default_catalog`].
    pub fn with_default_catalog() -> Self {
        Self::new(default_catalog())
    }

    /// Current catalog. Cheap; later swaps do not affect the returned
    /// snapshot.
    pub fn snapshot(&self) -> Arc<Vec<ProtocolQuote>> {
        Arc::clone(&self.table.read())
    }

    /// Quotes accepting `token`, in catalog order.
    pub fn quotes_for(&self, token: &str) -> Vec<ProtocolQuote> {
        self.snapshot()
            .iter()
            .filter(|q| q.supports(token))
            .cloned()
            .collect()
    }

    /// Quote for one protocol id.
    pub fn quote(&self, protocol: &str) -> Option<ProtocolQuote> {
        self.snapshot()
            .iter()
            .find(|q| q.protocol == protocol)
            .cloned()
    }

    /// Supply APY for a protocol. Unknown protocols earn nothing rather than
    /// an error.
    pub fn apy_of(&self, protocol: &str) -> Bps {
        self.snapshot()
            .iter()
            .find(|q| q.protocol == protocol)
            .map(|q| q.supply_apy_bps)
            .unwrap_or(0)
    }

    /// Swaps in a whole new catalog, returning the old one.
    pub fn replace_catalog(&self, quotes: Vec<ProtocolQuote>) -> Arc<Vec<ProtocolQuote>> {
        let fresh = Arc::new(quotes);
        let old = std::mem::replace(&mut *self.table.write(), fresh);
        tracing::info!(protocols = self.len(), "protocol catalog replaced");
        old
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::with_default_catalog()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_four_protocols() {
        let registry = ProtocolRegistry::with_default_catalog();
        assert_eq!(registry.len(), 4);
        assert!(!registry.is_empty());
    }

    #[test]
    fn quotes_for_preserves_catalog_order() {
        let registry = ProtocolRegistry::with_default_catalog();
        let ids: Vec<_> = registry
            .quotes_for("USDC")
            .into_iter()
            .map(|q| q.protocol)
            .collect();
        assert_eq!(ids, vec!["aave", "compound", "curve", "yearn"]);

        let frax: Vec<_> = registry
            .quotes_for("FRAX")
            .into_iter()
            .map(|q| q.protocol)
            .collect();
        assert_eq!(frax, vec!["curve"]);
    }

    #[test]
    fn unknown_token_yields_nothing() {
        let registry = ProtocolRegistry::with_default_catalog();
        assert!(registry.quotes_for("DOGE").is_empty());
        assert!(registry.quotes_for("usdc").is_empty());
    }

    #[test]
    fn apy_of_unknown_protocol_is_zero() {
        let registry = ProtocolRegistry::with_default_catalog();
        assert_eq!(registry.apy_of("aave"), 450);
        assert_eq!(registry.apy_of("yearn"), 650);
        assert_eq!(registry.apy_of("mystery-farm"), 0);
    }

    #[test]
    fn borrow_rates_only_where_lending() {
        let registry = ProtocolRegistry::with_default_catalog();
        assert_eq!(registry.quote("aave").unwrap().borrow_apy_bps, Some(820));
        assert_eq!(registry.quote("curve").unwrap().borrow_apy_bps, None);
        assert!(registry.quote("nope").is_none());
    }

    #[test]
    fn replace_catalog_is_whole_table() {
        let registry = ProtocolRegistry::with_default_catalog();
        let before = registry.snapshot();

        let old = registry.replace_catalog(vec![ProtocolQuote::new(
            "solo",
            "Solo",
            100,
            &["USDC"],
            RiskTier::High,
        )]);

        assert_eq!(old.len(), 4);
        // Snapshots taken before the swap are untouched.
        assert_eq!(before.len(), 4);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.apy_of("aave"), 0);
        assert_eq!(registry.apy_of("solo"), 100);
    }

    #[test]
    fn quote_serde_roundtrip() {
        let quote = default_catalog().remove(0);
        let json = serde_json::to_string(&quote).unwrap();
        assert!(json.contains("\"risk\":\"low\""));
        let back: ProtocolQuote = serde_json::from_str(&json).unwrap();
        assert_eq!(back, quote);
    }
}
