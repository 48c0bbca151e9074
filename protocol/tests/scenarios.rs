//! End-to-end scenarios for the Harbor core.
//!
//! Each test builds its own service over its own store and walks one
//! realistic flow through the public API: ranking yield, pricing a bridge,
//! and pushing a wallet through the mint / redeem gate.

use std::collections::BTreeMap;
use std::sync::Arc;

use harbor_protocol::compliance::FixedProvider;
use harbor_protocol::config::CoreConfig;
use harbor_protocol::error::{ComplianceError, CoreError, LedgerError};
use harbor_protocol::events::MemorySink;
use harbor_protocol::ledger::SequentialIds;
use harbor_protocol::market::{BridgeAction, ProtocolQuote, ProtocolRegistry, RiskTier};
use harbor_protocol::service::ServiceParts;
use harbor_protocol::storage::MemoryStore;
use harbor_protocol::units::{parse_amount, units};
use harbor_protocol::ProtocolService;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn service_with(quotes: Option<Vec<ProtocolQuote>>) -> (ProtocolService, Arc<MemorySink>) {
    let events = Arc::new(MemorySink::new());
    let mut parts = ServiceParts::new(Arc::new(MemoryStore::new()));
    parts.events = events.clone();
    parts.ids = Arc::new(SequentialIds::new());
    parts.selector = Arc::new(FixedProvider("chainalysis".into()));
    if let Some(quotes) = quotes {
        parts.registry = Arc::new(ProtocolRegistry::new(quotes));
    }
    let service = ProtocolService::with_parts(CoreConfig::default(), parts).expect("valid config");
    (service, events)
}

fn map<V: Copy>(entries: &[(&str, V)]) -> BTreeMap<String, V> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_best_yield_picks_aave() {
    let (service, _) = service_with(Some(vec![
        ProtocolQuote::new("aave", "Aave V3", 450, &["USDC"], RiskTier::Low),
        ProtocolQuote::new("compound", "Compound V3", 380, &["USDC"], RiskTier::Low),
        ProtocolQuote::new("curve", "Curve Finance", 250, &["USDC"], RiskTier::Medium),
    ]));

    let result = service.best_yield("USDC", units(10_000));
    let best = result.best.expect("a protocol supports USDC");
    assert_eq!(best.protocol, "aave");
    assert_eq!(best.annual_yield, units(450));

    // Strictly non-increasing APY down the list.
    for pair in result.opportunities.windows(2) {
        assert!(pair[0].apy_bps >= pair[1].apy_bps);
    }
}

#[test]
fn scenario_b_bridge_to_base() {
    let (service, _) = service_with(None);
    let eval = service.evaluate_cross_chain(
        "ethereum",
        units(10_000),
        &map(&[("ethereum", 420), ("base", 1_210)]),
        &map(&[
            ("ethereum", parse_amount("12.50").unwrap()),
            ("base", parse_amount("0.15").unwrap()),
        ]),
    );

    assert_eq!(eval.action, BridgeAction::Bridge);
    assert_eq!(eval.target_chain.as_deref(), Some("base"));
    // ≈ 34.52 staying put.
    assert_eq!(eval.current_profit, 34_520_547);
    // ≈ 99.45 gross minus 12.65 round trip.
    assert_eq!(eval.projected_net_profit, 86_802_054);
    assert_eq!(eval.estimated_gas, parse_amount("12.65").unwrap());
    assert!(eval.projected_net_profit > eval.current_profit);
}

#[test]
fn scenario_c_low_collateral_blocks_mint() {
    let (service, events) = service_with(None);
    service.verify("0xc0ffee", "full").unwrap();
    service.update_collateral_ratio("0xc0ffee", 12_000).unwrap();

    let err = service.mint("0xc0ffee", units(1_000), "ETH").unwrap_err();
    assert!(matches!(
        err,
        CoreError::Ledger(LedgerError::InsufficientCollateral { .. })
    ));
    assert_eq!(service.wallet("0xc0ffee").unwrap().balance(), 0);
    assert_eq!(events.count("minted"), 0);
    assert_eq!(events.count("rejected"), 1);
}

#[test]
fn scenario_d_over_redeem_keeps_balance() {
    let (service, _) = service_with(None);
    service.verify("0xd00d", "basic").unwrap();
    service.update_collateral_ratio("0xd00d", 15_000).unwrap();
    service.mint("0xd00d", units(50), "ETH").unwrap();

    let err = service.redeem("0xd00d", units(100)).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Ledger(LedgerError::InsufficientBalance { .. })
    ));
    assert_eq!(service.wallet("0xd00d").unwrap().balance(), units(50));
}

#[test]
fn unverified_wallet_cannot_mint() {
    let (service, _) = service_with(None);
    service.register_wallet("0xanon").unwrap();
    service.update_collateral_ratio("0xanon", 30_000).unwrap();

    assert!(matches!(
        service.mint("0xanon", units(1), "ETH"),
        Err(CoreError::Compliance(ComplianceError::ComplianceRequired { .. }))
    ));
}

#[test]
fn full_wallet_lifecycle() {
    let (service, events) = service_with(None);

    let decision = service.verify("0xfeedface01", "basic").unwrap();
    assert_eq!(decision.provider, "chainalysis");
    service.update_collateral_ratio("0xfeedface01", 18_000).unwrap();

    let limit = service.check_limit("0xfeedface01", units(4_000)).unwrap();
    assert!(limit.allowed);
    assert_eq!(limit.remaining, 6_000_000_000);

    let minted = service.mint("0xfeedface01", units(4_000), "WBTC").unwrap();
    assert_eq!(minted.tx_id, "tx-000001");

    let position = service
        .open_position("0xfeedface01", "curve", units(1_000))
        .unwrap();
    assert_eq!(position.position_id(), "0xfeedfa-00000002");

    let recs = service.rebalance_wallet("0xfeedface01").unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].to_protocol, "yearn");

    let portfolio = service.wallet_portfolio("0xfeedface01").unwrap();
    assert_eq!(portfolio.total_value, units(1_000));
    assert_eq!(portfolio.weighted_apy_bps, 250);

    let redeemed = service.redeem("0xfeedface01", units(1_000)).unwrap();
    assert_eq!(redeemed.new_balance, units(3_000));
    assert_eq!(redeemed.collateral_returned, units(1_500));

    assert_eq!(events.count("wallet_registered"), 1);
    assert_eq!(events.count("wallet_verified"), 1);
    assert_eq!(events.count("minted"), 1);
    assert_eq!(events.count("position_opened"), 1);
    assert_eq!(events.count("redeemed"), 1);
    assert_eq!(events.count("rejected"), 0);
}

#[test]
fn upgrade_from_basic_to_full_raises_ceiling() {
    let (service, _) = service_with(None);
    service.verify("0xwhale", "basic").unwrap();
    service.update_collateral_ratio("0xwhale", 20_000).unwrap();

    assert!(matches!(
        service.mint("0xwhale", units(50_000), "ETH"),
        Err(CoreError::Compliance(ComplianceError::LimitExceeded { .. }))
    ));

    let decision = service.verify("0xwhale", "full").unwrap();
    assert_eq!(decision.max_transaction, units(1_000_000));
    assert!(service.mint("0xwhale", units(50_000), "ETH").is_ok());

    assert!(matches!(
        service.verify("0xwhale", "basic"),
        Err(CoreError::Validation(_))
    ));
}
