//! Terminal walkthrough of the Harbor core.
//!
//! Ranks yield sources, prices a bridge, verifies a wallet, mints against
//! collateral, parks some of it in a protocol, and asks whether it should
//! move. Output is colored with ANSI escape codes.
//!
//! Run with:
//!   cargo run --example allocation_demo

use std::collections::BTreeMap;
use std::sync::Arc;

use harbor_protocol::config::CoreConfig;
use harbor_protocol::events::MemorySink;
use harbor_protocol::market::BridgeAction;
use harbor_protocol::storage::MemoryStore;
use harbor_protocol::units::{bps_display, format_amount, format_signed, parse_amount, units};
use harbor_protocol::ProtocolService;

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]==================================================={RESET}");
    println!("{BOLD}{WHITE}  {title}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn refused(text: &str) {
    println!("{RED}  [NO] {text}{RESET}");
}

fn main() {
    let events = Arc::new(MemorySink::new());
    let service = match ProtocolService::new(
        CoreConfig::default(),
        Arc::new(MemoryStore::new()),
        events.clone(),
    ) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    // -- 1. Rank ------------------------------------------------------------
    section(1, "Where does 10,000 USDC earn the most?");
    let ranked = service.best_yield("USDC", units(10_000));
    for opp in &ranked.opportunities {
        println!(
            "  {BOLD}{:<16}{RESET} {:>7}  {DIM}{:>10} / year  risk {}{RESET}",
            opp.name,
            bps_display(opp.apy_bps),
            format_amount(opp.annual_yield),
            opp.risk
        );
    }

    // -- 2. Bridge ----------------------------------------------------------
    section(2, "Should it leave Ethereum?");
    let apys: BTreeMap<String, u32> = [("ethereum", 420), ("arbitrum", 780), ("base", 1_210)]
        .into_iter()
        .map(|(c, a)| (c.to_string(), a))
        .collect();
    let fees: BTreeMap<String, u64> = [("ethereum", "12.50"), ("arbitrum", "0.45"), ("base", "0.15")]
        .into_iter()
        .filter_map(|(c, f)| parse_amount(f).ok().map(|f| (c.to_string(), f)))
        .collect();
    let eval = service.evaluate_cross_chain("ethereum", units(10_000), &apys, &fees);
    info("Stay (30d)", &format_signed(eval.current_profit));
    match (eval.action, eval.target_chain.as_deref()) {
        (BridgeAction::Bridge, Some(target)) => success(&format!(
            "bridge to {target}: {} net after {} in fees",
            format_signed(eval.projected_net_profit),
            format_amount(eval.estimated_gas)
        )),
        _ => refused("hold: nothing beats staying put"),
    }

    // -- 3. Verify & mint ---------------------------------------------------
    section(3, "Onboard a wallet and mint");
    let wallet = "0xa11ce0000000000000000000000000000000beef";
    if let Err(e) = service.mint(wallet, units(100), "ETH") {
        refused(&format!("mint before onboarding: {e}"));
    }
    match service.verify(wallet, "basic") {
        Ok(d) => success(&format!(
            "verified as {} by {} (ceiling {})",
            d.tier,
            d.provider,
            format_amount(d.max_transaction)
        )),
        Err(e) => refused(&e.to_string()),
    }
    if let Err(e) = service.update_collateral_ratio(wallet, 12_000) {
        refused(&e.to_string());
    }
    if let Err(e) = service.mint(wallet, units(5_000), "ETH") {
        refused(&format!("at 1.2x collateral: {e}"));
    }
    if let Err(e) = service.update_collateral_ratio(wallet, 17_500) {
        refused(&e.to_string());
    }
    match service.mint(wallet, units(5_000), "ETH") {
        Ok(r) => success(&format!(
            "minted {} (tx {}), balance {}",
            format_amount(r.amount),
            r.tx_id,
            format_amount(r.new_balance)
        )),
        Err(e) => refused(&e.to_string()),
    }

    // -- 4. Deposit & rebalance ---------------------------------------------
    section(4, "Park 2,000 in Curve, then ask for a better home");
    match service.open_position(wallet, "curve", units(2_000)) {
        Ok(p) => success(&format!(
            "position {} at {}",
            p.position_id(),
            bps_display(p.apy_bps())
        )),
        Err(e) => refused(&e.to_string()),
    }
    match service.rebalance_wallet(wallet) {
        Ok(recs) => {
            for rec in recs {
                info(
                    &format!("{} -> {}", rec.from_protocol, rec.to_protocol),
                    &format!(
                        "+{} / year ({} -> {})",
                        format_amount(rec.additional_annual_yield),
                        bps_display(rec.current_apy_bps),
                        bps_display(rec.new_apy_bps)
                    ),
                );
            }
        }
        Err(e) => refused(&e.to_string()),
    }

    // -- 5. Events ----------------------------------------------------------
    section(5, "What the ledger saw");
    for event in events.events() {
        println!("  {DIM}{}{RESET}", event.kind());
    }
    println!();
}
