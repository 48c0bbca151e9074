// Allocation and ledger benchmarks for Harbor.
//
// Covers optimizer ranking over catalogs of growing size, cross-chain
// evaluation over many chains, and the mint critical section on the
// in-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use harbor_protocol::config::{OptimizerConfig, RouterConfig};
use harbor_protocol::market::{
    CrossChainRouter, ProtocolQuote, ProtocolRegistry, RiskTier, YieldOptimizer,
};
use harbor_protocol::units::units;
use harbor_protocol::ProtocolService;

/// A catalog of `n` protocols that all accept USDC, with spread-out APYs.
fn catalog(n: usize) -> Vec<ProtocolQuote> {
    (0..n)
        .map(|i| {
            ProtocolQuote::new(
                format!("proto-{i:04}"),
                format!("Protocol {i}"),
                100 + (i as u32 * 37) % 1_500,
                &["USDC", "USDT"],
                RiskTier::Medium,
            )
        })
        .collect()
}

fn bench_best_yield(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizer/best_yield");

    for size in [4usize, 64, 512] {
        let optimizer = YieldOptimizer::new(
            Arc::new(ProtocolRegistry::new(catalog(size))),
            OptimizerConfig::default(),
        );
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| optimizer.best_yield("USDC", units(10_000)));
        });
    }

    group.finish();
}

fn bench_rebalance(c: &mut Criterion) {
    let optimizer = YieldOptimizer::new(
        Arc::new(ProtocolRegistry::new(catalog(64))),
        OptimizerConfig::default(),
    );
    let holdings: BTreeMap<String, u64> = (0..16)
        .map(|i| (format!("proto-{i:04}"), units(1_000)))
        .collect();

    c.bench_function("optimizer/rebalance_16", |b| {
        b.iter(|| optimizer.rebalance_recommendations(&holdings));
    });
}

fn bench_cross_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("router/evaluate");
    let router = CrossChainRouter::new(RouterConfig::default());

    for chains in [4usize, 32] {
        let apys: BTreeMap<String, u32> = (0..chains)
            .map(|i| (format!("chain-{i}"), 300 + i as u32 * 25))
            .collect();
        let fees: BTreeMap<String, u64> = (0..chains)
            .map(|i| (format!("chain-{i}"), 150_000 + i as u64 * 10_000))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(chains), &chains, |b, _| {
            b.iter(|| router.evaluate("chain-0", units(25_000), &apys, &fees));
        });
    }

    group.finish();
}

fn bench_mint(c: &mut Criterion) {
    let service = ProtocolService::in_memory();
    service.verify("0xbench", "full").unwrap();
    service.update_collateral_ratio("0xbench", 20_000).unwrap();

    c.bench_function("ledger/mint", |b| {
        b.iter(|| service.mint("0xbench", 1, "ETH").unwrap());
    });
}

criterion_group!(
    benches,
    bench_best_yield,
    bench_rebalance,
    bench_cross_chain,
    bench_mint,
);
criterion_main!(benches);
