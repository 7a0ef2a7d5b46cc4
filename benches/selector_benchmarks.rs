//! Performance benchmarks for strategy selection and metrics recording
//!
//! Run with: cargo bench --bench selector_benchmarks
//!
//! Selection runs once per delivery and recording once per attempt, both
//! under the shared metrics lock, so regressions here show up as latency
//! on every call.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crabstream::config::MetricsConfig;
use crabstream::{
    AttemptRecord, Capability, CapabilitySet, ErrorKind, MetricsStore, NetworkCondition, Selector,
    Strategy, StrategyCatalog,
};

/// Catalog of `count` strategies spread over a few capability requirements
fn generate_catalog(count: usize) -> StrategyCatalog {
    let strategies = (0..count).map(|i| {
        let cap = Capability::ALL[i % Capability::ALL.len()];
        Strategy::new(format!("strategy-{}", i), (i % 7) as u32, 1_000 + i as u64, 2).requires(cap)
    });
    StrategyCatalog::from_strategies(strategies).expect("generated names are unique")
}

/// Store with a mixed success history for every strategy in the catalog
fn generate_metrics(catalog: &StrategyCatalog) -> MetricsStore {
    let store = MetricsStore::new(MetricsConfig::default());
    for (i, strategy) in catalog.list().iter().enumerate() {
        for round in 0..5 {
            let record = if (i + round) % 3 == 0 {
                AttemptRecord::failure(&strategy.name, 1, 40, 0, ErrorKind::Timeout, "timeout")
            } else {
                AttemptRecord::success(&strategy.name, 1, 25, 0)
            };
            store.record_attempt(record);
        }
    }
    store
}

fn bench_select_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("Select Order");
    let selector = Selector::default();
    let caps = CapabilitySet::all();

    for count in [4usize, 16, 64] {
        let catalog = generate_catalog(count);
        let snapshot = generate_metrics(&catalog).snapshot();
        group.throughput(Throughput::Elements(count as u64));

        for network in [NetworkCondition::Fast, NetworkCondition::Slow] {
            group.bench_with_input(
                BenchmarkId::new(network.as_str(), count),
                &catalog,
                |b, catalog| {
                    b.iter(|| {
                        selector
                            .select_order(black_box(catalog), &caps, network, &snapshot)
                            .expect("every generated strategy is available")
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_record_attempt(c: &mut Criterion) {
    let mut group = c.benchmark_group("Record Attempt");

    for history_size in [50usize, 500] {
        let store = MetricsStore::new(MetricsConfig {
            history_size,
            ..MetricsConfig::default()
        });
        group.bench_function(BenchmarkId::from_parameter(history_size), |b| {
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                let record = if n % 4 == 0 {
                    AttemptRecord::failure("proxy", 1, n, 0, ErrorKind::Failure, "502")
                } else {
                    AttemptRecord::success("proxy", 1, n, 0)
                };
                black_box(store.record_attempt(record))
            })
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let catalog = generate_catalog(16);
    let store = generate_metrics(&catalog);
    c.bench_function("metrics_snapshot", |b| b.iter(|| black_box(store.snapshot())));
}

criterion_group!(benches, bench_select_order, bench_record_attempt, bench_snapshot);
criterion_main!(benches);
