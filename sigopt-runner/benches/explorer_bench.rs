//! Criterion benchmarks for the Phase 2 grid hot loop.
//!
//! Run with: `cargo bench -p sigopt-runner`
//!
//! Measures full grid exploration over synthetic opportunity sets of
//! increasing size, sequential versus rayon.

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sigopt_core::domain::{Direction, Opportunity, SignalType, Tick};
use sigopt_core::IntrabarPolicy;
use sigopt_runner::{ExplorerConfig, FastExplorer};

/// Deterministic zig-zag paths, alternating direction.
fn generate_opportunities(count: usize) -> Vec<Opportunity> {
    let t0 = NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..count)
        .map(|i| {
            let forward: Vec<Tick> = (0..24)
                .map(|k| {
                    let drift = ((i + k) % 7) as f64 * 0.15 - 0.4;
                    let open = 100.0 + drift;
                    let close = open + 0.2;
                    Tick {
                        open,
                        high: close + 0.6,
                        low: open - 0.5,
                        close,
                    }
                })
                .collect();
            Opportunity {
                symbol: format!("SYM{}", i % 8),
                timestamp: t0 + Duration::minutes(15 * i as i64),
                signal_type: SignalType::Scalping,
                direction: if i % 3 == 0 { Direction::Short } else { Direction::Long },
                entry_price: 100.0,
                atr: 0.6,
                support: 98.0,
                resistance: 103.0,
                objective_profit: 1.8,
                time_to_target: 4,
                signal_score: 50.0 + (i % 40) as f64,
                indicator_consensus: (i % 5) as u32,
                forward,
            }
        })
        .collect()
}

fn bench_explore(c: &mut Criterion) {
    let mut group = c.benchmark_group("explore_grid");
    let config = ExplorerConfig::default();

    for size in [100, 1_000, 5_000].iter() {
        let opps = generate_opportunities(*size);
        for parallel in [false, true] {
            let explorer = FastExplorer::new(&config, SignalType::Scalping, IntrabarPolicy::WorstCase)
                .with_parallelism(parallel);
            let id = format!("{}_{}", if parallel { "par" } else { "seq" }, size);
            group.bench_with_input(BenchmarkId::from_parameter(id), size, |b, _| {
                b.iter(|| {
                    let _ = explorer.explore(black_box(&opps), None);
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_explore);
criterion_main!(benches);
