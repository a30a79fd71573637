//! Benchmarks for the best-first merge loop over synthetic affinity volumes.
//!
//! Run with:
//! - `cargo bench --bench merge_throughput`
//! - `cargo bench --bench merge_throughput --features parallel`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use confluence_core::{Agglomerator, AgglomerationConfig, QueueKind, StatisticKind};

/// Deterministic affinity noise in [0, 1] from a splitmix-style LCG.
fn make_affinities(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let unit = ((state >> 11) as f64) / ((u64::MAX >> 11) as f64);
        out.push(unit as f32);
    }
    out
}

fn session(side: usize, statistic: StatisticKind, queue: QueueKind) -> Agglomerator {
    let affinities = make_affinities(3 * side * side * side, side as u64 + 1);
    Agglomerator::initialize(
        side,
        side,
        side,
        &affinities,
        vec![0; side * side * side],
        None,
        &Vec::new(),
        &AgglomerationConfig {
            aff_low: 0.2,
            aff_high: 0.98,
            statistic,
            queue,
            ..Default::default()
        },
    )
    .expect("benchmark volume must initialize")
}

fn bench_merge_until(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_until");
    for side in [8_usize, 16, 24] {
        group.bench_with_input(BenchmarkId::new("binary_queue", side), &side, |b, &side| {
            b.iter(|| {
                let mut s = session(
                    side,
                    StatisticKind::VectorQuantile { quantile: 0.5 },
                    QueueKind::Binary,
                );
                black_box(s.merge_until(black_box(0.6)).unwrap())
            });
        });

        group.bench_with_input(BenchmarkId::new("bin_queue", side), &side, |b, &side| {
            b.iter(|| {
                let mut s = session(
                    side,
                    StatisticKind::HistogramQuantile {
                        quantile: 0.5,
                        bins: 256,
                    },
                    QueueKind::Bin { bins: 1024 },
                );
                black_box(s.merge_until(black_box(0.6)).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_merge_until);
criterion_main!(benches);
