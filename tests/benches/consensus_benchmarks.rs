//! # Hybrid Consensus Benchmarks
//!
//! | Operation | Expectation |
//! |-----------|-------------|
//! | `calculate_weights` / `compute_threshold` | sub-microsecond, lock-free |
//! | `WeightConfigStore::get` under contention | read-mostly, no writer starvation |
//! | PoH hash over a full sub-block | well inside one sub-block interval |
//! | PoW search at an easy target | bounded by the nonce budget |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hc_consensus::domain::difficulty::initial_target;
use hc_consensus::domain::hashing::{meets_target, pow_hash};
use hc_consensus::domain::poh;
use hc_consensus::{calculate_weights, compute_threshold, WeightConfig, WeightConfigStore};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

fn bench_weights(c: &mut Criterion) {
    let mut group = c.benchmark_group("weights");
    let cfg = WeightConfig::default();
    let mut rng = rand::thread_rng();
    let samples: Vec<(f64, f64)> = (0..1_024)
        .map(|_| (rng.gen_range(0.0..10_000.0), rng.gen_range(0.0..2_000_000.0)))
        .collect();

    group.throughput(Throughput::Elements(samples.len() as u64));
    group.bench_function("calculate_weights", |b| {
        b.iter(|| {
            for (demand, stake) in &samples {
                black_box(calculate_weights(*demand, *stake, cfg));
            }
        })
    });
    group.bench_function("compute_threshold", |b| {
        b.iter(|| {
            for (demand, stake) in &samples {
                black_box(compute_threshold(*demand, *stake, cfg));
            }
        })
    });
    group.finish();
}

fn bench_store_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("weight_config_store");
    let store = Arc::new(WeightConfigStore::default());

    let writer = {
        let store = store.clone();
        std::thread::spawn(move || {
            for i in 0..10_000u32 {
                let cfg = WeightConfig::new(1.0, 1.0, f64::from(i % 7), 100.0, 100.0);
                let _ = store.set(cfg);
            }
        })
    };

    group.bench_function("get_with_writer", |b| b.iter(|| black_box(store.get())));
    group.finish();
    let _ = writer.join();
}

fn bench_poh(c: &mut Criterion) {
    let mut group = c.benchmark_group("poh");
    group.measurement_time(Duration::from_secs(5));

    for count in [10usize, 500, 5_000] {
        let txs: Vec<Vec<u8>> = (0..count)
            .map(|i| (i as u64).to_le_bytes().repeat(16))
            .collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("compute", count), &txs, |b, txs| {
            b.iter(|| black_box(poh::compute(&[7u8; 32], txs, 1_700_000_000_000)))
        });
    }
    group.finish();
}

fn bench_pow(c: &mut Criterion) {
    let mut group = c.benchmark_group("pow");
    group.sample_size(20);

    for bits in [252u32, 248] {
        let target = initial_target(bits);
        group.bench_with_input(BenchmarkId::new("search", bits), &target, |b, target| {
            b.iter(|| {
                let header = rand::thread_rng().gen::<[u8; 32]>();
                let mut nonce = 0u64;
                while !meets_target(&pow_hash(&header, nonce), *target) {
                    nonce += 1;
                }
                black_box(nonce)
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_weights,
    bench_store_contention,
    bench_poh,
    bench_pow
);
criterion_main!(benches);
