//! Benchmarks the throughput of the metrics core's hot path: recording a
//! latency sample into the ring buffer, and taking a full snapshot
//! (sort + percentile computation) under varying populated sizes.
//!
//! Grounded in spec §8's throughput-shaped testable properties — the ring
//! buffer and percentile computation are the two operations a running test
//! calls on every single task completion, so their cost bounds how high a
//! TPS this engine can drive before metrics collection itself becomes the
//! bottleneck.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use loadforge::metrics::ring::LatencyRing;
use loadforge::MetricsCore;
use loadforge::{TaskId, TaskResult};
use std::sync::Arc;
use std::thread;

fn bench_ring_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_record");
    for capacity in [1024usize, 8192, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
            let ring = LatencyRing::new(capacity);
            let mut i = 0u64;
            b.iter(|| {
                ring.record(i);
                i = i.wrapping_add(1);
            });
        });
    }
    group.finish();
}

fn bench_ring_concurrent_record(c: &mut Criterion) {
    c.bench_function("ring_record_8_writers", |b| {
        b.iter(|| {
            let ring = Arc::new(LatencyRing::new(8192));
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let ring = Arc::clone(&ring);
                    thread::spawn(move || {
                        for i in 0..1000u64 {
                            ring.record(t * 1000 + i);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        });
    });
}

fn bench_metrics_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics_snapshot");
    for populated in [100usize, 1_000, 8_000] {
        group.bench_with_input(BenchmarkId::from_parameter(populated), &populated, |b, &populated| {
            let metrics = MetricsCore::with_ring_capacity(8192);
            for i in 0..populated {
                metrics.record(&TaskResult::success(TaskId(i as u64), 0, (i as u128) * 1_000));
            }
            b.iter(|| metrics.snapshot());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ring_record, bench_ring_concurrent_record, bench_metrics_snapshot);
criterion_main!(benches);
