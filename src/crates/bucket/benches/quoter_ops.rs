//! Bucket operation benchmarks
//!
//! Measures the cost of the locked fast path, uncontended and under
//! contention from parallel threads.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quoter_bucket::{BucketQuoter, BucketStats};
use std::sync::Arc;
use std::thread;

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");
    let bucket = BucketQuoter::builder(1_000_000, u32::MAX as u64)
        .start_full(true)
        .stats(Arc::new(BucketStats::new()))
        .build();

    group.bench_function("is_available", |b| b.iter(|| black_box(bucket.is_available())));
    group.bench_function("consume", |b| b.iter(|| bucket.consume(black_box(1))));
    group.bench_function("consume_with_result", |b| {
        b.iter(|| black_box(bucket.consume_with_result(1)))
    });
    group.bench_function("wait_time", |b| b.iter(|| black_box(bucket.wait_time())));
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let bucket = Arc::new(BucketQuoter::new(1_000_000, u32::MAX as u64, true));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let bucket = Arc::clone(&bucket);
                        thread::spawn(move || {
                            for _ in 0..1_000 {
                                if bucket.is_available() {
                                    bucket.consume(1);
                                }
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.join();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended);
criterion_main!(benches);
