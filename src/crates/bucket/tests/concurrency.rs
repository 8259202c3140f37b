//! Concurrent access tests
//!
//! Many threads hammering one bucket must observe a single total order of
//! operations and must never be admitted beyond the credited tokens.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quoter_bucket::{BucketQuoter, BucketStats, ManualClock};

const THREADS: usize = 8;
const CALLS_PER_THREAD: usize = 500;

#[test]
fn test_seq_no_strictly_increases_by_one() {
    let bucket = Arc::new(
        BucketQuoter::builder(1_000, 1_000_000)
            .start_full(true)
            .clock(ManualClock::new())
            .build(),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let bucket = Arc::clone(&bucket);
            thread::spawn(move || {
                (0..CALLS_PER_THREAD)
                    .map(|i| {
                        if i % 2 == 0 {
                            bucket.consume_with_result(1).seq_no
                        } else {
                            bucket.is_available_with_result().1.seq_no
                        }
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("worker panicked"))
        .collect();
    seen.sort_unstable();

    let expected: Vec<u64> = (1..=(THREADS * CALLS_PER_THREAD) as u64).collect();
    assert_eq!(seen, expected, "Every call got a unique, gap-free sequence number");
    assert_eq!(bucket.seq_no(), (THREADS * CALLS_PER_THREAD) as u64);
}

#[test]
fn test_per_thread_results_chain() {
    let bucket = Arc::new(
        BucketQuoter::builder(0, 10_000)
            .start_full(true)
            .clock(ManualClock::new())
            .build(),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let bucket = Arc::clone(&bucket);
            thread::spawn(move || {
                (0..CALLS_PER_THREAD)
                    .map(|_| bucket.consume_with_result(1))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut results: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("worker panicked"))
        .collect();
    results.sort_by_key(|r| r.seq_no);

    // Ordered by sequence number the snapshots form one unbroken chain
    for pair in results.windows(2) {
        assert_eq!(pair[0].after, pair[1].before);
    }
    assert_eq!(results[0].before, 10_000);
    assert_eq!(
        results.last().map(|r| r.after),
        Some(10_000 - (THREADS * CALLS_PER_THREAD) as i64)
    );
}

#[test]
fn test_no_over_admission_with_atomic_claims() {
    // Zero inflow: exactly `capacity + 1` non-blocking claims can succeed
    // (the last one takes the level from 0 to -1).
    let stats = Arc::new(BucketStats::new());
    let bucket = Arc::new(
        BucketQuoter::builder(0, 100)
            .start_full(true)
            .stats(stats.clone())
            .clock(ManualClock::new())
            .build(),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let bucket = Arc::clone(&bucket);
            thread::spawn(move || {
                let mut admitted = 0u32;
                for _ in 0..50 {
                    if bucket
                        .consume_with_sleep_timeout(1, Duration::ZERO)
                        .is_ok()
                    {
                        admitted += 1;
                    }
                }
                admitted
            })
        })
        .collect();

    let admitted: u32 = handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .sum();

    assert_eq!(admitted, 101);
    assert_eq!(bucket.level(), -1);
    assert_eq!(stats.snapshot().messages_passed, 101);
}

#[test]
fn test_blocking_waiters_on_real_clock() {
    // 1000 tokens/s, starts empty: four waiters each claim 10 tokens
    let bucket = Arc::new(BucketQuoter::new(1_000, 50, false));
    bucket.consume(20);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bucket = Arc::clone(&bucket);
            thread::spawn(move || bucket.consume_with_sleep_timeout(10, Duration::from_secs(5)))
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("waiter panicked").is_ok());
    }
}

#[test]
fn test_independent_buckets_do_not_interfere() {
    let a = Arc::new(BucketQuoter::new(0, 10, true));
    let b = Arc::new(BucketQuoter::new(0, 10, true));

    let worker = {
        let a = Arc::clone(&a);
        thread::spawn(move || {
            for _ in 0..10 {
                a.consume(1);
            }
        })
    };
    worker.join().expect("worker panicked");

    assert_eq!(a.available(), 0);
    assert_eq!(b.available(), 10);
}
