//! Bounded-wait runs: a writer must get in under a live reader stream.
//!
//! Arriving readers defer to a pending writer, so the readers holding
//! the range when the writer arrives are the last ones it waits for.
//! The watchdog gives the hand-off a generous deadline rather than
//! asserting any particular wakeup order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tidefs_rangelock::{LockType, RangeLock};
use tidefs_tests::init_logging;

#[test]
fn test_writer_admitted_under_reader_stream() {
    init_logging();
    let lock = RangeLock::new();
    let stop = AtomicBool::new(false);
    let (granted_tx, granted_rx) = mpsc::channel();

    thread::scope(|s| {
        let lock = &lock;
        let stop = &stop;
        for _ in 0..3 {
            s.spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let g = lock.enter(0, 4096, LockType::Reader);
                    thread::yield_now();
                    drop(g);
                }
            });
        }
        // Make sure the stream is flowing before the writer shows up.
        while lock.stats().reader_locks < 6 {
            thread::yield_now();
        }
        s.spawn(move || {
            let g = lock.enter(1024, 512, LockType::Writer);
            let _ = granted_tx.send(g.offset());
            drop(g);
            stop.store(true, Ordering::SeqCst);
        });

        let granted = granted_rx.recv_timeout(Duration::from_secs(30));
        // Stop the stream first so a failed wait cannot also hang the
        // join below.
        stop.store(true, Ordering::SeqCst);
        let offset = granted.expect("writer starved behind reader stream");
        assert_eq!(offset, 1024);
    });

    assert_eq!(lock.stats().records, 0);
}

#[test]
fn test_whole_range_writer_admitted_under_finite_reader_stream() {
    let lock = RangeLock::new();
    let (granted_tx, granted_rx) = mpsc::channel();

    thread::scope(|s| {
        let lock = &lock;
        for t in 0..3u64 {
            s.spawn(move || {
                // Scattered short reads, mostly disjoint from each other.
                for k in 0..2000u64 {
                    let g = lock.enter((t * 1000 + k % 7) * 64, 256, LockType::Reader);
                    thread::yield_now();
                    drop(g);
                }
            });
        }
        while lock.stats().reader_locks < 6 {
            thread::yield_now();
        }
        // The whole-range writer conflicts with every reader there is.
        s.spawn(move || {
            let g = lock.enter(0, u64::MAX, LockType::Writer);
            let _ = granted_tx.send(g.len());
        });

        let len = granted_rx
            .recv_timeout(Duration::from_secs(30))
            .expect("whole-range writer starved");
        assert_eq!(len, u64::MAX);
    });

    assert_eq!(lock.stats().records, 0);
}
