//! Integration tests for the simulated write path.
//!
//! These exercise the reference grow/append policy the way a filesystem
//! would: concurrent appenders extending one file, grow writes widening
//! to the whole range, and truncation waiting out readers.

use std::sync::Mutex;
use std::thread;

use tidefs_rangelock::LockType;
use tidefs_tests::{init_logging, SimulatedFile};

#[test]
fn test_concurrent_appends_land_disjoint() {
    init_logging();
    let file = SimulatedFile::new(1 << 20, 1 << 20);
    let offsets = Mutex::new(Vec::new());

    thread::scope(|s| {
        let file = &file;
        let offsets = &offsets;
        for _ in 0..4 {
            s.spawn(move || {
                for _ in 0..25 {
                    let off = file.append(100);
                    offsets.lock().unwrap().push(off);
                }
            });
        }
    });

    let mut offsets = offsets.into_inner().unwrap();
    offsets.sort_unstable();
    let expected: Vec<u64> = (0..100).map(|i| i * 100).collect();
    assert_eq!(offsets, expected);
    assert_eq!(file.size(), 10_000);
    assert_eq!(file.lock().stats().records, 0);
}

#[test]
fn test_concurrent_grow_writes_serialize() {
    let file = SimulatedFile::new(512, 1 << 16);

    thread::scope(|s| {
        let file = &file;
        for t in 0..2u64 {
            s.spawn(move || {
                for k in 0..5u64 {
                    file.write(t * 5000 + k * 1000, 1000);
                }
            });
        }
    });

    assert_eq!(file.size(), 10_000);
    // The last grow to cross 8192 settled the block size.
    assert_eq!(file.state().block_size(), 16_384);
    assert_eq!(file.lock().stats().records, 0);
}

#[test]
fn test_grow_write_excludes_unrelated_bytes() {
    let file = SimulatedFile::new(512, 1 << 20);
    let guard = file.lock().enter(0, 1000, LockType::Writer);
    assert_eq!(guard.len(), u64::MAX);
    // While widened, even bytes far past the write are off limits.
    assert!(file.lock().try_enter(1 << 30, 1, LockType::Reader).is_none());
    drop(guard);
    assert!(file.lock().try_enter(1 << 30, 1, LockType::Reader).is_some());
}

#[test]
fn test_truncate_waits_for_readers() {
    let file = SimulatedFile::new(4096, 4096);
    file.write(0, 1000);

    let reader = file.lock().enter(0, 100, LockType::Reader);
    thread::scope(|s| {
        s.spawn(|| file.truncate(10));
        while file.lock().stats().writer_waits == 0 {
            thread::yield_now();
        }
        // Truncation is parked behind the reader; the size is untouched.
        assert_eq!(file.size(), 1000);
        drop(reader);
    });
    assert_eq!(file.size(), 10);
}

#[test]
fn test_mixed_workload_returns_to_idle() {
    let file = SimulatedFile::new(512, 1 << 16);

    thread::scope(|s| {
        let file = &file;
        s.spawn(move || {
            for k in 0..20 {
                file.append(50 + k);
            }
        });
        s.spawn(move || {
            for k in 0..20u64 {
                file.write(k * 37, 64);
            }
        });
        s.spawn(move || {
            for k in 0..40u64 {
                file.read(k * 13, 128);
            }
        });
    });

    assert_eq!(file.lock().stats().records, 0);
    assert!(file.size() > 0);
}
