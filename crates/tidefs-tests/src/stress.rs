//! Randomized multi-thread stress over one object's range lock.
//!
//! Worker threads lock random extents and touch a per-byte occupancy
//! table while holding the lock. A writer must find every covered byte
//! untouched; readers tolerate other readers but never a writer. Any
//! violation the lock failed to prevent shows up in the report.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use tidefs_rangelock::{LockType, RangeLock};

/// Occupancy increment for a held writer; reader counts stay far below.
const WRITER_TOKEN: u32 = 1 << 16;

#[derive(Error, Debug)]
pub enum StressError {
    #[error("invalid stress config: {0}")]
    InvalidConfig(String),
}

/// Tunable workload shape.
#[derive(Debug, Clone)]
pub struct StressConfig {
    pub threads: u32,
    pub ops_per_thread: u32,
    pub object_len: u64,
    pub max_io_len: u64,
    pub writer_percent: u32,
    pub seed: u64,
}

impl StressConfig {
    pub fn new() -> Self {
        Self {
            threads: 8,
            ops_per_thread: 500,
            object_len: 512,
            max_io_len: 64,
            writer_percent: 30,
            seed: 0xC0FFEE,
        }
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_ops_per_thread(mut self, ops: u32) -> Self {
        self.ops_per_thread = ops;
        self
    }

    pub fn with_writer_percent(mut self, percent: u32) -> Self {
        self.writer_percent = percent;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<(), StressError> {
        if self.threads == 0 {
            return Err(StressError::InvalidConfig("threads must be > 0".into()));
        }
        if self.object_len == 0 || self.max_io_len == 0 {
            return Err(StressError::InvalidConfig(
                "object_len and max_io_len must be > 0".into(),
            ));
        }
        if self.writer_percent > 100 {
            return Err(StressError::InvalidConfig(
                "writer_percent must be <= 100".into(),
            ));
        }
        Ok(())
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub threads_completed: u32,
    pub reads: u64,
    pub writes: u64,
    pub exclusion_violations: u64,
    pub max_concurrent_readers: u32,
    pub duration_ms: u64,
}

impl StressReport {
    pub fn is_clean(&self) -> bool {
        self.exclusion_violations == 0
    }

    pub fn throughput_ops_per_sec(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        ((self.reads + self.writes) as f64) / (self.duration_ms as f64 / 1000.0)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs the workload and reports what the occupancy table observed.
pub fn run_stress(config: &StressConfig) -> Result<StressReport, StressError> {
    config.validate()?;

    let start = Instant::now();
    let lock = RangeLock::new();
    let occupancy: Vec<AtomicU32> = (0..config.object_len).map(|_| AtomicU32::new(0)).collect();
    let violations = AtomicU64::new(0);
    let reads = AtomicU64::new(0);
    let writes = AtomicU64::new(0);
    let max_readers = AtomicU32::new(0);

    thread::scope(|s| {
        let lock = &lock;
        let occupancy = &occupancy;
        let violations = &violations;
        let reads = &reads;
        let writes = &writes;
        let max_readers = &max_readers;
        for t in 0..config.threads {
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                for _ in 0..config.ops_per_thread {
                    let off = rng.gen_range(0..config.object_len);
                    let len = rng.gen_range(1..=config.max_io_len.min(config.object_len - off));
                    if rng.gen_range(0..100) < config.writer_percent {
                        let guard = lock.enter(off, len, LockType::Writer);
                        for b in off..off + len {
                            let prev =
                                occupancy[b as usize].fetch_add(WRITER_TOKEN, Ordering::SeqCst);
                            if prev != 0 {
                                violations.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        thread::yield_now();
                        for b in off..off + len {
                            occupancy[b as usize].fetch_sub(WRITER_TOKEN, Ordering::SeqCst);
                        }
                        drop(guard);
                        writes.fetch_add(1, Ordering::SeqCst);
                    } else {
                        let guard = lock.enter(off, len, LockType::Reader);
                        for b in off..off + len {
                            let prev = occupancy[b as usize].fetch_add(1, Ordering::SeqCst);
                            if prev >= WRITER_TOKEN {
                                violations.fetch_add(1, Ordering::SeqCst);
                            }
                            max_readers.fetch_max(prev + 1, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        for b in off..off + len {
                            occupancy[b as usize].fetch_sub(1, Ordering::SeqCst);
                        }
                        drop(guard);
                        reads.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(lock.stats().records, 0, "locks leaked by stress workers");

    let report = StressReport {
        threads_completed: config.threads,
        reads: reads.load(Ordering::SeqCst),
        writes: writes.load(Ordering::SeqCst),
        exclusion_violations: violations.load(Ordering::SeqCst),
        max_concurrent_readers: max_readers.load(Ordering::SeqCst),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "stress complete: {} reads, {} writes, {} violations in {} ms",
        report.reads, report.writes, report.exclusion_violations, report.duration_ms
    );
    Ok(report)
}
