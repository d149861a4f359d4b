//! TideFS test and validation infrastructure
//!
//! This crate provides harnesses for exercising the range lock subsystem:
//! a simulated file write path wired to the reference grow/append policy,
//! and a randomized multi-thread stress driver that verifies mutual
//! exclusion byte by byte.

pub mod harness;
pub mod stress;

pub use harness::{init_logging, GrowPolicy, ObjectState, SimulatedFile};
pub use stress::{run_stress, StressConfig, StressError, StressReport};
