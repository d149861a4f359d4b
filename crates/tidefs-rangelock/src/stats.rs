//! Lock-manager activity counters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A view of a [`RangeLock`](crate::RangeLock)'s activity, returned by
/// [`RangeLock::stats`](crate::RangeLock::stats).
///
/// Counters accumulate over the manager's lifetime; `records` and
/// `proxies` are gauges sampled at the moment of the call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeLockStats {
    /// Writer admissions, including those that waited first.
    pub writer_locks: u64,
    /// Reader admissions, including those that waited first.
    pub reader_locks: u64,
    /// Times a writer found a conflicting record and blocked.
    pub writer_waits: u64,
    /// Times a reader found a conflicting record and blocked.
    pub reader_waits: u64,
    /// Non-blocking attempts turned away by a conflict.
    pub refusals: u64,
    /// Reader admissions whose coverage was shared with other readers.
    pub shared_admissions: u64,
    /// Releases and reductions that woke waiting threads.
    pub wakeups: u64,
    /// Whole-range writer locks narrowed in place.
    pub reduces: u64,
    /// Records live in the index when sampled.
    pub records: usize,
    /// Live records that are shared proxy segments.
    pub proxies: usize,
}

impl fmt::Display for RangeLockStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "locks {}w/{}r, waits {}w/{}r, refusals {}, shared {}, wakeups {}, reduces {}, live {} ({} proxies)",
            self.writer_locks,
            self.reader_locks,
            self.writer_waits,
            self.reader_waits,
            self.refusals,
            self.shared_admissions,
            self.wakeups,
            self.reduces,
            self.records,
            self.proxies,
        )
    }
}
