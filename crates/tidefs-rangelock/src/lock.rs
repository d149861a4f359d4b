//! Range lock manager and RAII guard.
//!
//! A [`RangeLock`] serializes access to the byte extents of one object.
//! Callers take a range with [`enter`](RangeLock::enter) and hold the
//! returned [`LockedRange`] for the duration of the I/O; dropping the
//! guard releases the range and wakes whatever blocked on it.

use std::fmt;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::policy::RangePolicy;
use crate::range::{LockRecord, LockRequest, LockType};
use crate::stats::RangeLockStats;
use crate::tree::RangeTree;

struct LockInner {
    tree: RangeTree,
    stats: RangeLockStats,
}

/// Byte-range lock manager for a single object.
///
/// Readers sharing overlapping extents are cheap; writers get exclusive
/// coverage. Waiting threads block on one condition variable per manager
/// and re-evaluate their request whenever a conflicting record goes away.
/// Thread-safe via internal mutex.
///
/// Callers lock a range before latching pages or buffers for it, and
/// take the whole range `[0, u64::MAX)` as a writer before shrinking
/// the object.
pub struct RangeLock {
    inner: Mutex<LockInner>,
    waiters: Condvar,
    policy: Option<Box<dyn RangePolicy>>,
}

impl RangeLock {
    /// Creates a manager with no write policy: writers and appends lock
    /// exactly the bytes they ask for. Fits objects with fixed-size
    /// blocks, such as volumes.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LockInner {
                tree: RangeTree::default(),
                stats: RangeLockStats::default(),
            }),
            waiters: Condvar::new(),
            policy: None,
        }
    }

    /// Creates a manager whose writer admissions run through `policy`
    /// first. The policy anchors appends at end-of-object and widens
    /// writes that will change the object's block size; see
    /// [`RangePolicy`] for the contract.
    pub fn with_policy<P: RangePolicy + 'static>(policy: P) -> Self {
        Self {
            inner: Mutex::new(LockInner {
                tree: RangeTree::default(),
                stats: RangeLockStats::default(),
            }),
            waiters: Condvar::new(),
            policy: Some(Box::new(policy)),
        }
    }

    /// Locks `[offset, offset + len)` for `kind` access, blocking until
    /// no conflicting lock remains. `len` saturates against the end of
    /// the address space. Returns the guard that owns the locked range;
    /// its extent may differ from the request when a policy rewrote it.
    ///
    /// Zero-length requests are outside the input domain and trip a
    /// debug assertion.
    pub fn enter(&self, offset: u64, len: u64, kind: LockType) -> LockedRange<'_> {
        debug_assert!(len > 0, "zero-length lock request");
        let request = LockRequest::new(offset, len, kind);
        match kind {
            LockType::Reader => self.enter_reader(request),
            LockType::Writer | LockType::Append => self.enter_writer(request),
        }
    }

    /// Non-blocking [`enter`](RangeLock::enter): returns `None` instead
    /// of waiting, and leaves no wakeup state behind on the records it
    /// collided with.
    pub fn try_enter(&self, offset: u64, len: u64, kind: LockType) -> Option<LockedRange<'_>> {
        debug_assert!(len > 0, "zero-length lock request");
        let request = LockRequest::new(offset, len, kind);
        let mut inner = self.inner.lock();
        let granted = match kind {
            LockType::Reader => self
                .admit_reader(&mut inner, &request)
                .ok()
                .map(|()| (request.offset, request.len, LockType::Reader)),
            LockType::Writer | LockType::Append => self
                .admit_writer(&mut inner, &request)
                .ok()
                .map(|(offset, len)| (offset, len, LockType::Writer)),
        };
        if granted.is_none() {
            inner.stats.refusals += 1;
        }
        drop(inner);
        granted.map(|(offset, len, kind)| LockedRange {
            lock: self,
            offset,
            len,
            kind,
        })
    }

    /// Activity counters plus current record gauges.
    pub fn stats(&self) -> RangeLockStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.records = inner.tree.len();
        stats.proxies = inner.tree.proxy_count();
        stats
    }

    /// Ordered view of the live lock records, for diagnostics and tests.
    pub fn snapshot(&self) -> Vec<LockRecord> {
        self.inner.lock().tree.snapshot()
    }

    fn enter_writer(&self, original: LockRequest) -> LockedRange<'_> {
        let mut inner = self.inner.lock();
        loop {
            match self.admit_writer(&mut inner, &original) {
                Ok((offset, len)) => {
                    return LockedRange {
                        lock: self,
                        offset,
                        len,
                        kind: LockType::Writer,
                    };
                }
                Err(key) => {
                    inner.tree.mark_write_wanted(key);
                    inner.stats.writer_waits += 1;
                    debug!(
                        "writer at [{}, {}) waiting on record at {}",
                        original.offset,
                        original.end(),
                        key
                    );
                    self.waiters.wait(&mut inner);
                }
            }
        }
    }

    fn enter_reader(&self, request: LockRequest) -> LockedRange<'_> {
        let mut inner = self.inner.lock();
        loop {
            match self.admit_reader(&mut inner, &request) {
                Ok(()) => {
                    return LockedRange {
                        lock: self,
                        offset: request.offset,
                        len: request.len,
                        kind: LockType::Reader,
                    };
                }
                Err(key) => {
                    inner.tree.mark_read_wanted(key);
                    inner.stats.reader_waits += 1;
                    debug!(
                        "reader at [{}, {}) waiting on record at {}",
                        request.offset,
                        request.end(),
                        key
                    );
                    self.waiters.wait(&mut inner);
                }
            }
        }
    }

    /// One writer admission attempt. The policy sees a fresh copy of the
    /// caller's request every time; the object may have grown while the
    /// thread slept, moving the append anchor.
    fn admit_writer(&self, inner: &mut LockInner, original: &LockRequest) -> Result<(u64, u64), u64> {
        let mut req = *original;
        match &self.policy {
            Some(policy) => {
                policy.resolve_writer(&mut req);
                assert_eq!(
                    req.kind,
                    LockType::Writer,
                    "policy must resolve requests to writer locks"
                );
                req.clamp();
            }
            None => req.kind = LockType::Writer,
        }
        if let Some(key) = inner.tree.writer_conflict(&req) {
            return Err(key);
        }
        inner.tree.insert_original(&req);
        inner.stats.writer_locks += 1;
        debug!("writer lock granted at [{}, {})", req.offset, req.end());
        Ok((req.offset, req.len))
    }

    fn admit_reader(&self, inner: &mut LockInner, req: &LockRequest) -> Result<(), u64> {
        if let Some(key) = inner.tree.reader_conflict(req) {
            return Err(key);
        }
        if !inner.tree.add_reader(req) {
            inner.stats.shared_admissions += 1;
        }
        inner.stats.reader_locks += 1;
        debug!("reader lock granted at [{}, {})", req.offset, req.end());
        Ok(())
    }

    fn release(&self, offset: u64, len: u64, kind: LockType) {
        let wake = {
            let mut inner = self.inner.lock();
            let wake = match kind {
                LockType::Reader => inner.tree.release_reader(offset, len),
                LockType::Writer => inner.tree.release_writer(offset),
                LockType::Append => unreachable!("append resolves to a writer before admission"),
            };
            if wake {
                inner.stats.wakeups += 1;
            }
            wake
        };
        if wake {
            // Notify with the mutex released so woken threads can take
            // it immediately.
            self.waiters.notify_all();
        }
        debug!("{} lock released at [{}, {})", kind, offset, offset + len);
    }
}

impl Default for RangeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RangeLock {
    fn drop(&mut self) {
        debug_assert!(
            self.inner.get_mut().tree.is_empty(),
            "range lock manager dropped with live records"
        );
    }
}

impl fmt::Debug for RangeLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RangeLock")
            .field("records", &inner.tree.len())
            .field("policy", &self.policy.is_some())
            .finish()
    }
}

/// A locked byte range. Dropping the guard releases the range and wakes
/// threads blocked on it.
pub struct LockedRange<'a> {
    lock: &'a RangeLock,
    offset: u64,
    len: u64,
    kind: LockType,
}

impl LockedRange<'_> {
    /// First byte covered by the lock.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// False; locked ranges are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// One past the last byte covered.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// The access granted: [`Reader`](LockType::Reader) or
    /// [`Writer`](LockType::Writer). Appends admit as writers.
    pub fn kind(&self) -> LockType {
        self.kind
    }

    /// Narrows a whole-range writer lock to `[offset, offset + len)` in
    /// place, waking waiters so they can re-evaluate against the smaller
    /// extent.
    ///
    /// This is the back half of the truncate and block-grow flows: the
    /// caller first takes `[0, u64::MAX)` exclusively, computes the new
    /// object size, then narrows to the bytes it still needs. Panics if
    /// this guard is not a solitary whole-range writer or `len` is zero.
    pub fn reduce(&mut self, offset: u64, len: u64) {
        assert!(self.kind == LockType::Writer, "reduce requires a writer lock");
        assert!(
            self.offset == 0 && self.len == u64::MAX,
            "reduce requires the whole-range lock"
        );
        assert!(len > 0, "reduce to an empty range");
        let req = LockRequest::new(offset, len, LockType::Writer);
        let wake = {
            let mut inner = self.lock.inner.lock();
            assert_eq!(inner.tree.len(), 1, "reduce with other locks held");
            let wake = inner
                .tree
                .reduce_solitary_writer(self.offset, req.offset, req.len);
            inner.stats.reduces += 1;
            if wake {
                inner.stats.wakeups += 1;
            }
            wake
        };
        self.offset = req.offset;
        self.len = req.len;
        if wake {
            self.lock.waiters.notify_all();
        }
        debug!("writer lock reduced to [{}, {})", req.offset, req.end());
    }
}

impl Drop for LockedRange<'_> {
    fn drop(&mut self) {
        self.lock.release(self.offset, self.len, self.kind);
    }
}

impl fmt::Debug for LockedRange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedRange")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("kind", &self.kind)
            .finish()
    }
}
