//! Offset-ordered index of live lock records.
//!
//! One index per [`RangeLock`](crate::RangeLock), keyed by start offset, so
//! at most one record begins at any given offset. Extents stored here are
//! pairwise disjoint: writers exclude everything they overlap, and readers
//! that overlap are decomposed into reference-counted proxy segments that
//! partition the covered bytes. All methods assume the manager's mutex is
//! held.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use crate::range::{LockRecord, LockRequest, LockType};

/// A live record. `len` pairs with the map key (the start offset) to form
/// the covered extent.
#[derive(Debug, Clone)]
struct RangeEntry {
    len: u64,
    kind: LockType,
    refs: u32,
    proxy: bool,
    write_wanted: bool,
    read_wanted: bool,
}

impl RangeEntry {
    fn original(len: u64, kind: LockType) -> Self {
        Self {
            len,
            kind,
            refs: 1,
            proxy: false,
            write_wanted: false,
            read_wanted: false,
        }
    }

    fn proxy(len: u64, refs: u32) -> Self {
        Self {
            len,
            kind: LockType::Reader,
            refs,
            proxy: true,
            write_wanted: false,
            read_wanted: false,
        }
    }

    fn has_waiters(&self) -> bool {
        self.write_wanted || self.read_wanted
    }
}

#[derive(Debug, Default)]
pub(crate) struct RangeTree {
    records: BTreeMap<u64, RangeEntry>,
}

impl RangeTree {
    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn proxy_count(&self) -> usize {
        self.records.values().filter(|e| e.proxy).count()
    }

    /// Inserts `req` as its own record. The caller must have established
    /// that nothing overlaps it.
    pub(crate) fn insert_original(&mut self, req: &LockRequest) {
        debug_assert!(matches!(req.kind, LockType::Reader | LockType::Writer));
        let clash = self.records.insert(req.offset, RangeEntry::original(req.len, req.kind));
        debug_assert!(clash.is_none(), "two records at offset {}", req.offset);
    }

    /// Searches for a record blocking writer admission: any record whose
    /// extent intersects the request. Probes the exact start offset, then
    /// the nearest record after it, then the nearest before it, and
    /// returns the first hit's key.
    pub(crate) fn writer_conflict(&self, req: &LockRequest) -> Option<u64> {
        let (off, end) = (req.offset, req.end());
        if self.records.contains_key(&off) {
            return Some(off);
        }
        if let Some((&k, _)) = self.records.range((Excluded(off), Unbounded)).next() {
            if k < end {
                return Some(k);
            }
        }
        if let Some((&k, e)) = self.records.range(..off).next_back() {
            if k + e.len > off {
                return Some(k);
            }
        }
        None
    }

    /// Searches for a record blocking reader admission: an overlapping
    /// record that is a writer, or that has a writer waiting on it.
    /// Readers defer to pending writers, not only held ones.
    pub(crate) fn reader_conflict(&self, req: &LockRequest) -> Option<u64> {
        let (off, end) = (req.offset, req.end());
        if let Some((&k, e)) = self.records.range(..=off).next_back() {
            if off < k + e.len {
                if e.kind == LockType::Writer || e.write_wanted {
                    return Some(k);
                }
                if end < k + e.len {
                    // Strictly inside one shared record; nothing further
                    // can overlap.
                    return None;
                }
            }
        }
        for (&k, e) in self.records.range((Excluded(off), Unbounded)) {
            if end <= k {
                break;
            }
            if e.kind == LockType::Writer || e.write_wanted {
                return Some(k);
            }
            if end <= k + e.len {
                break;
            }
        }
        None
    }

    /// Flags the record at `key` so that the next release of that record
    /// wakes blocked writers, and so that arriving readers defer to the
    /// pending writer.
    pub(crate) fn mark_write_wanted(&mut self, key: u64) {
        self.records
            .get_mut(&key)
            .expect("flagged record vanished")
            .write_wanted = true;
    }

    /// Flags the record at `key` so that the next release of that record
    /// wakes blocked readers.
    pub(crate) fn mark_read_wanted(&mut self, key: u64) {
        self.records
            .get_mut(&key)
            .expect("flagged record vanished")
            .read_wanted = true;
    }

    /// Admits a reader request once no writer conflict remains. Returns
    /// true when the request went in as its own record (the common,
    /// overlap-free case); false when its coverage was decomposed into
    /// proxy segments.
    pub(crate) fn add_reader(&mut self, req: &LockRequest) -> bool {
        let (off, end) = (req.offset, req.end());

        // A record straddling the start is split there, so the walk below
        // always begins on a record boundary.
        if let Some((&k, e)) = self.records.range(..=off).next_back() {
            if k < off && off < k + e.len {
                self.split(k, off);
            }
        }

        let first = match self.records.range(off..).next() {
            Some((&k, _)) if k < end => k,
            _ => {
                self.insert_original(req);
                return true;
            }
        };

        if off < first {
            // Uncovered bytes before the first overlapped record.
            self.insert_proxy(off, first - off);
        }

        let mut cursor = first;
        loop {
            let cur_end = cursor + self.records[&cursor].len;
            if end == cur_end {
                self.bump(cursor);
                return false;
            }
            if end < cur_end {
                // The request ends inside this record; only the front
                // half gains a reference.
                self.split(cursor, end);
                self.bump(cursor);
                return false;
            }
            self.bump(cursor);

            let next = self
                .records
                .range((Excluded(cursor), Unbounded))
                .next()
                .map(|(&k, _)| k);
            match next {
                Some(k) if k < end => {
                    if cur_end < k {
                        self.insert_proxy(cur_end, k - cur_end);
                    }
                    cursor = k;
                }
                _ => {
                    // Ran past the last overlapped record with bytes of
                    // the request still uncovered.
                    self.insert_proxy(cur_end, end - cur_end);
                    return false;
                }
            }
        }
    }

    /// Removes a writer's record. Returns true if waiters had registered
    /// on it.
    pub(crate) fn release_writer(&mut self, offset: u64) -> bool {
        let e = self
            .records
            .remove(&offset)
            .expect("no record at writer offset");
        debug_assert!(e.kind == LockType::Writer && !e.proxy && e.refs == 1);
        e.has_waiters()
    }

    /// Removes a reader's coverage starting at `offset` for `len` bytes.
    /// A record there that was never shared comes out directly; otherwise
    /// every proxy segment of the span loses one reference and segments
    /// that reach zero are removed. Returns true if any removed record
    /// had waiters registered.
    pub(crate) fn release_reader(&mut self, offset: u64, len: u64) -> bool {
        let proxied = self
            .records
            .get(&offset)
            .expect("no record at reader offset")
            .proxy;
        if !proxied {
            let e = self.records.remove(&offset).expect("record vanished");
            debug_assert!(e.kind == LockType::Reader && e.refs == 1);
            debug_assert_eq!(e.len, len);
            return e.has_waiters();
        }

        // While two requests cover overlapping bytes, the record at each
        // request's start offset is always a proxy, so reaching here means
        // the span [offset, offset+len) is exactly partitioned by a chain
        // of adjacent proxies.
        let mut wake = false;
        let mut key = offset;
        let mut remaining = len;
        while remaining > 0 {
            let e = self.records.get_mut(&key).expect("gap in proxy chain");
            debug_assert!(e.proxy && e.kind == LockType::Reader && e.refs > 0);
            debug_assert!(e.len <= remaining);
            let step = e.len;
            e.refs -= 1;
            if e.refs == 0 {
                let dead = self.records.remove(&key).expect("record vanished");
                wake |= dead.has_waiters();
            }
            remaining -= step;
            key += step;
        }
        wake
    }

    /// Shrinks the sole record, a whole-range writer, to the given
    /// sub-range. Returns true if waiters had registered on it.
    pub(crate) fn reduce_solitary_writer(&mut self, old_off: u64, new_off: u64, new_len: u64) -> bool {
        debug_assert_eq!(self.records.len(), 1);
        let e = self
            .records
            .remove(&old_off)
            .expect("no record at writer offset");
        debug_assert!(e.kind == LockType::Writer && !e.proxy && e.refs == 1);
        let wake = e.has_waiters();
        // Waiter flags ride along: anyone who registered on the wide
        // record is still woken when the narrow one goes away.
        self.records.insert(new_off, RangeEntry { len: new_len, ..e });
        wake
    }

    /// Ordered view of the live records.
    pub(crate) fn snapshot(&self) -> Vec<LockRecord> {
        self.records
            .iter()
            .map(|(&offset, e)| LockRecord {
                offset,
                len: e.len,
                kind: e.kind,
                refs: e.refs,
                proxy: e.proxy,
            })
            .collect()
    }

    /// Converts the record at `key` to a proxy if it is not one already,
    /// then adds one reference for the reader being admitted.
    fn bump(&mut self, key: u64) {
        let e = self.records.get_mut(&key).expect("record to share");
        if !e.proxy {
            debug_assert_eq!(e.refs, 1);
            debug_assert_eq!(e.kind, LockType::Reader);
            debug_assert!(!e.has_waiters());
            e.proxy = true;
        }
        e.refs += 1;
    }

    /// Splits the record at `key` at absolute offset `at`: the front keeps
    /// the key and shrinks to `[key, at)`, and a new rear proxy covering
    /// `[at, old_end)` inherits the reference count. Both halves are
    /// proxies afterwards.
    fn split(&mut self, key: u64, at: u64) {
        let e = self.records.get_mut(&key).expect("record to split");
        debug_assert!(key < at && at < key + e.len);
        debug_assert_eq!(e.kind, LockType::Reader);
        debug_assert!(!e.has_waiters());
        if !e.proxy {
            debug_assert_eq!(e.refs, 1);
            e.proxy = true;
        }
        let rear_len = key + e.len - at;
        let refs = e.refs;
        e.len = at - key;
        self.records.insert(at, RangeEntry::proxy(rear_len, refs));
    }

    /// Inserts a fresh single-reference proxy covering a gap.
    fn insert_proxy(&mut self, offset: u64, len: u64) {
        debug_assert!(len > 0);
        let clash = self.records.insert(offset, RangeEntry::proxy(len, 1));
        debug_assert!(clash.is_none(), "two records at offset {}", offset);
    }
}
