//! Core range types for the lock manager.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Lock mode requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockType {
    /// Shared lock; any number of readers may cover the same bytes.
    Reader,
    /// Exclusive lock; excludes every other reader and writer.
    Writer,
    /// Writer lock whose offset is resolved by the manager's policy,
    /// typically anchored at the object's current end. Never stored:
    /// every append request is a `Writer` by the time it is admitted.
    Append,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockType::Reader => write!(f, "reader"),
            LockType::Writer => write!(f, "writer"),
            LockType::Append => write!(f, "append"),
        }
    }
}

/// A lock request being resolved against the index.
///
/// The manager hands a fresh copy of the caller's request to the
/// [`RangePolicy`](crate::RangePolicy) hook on every admission attempt;
/// the policy may rewrite `offset` and `len` and must leave `kind` as
/// [`LockType::Writer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequest {
    /// First byte covered by the request.
    pub offset: u64,
    /// Length in bytes. Saturated so `offset + len` cannot overflow;
    /// `u64::MAX` stands for "the rest of the address space".
    pub len: u64,
    /// Requested mode.
    pub kind: LockType,
}

impl LockRequest {
    /// Builds a request, saturating `len` against address-space overflow.
    pub fn new(offset: u64, len: u64, kind: LockType) -> Self {
        let mut req = Self { offset, len, kind };
        req.clamp();
        req
    }

    /// Saturates `len` so that `offset + len` stays representable.
    pub(crate) fn clamp(&mut self) {
        self.len = self.len.min(u64::MAX - self.offset);
    }

    /// One past the last byte covered.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// True if the two half-open extents intersect.
    pub fn overlaps(&self, other: &LockRequest) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

impl fmt::Display for LockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, {})", self.kind, self.offset, self.end())
    }
}

/// Read-only view of one live index record, as reported by
/// [`RangeLock::snapshot`](crate::RangeLock::snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// First byte covered by the record.
    pub offset: u64,
    /// Length in bytes.
    pub len: u64,
    /// `Reader` or `Writer`; append requests are resolved before insertion.
    pub kind: LockType,
    /// Number of logical reader locks covering this extent. Always 1 for
    /// a record that has never been shared.
    pub refs: u32,
    /// True if this record is a reference-counted proxy segment rather
    /// than a record inserted directly for one caller.
    pub proxy: bool,
}

impl LockRecord {
    /// One past the last byte covered.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// True if `pos` falls inside this record's extent.
    pub fn contains(&self, pos: u64) -> bool {
        self.offset <= pos && pos < self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_end() {
        let req = LockRequest::new(10, 20, LockType::Reader);
        assert_eq!(req.end(), 30);
    }

    #[test]
    fn test_request_len_saturates() {
        let req = LockRequest::new(u64::MAX - 5, 100, LockType::Writer);
        assert_eq!(req.len, 5);
        assert_eq!(req.end(), u64::MAX);
    }

    #[test]
    fn test_whole_range_request_does_not_overflow() {
        let req = LockRequest::new(0, u64::MAX, LockType::Writer);
        assert_eq!(req.len, u64::MAX);
        assert_eq!(req.end(), u64::MAX);
    }

    #[test]
    fn test_overlaps_detects_overlap() {
        let a = LockRequest::new(0, 100, LockType::Reader);
        assert!(a.overlaps(&LockRequest::new(50, 100, LockType::Reader)));
        assert!(a.overlaps(&LockRequest::new(0, 100, LockType::Writer)));
        assert!(a.overlaps(&LockRequest::new(99, 1, LockType::Reader)));
    }

    #[test]
    fn test_overlaps_non_overlapping() {
        let a = LockRequest::new(100, 100, LockType::Reader);
        assert!(!a.overlaps(&LockRequest::new(0, 100, LockType::Reader)));
        assert!(!a.overlaps(&LockRequest::new(200, 10, LockType::Reader)));
    }

    #[test]
    fn test_record_contains() {
        let rec = LockRecord {
            offset: 10,
            len: 5,
            kind: LockType::Reader,
            refs: 1,
            proxy: false,
        };
        assert!(!rec.contains(9));
        assert!(rec.contains(10));
        assert!(rec.contains(14));
        assert!(!rec.contains(15));
    }

    #[test]
    fn test_display() {
        let req = LockRequest::new(0, 10, LockType::Append);
        assert_eq!(format!("{}", req), "append [0, 10)");
        assert_eq!(format!("{}", LockType::Reader), "reader");
        assert_eq!(format!("{}", LockType::Writer), "writer");
    }
}
