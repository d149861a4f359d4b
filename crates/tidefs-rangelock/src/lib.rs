#![warn(missing_docs)]

//! TideFS range locking: byte-range reader/writer locks over file and volume objects
//!
//! This crate serializes I/O to a single object at byte granularity. One
//! [`RangeLock`] guards one object; threads lock the extent they are about
//! to touch with [`RangeLock::enter`] and drop the returned
//! [`LockedRange`] when the I/O is done. Non-overlapping operations never
//! contend, any number of readers share overlapping extents, and a writer
//! excludes everything it overlaps.
//!
//! In the common case a lock covers bytes nobody else is using and costs
//! one record in an ordered index. When readers do overlap, their coverage
//! is decomposed into reference-counted proxy segments that partition the
//! covered bytes, so each segment knows exactly how many readers hold it.
//! Writers that find a conflict park on the manager's condition variable
//! and re-evaluate their request each time a conflicting record goes away;
//! records carry `write_wanted`/`read_wanted` flags so arriving readers
//! defer to writers that got there first.
//!
//! Appends and size-changing writes go through an optional
//! [`RangePolicy`] installed at construction. The policy runs under the
//! manager's mutex on every admission attempt, anchoring appends at the
//! current end of object and widening writes that will change the
//! object's block size to the whole range `[0, u64::MAX)`; such a lock is
//! later narrowed in place with [`LockedRange::reduce`] once the new size
//! is known. Managers without a policy (fixed-block volumes) treat
//! appends as plain writers at the requested offset.
//!
//! Callers must take the range lock before latching pages or buffers for
//! the covered bytes, and must take the whole range as a writer before
//! changing the object's size downward; readers of object size outside
//! any lock see it only advisorily.

pub mod lock;
pub mod policy;
pub mod range;
pub mod stats;

mod tree;

pub use lock::{LockedRange, RangeLock};
pub use policy::RangePolicy;
pub use range::{LockRecord, LockRequest, LockType};
pub use stats::RangeLockStats;
