//! Policy hook consulted while a writer lock is admitted.
//!
//! Append anchoring and block-growth widening are filesystem decisions,
//! not lock-manager decisions: the layer that owns the object's size and
//! block size installs a [`RangePolicy`] and the manager stays generic.

use crate::range::LockRequest;

/// Caller-supplied policy applied to writer and append requests.
///
/// The manager invokes [`resolve_writer`](RangePolicy::resolve_writer)
/// under its internal mutex on every admission attempt, always with a
/// fresh copy of the caller's original request. After a blocked writer
/// wakes up, external state such as the object's end may have moved, so
/// the rewrite is recomputed from scratch rather than compounded.
///
/// Implementations must:
/// - leave `req.kind` as [`LockType::Writer`](crate::LockType::Writer)
///   (append requests are converted here, e.g. by anchoring `req.offset`
///   at the object's current end);
/// - never block and never call back into the same
///   [`RangeLock`](crate::RangeLock);
/// - be deterministic for fixed external state.
///
/// A policy that widens a request to cover the whole object (offset 0,
/// length `u64::MAX`) makes the resulting lock eligible for
/// [`LockedRange::reduce`](crate::LockedRange::reduce) once the caller
/// knows the real extent of its write.
pub trait RangePolicy: Send + Sync {
    /// Rewrites `req` before the manager searches the index for conflicts.
    fn resolve_writer(&self, req: &mut LockRequest);
}

impl<F> RangePolicy for F
where
    F: Fn(&mut LockRequest) + Send + Sync,
{
    fn resolve_writer(&self, req: &mut LockRequest) {
        self(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::LockType;

    #[test]
    fn test_closure_policy() {
        let policy = |req: &mut LockRequest| {
            if req.kind == LockType::Append {
                req.offset = 4096;
                req.kind = LockType::Writer;
            }
        };
        let mut req = LockRequest::new(0, 512, LockType::Append);
        policy.resolve_writer(&mut req);
        assert_eq!(req.offset, 4096);
        assert_eq!(req.kind, LockType::Writer);
    }

    #[test]
    fn test_boxed_policy_object() {
        let policy: Box<dyn RangePolicy> = Box::new(|req: &mut LockRequest| {
            req.kind = LockType::Writer;
        });
        let mut req = LockRequest::new(10, 10, LockType::Append);
        policy.resolve_writer(&mut req);
        assert_eq!(req.kind, LockType::Writer);
        assert_eq!(req.offset, 10);
    }
}
