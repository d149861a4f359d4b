//! Test harness: simulated file objects and the reference write policy.
//!
//! `SimulatedFile` drives a [`RangeLock`] the way a filesystem write path
//! does: writes lock before touching object state, appends anchor at the
//! current end of file, and writes that outgrow the block size take the
//! whole range, change the block size, then narrow to the bytes written.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tidefs_rangelock::{LockRequest, LockType, LockedRange, RangeLock, RangePolicy};

/// Installs the fmt subscriber once; later calls are no-ops so every
/// test can ask for logging.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Mutable object metadata shared between the lock policy and the test
/// driver.
#[derive(Debug, Default)]
pub struct ObjectState {
    size: AtomicU64,
    block_size: AtomicU64,
}

impl ObjectState {
    pub fn new(size: u64, block_size: u64) -> Self {
        Self {
            size: AtomicU64::new(size),
            block_size: AtomicU64::new(block_size),
        }
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    pub fn set_size(&self, size: u64) {
        self.size.store(size, Ordering::SeqCst);
    }

    /// Monotonically extends the size; concurrent writers race safely.
    pub fn grow_to(&self, end: u64) {
        self.size.fetch_max(end, Ordering::SeqCst);
    }

    pub fn block_size(&self) -> u64 {
        self.block_size.load(Ordering::SeqCst)
    }

    pub fn set_block_size(&self, block_size: u64) {
        self.block_size.store(block_size, Ordering::SeqCst);
    }
}

/// Reference write policy for file-like objects.
///
/// Appends anchor at the current end of object. A write that lands past
/// the current block size while the block can still grow (block size not
/// a power of two, or below the configured maximum) is widened to the
/// whole range so the caller may change the block size exclusively and
/// then [`reduce`](LockedRange::reduce) to the bytes actually written.
pub struct GrowPolicy {
    state: Arc<ObjectState>,
    max_block_size: u64,
}

impl GrowPolicy {
    pub fn new(state: Arc<ObjectState>, max_block_size: u64) -> Self {
        Self {
            state,
            max_block_size,
        }
    }
}

impl RangePolicy for GrowPolicy {
    fn resolve_writer(&self, req: &mut LockRequest) {
        let size = self.state.size();
        if req.kind == LockType::Append {
            req.offset = size;
            req.kind = LockType::Writer;
        }
        let block = self.state.block_size();
        let end_size = size.max(req.offset.saturating_add(req.len));
        if end_size > block && (!block.is_power_of_two() || block < self.max_block_size) {
            req.offset = 0;
            req.len = u64::MAX;
        }
    }
}

/// One file with a lock manager, sized like a file under test.
pub struct SimulatedFile {
    state: Arc<ObjectState>,
    lock: RangeLock,
    max_block_size: u64,
}

impl SimulatedFile {
    pub fn new(block_size: u64, max_block_size: u64) -> Self {
        let state = Arc::new(ObjectState::new(0, block_size));
        let lock = RangeLock::with_policy(GrowPolicy::new(Arc::clone(&state), max_block_size));
        Self {
            state,
            lock,
            max_block_size,
        }
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    pub fn lock(&self) -> &RangeLock {
        &self.lock
    }

    pub fn size(&self) -> u64 {
        self.state.size()
    }

    /// Writes `len` bytes at `offset`; returns the object size afterwards.
    pub fn write(&self, offset: u64, len: u64) -> u64 {
        let mut guard = self.lock.enter(offset, len, LockType::Writer);
        self.finish_write(&mut guard, offset, len);
        self.state.size()
    }

    /// Appends `len` bytes; returns the offset where they landed.
    pub fn append(&self, len: u64) -> u64 {
        let mut guard = self.lock.enter(0, len, LockType::Append);
        // A widened append holds the whole range, so the size is stable
        // and gives the anchor; otherwise the guard carries it.
        let offset = if guard.len() == u64::MAX {
            self.state.size()
        } else {
            guard.offset()
        };
        self.finish_write(&mut guard, offset, len);
        offset
    }

    /// Reads up to `len` bytes at `offset`; returns how many bytes were
    /// inside the object.
    pub fn read(&self, offset: u64, len: u64) -> u64 {
        let _guard = self.lock.enter(offset, len, LockType::Reader);
        let size = self.state.size();
        if offset >= size {
            0
        } else {
            (size - offset).min(len)
        }
    }

    /// Sets the size downward under the whole-range writer lock, the way
    /// truncation must.
    pub fn truncate(&self, new_size: u64) {
        let _guard = self.lock.enter(0, u64::MAX, LockType::Writer);
        self.state.set_size(new_size);
    }

    fn finish_write(&self, guard: &mut LockedRange<'_>, offset: u64, len: u64) {
        let end = offset + len;
        if guard.len() == u64::MAX {
            let grown = end.next_power_of_two().min(self.max_block_size);
            if grown > self.state.block_size() {
                self.state.set_block_size(grown);
            }
            self.state.grow_to(end);
            guard.reduce(offset, len);
        } else {
            self.state.grow_to(end);
        }
    }
}
