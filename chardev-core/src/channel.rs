//! Bounded Circular Byte Channel
//!
//! ## Overview
//!
//! A fixed-capacity ring of bytes shared between a producer that may run in
//! interrupt context and a consumer that runs in a task. Every operation runs
//! inside a `critical_section`, which is the only lock that is safe to take
//! from an interrupt handler: it never sleeps, it only masks preemption for
//! the few instructions of a copy.
//!
//! ```text
//! ByteChannel (capacity 8, length 5):
//! ┌─────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┐
//! │  d  │  e  │     │     │     │  a  │  b  │  c  │
//! └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//!                ↑                 ↑
//!            write_pos          read_pos
//! ```
//!
//! ## Transfer policy
//!
//! - `write` accepts the prefix that fits and reports how many bytes it took.
//!   Offering more than the free space is not an error.
//! - `read` returns up to the requested count; an empty channel yields zero
//!   bytes immediately.
//! - `poll_read` / `poll_write` are the `nb` flavour of the same calls: they
//!   report `WouldBlock` where the plain calls would return zero, so callers
//!   that want to wait can use `nb::block!`.
//!
//! ## Invariants
//!
//! - `length <= capacity`
//! - `read_pos < capacity` and `write_pos < capacity`
//! - `write_pos == (read_pos + length) % capacity`
//!
//! ## Resizing
//!
//! New storage is allocated before the critical section is entered, so the
//! interrupt side never waits on the allocator. Bytes still held are kept in
//! FIFO order. Shrinking below the current length is refused and leaves the
//! channel untouched.

use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::convert::Infallible;
use core::sync::atomic::{AtomicUsize, Ordering};

use critical_section::Mutex;

use crate::constants::MAX_FIFO_CAPACITY;
use crate::errors::{ChannelError, ChannelResult};

/// Snapshot of the channel fill level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelInfo {
    /// Total bytes the channel can hold
    pub capacity: usize,
    /// Bytes currently held
    pub length: usize,
    /// Free space, always `capacity - length`
    pub available: usize,
}

/// Transfer counters, updated outside the critical section
#[derive(Debug, Default)]
pub struct ChannelStats {
    /// Bytes accepted by `write`
    pub written: AtomicUsize,
    /// Bytes handed out by `read`
    pub read: AtomicUsize,
    /// Bytes offered to `write` that did not fit
    pub refused: AtomicUsize,
}

struct Ring {
    storage: Vec<u8>,
    length: usize,
    read_pos: usize,
    write_pos: usize,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn push(&mut self, bytes: &[u8]) -> usize {
        let cap = self.capacity();
        let count = bytes.len().min(cap - self.length);
        if count == 0 {
            return 0;
        }

        // First segment runs up to the physical end, second wraps to 0
        let first = count.min(cap - self.write_pos);
        self.storage[self.write_pos..self.write_pos + first].copy_from_slice(&bytes[..first]);
        self.storage[..count - first].copy_from_slice(&bytes[first..count]);

        self.write_pos = (self.write_pos + count) % cap;
        self.length += count;
        count
    }

    fn pop(&mut self, out: &mut [u8]) -> usize {
        let cap = self.capacity();
        let count = out.len().min(self.length);
        if count == 0 {
            return 0;
        }

        let first = count.min(cap - self.read_pos);
        out[..first].copy_from_slice(&self.storage[self.read_pos..self.read_pos + first]);
        out[first..count].copy_from_slice(&self.storage[..count - first]);

        self.read_pos = (self.read_pos + count) % cap;
        self.length -= count;
        count
    }

    fn reset(&mut self) {
        self.length = 0;
        self.read_pos = 0;
        self.write_pos = 0;
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            capacity: self.capacity(),
            length: self.length,
            available: self.capacity() - self.length,
        }
    }
}

/// Interrupt-safe bounded byte FIFO
///
/// `write` may be called from an interrupt handler; every other operation is
/// meant for task context but is equally safe from either side.
pub struct ByteChannel {
    ring: Mutex<RefCell<Ring>>,
    stats: ChannelStats,
}

impl ByteChannel {
    /// Create a channel holding at most `capacity` bytes
    ///
    /// Fails with `InvalidCapacity` for zero or oversize requests and with
    /// `AllocationFailed` when the storage cannot be reserved.
    pub fn with_capacity(capacity: usize) -> ChannelResult<Self> {
        let storage = allocate(capacity)?;
        log_debug!("channel: allocated {} bytes", capacity);

        Ok(Self {
            ring: Mutex::new(RefCell::new(Ring {
                storage,
                length: 0,
                read_pos: 0,
                write_pos: 0,
            })),
            stats: ChannelStats::default(),
        })
    }

    /// Copy as many leading bytes of `bytes` as fit; returns the count taken
    pub fn write(&self, bytes: &[u8]) -> usize {
        let accepted = critical_section::with(|cs| self.ring.borrow(cs).borrow_mut().push(bytes));

        self.stats.written.fetch_add(accepted, Ordering::Relaxed);
        if accepted < bytes.len() {
            self.stats.refused.fetch_add(bytes.len() - accepted, Ordering::Relaxed);
        }
        accepted
    }

    /// Move up to `out.len()` bytes into `out`; returns the count moved
    ///
    /// Returns 0 immediately when the channel is empty.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let count = critical_section::with(|cs| self.ring.borrow(cs).borrow_mut().pop(out));
        self.stats.read.fetch_add(count, Ordering::Relaxed);
        count
    }

    /// Like [`read`](Self::read) but reports `WouldBlock` instead of 0
    ///
    /// An empty `out` always returns `Ok(0)`.
    pub fn poll_read(&self, out: &mut [u8]) -> nb::Result<usize, Infallible> {
        if out.is_empty() {
            return Ok(0);
        }
        match self.read(out) {
            0 => Err(nb::Error::WouldBlock),
            n => Ok(n),
        }
    }

    /// Like [`write`](Self::write) but reports `WouldBlock` when nothing fits
    pub fn poll_write(&self, bytes: &[u8]) -> nb::Result<usize, Infallible> {
        if bytes.is_empty() {
            return Ok(0);
        }
        match self.write(bytes) {
            0 => Err(nb::Error::WouldBlock),
            n => Ok(n),
        }
    }

    /// Drop every held byte and rewind both cursors
    pub fn clear(&self) {
        critical_section::with(|cs| self.ring.borrow(cs).borrow_mut().reset());
        log_debug!("channel: cleared");
    }

    /// Current fill level
    pub fn info(&self) -> ChannelInfo {
        critical_section::with(|cs| self.ring.borrow(cs).borrow().info())
    }

    /// Bytes currently held
    pub fn len(&self) -> usize {
        self.info().length
    }

    /// True if no bytes are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total capacity
    pub fn capacity(&self) -> usize {
        self.info().capacity
    }

    /// Replace the backing storage with one of `new_capacity` bytes
    ///
    /// Held bytes are carried over in order. On any error the channel is
    /// left exactly as it was.
    pub fn resize(&self, new_capacity: usize) -> ChannelResult<ChannelInfo> {
        let mut fresh = allocate(new_capacity)?;

        let old = critical_section::with(|cs| {
            let mut ring = self.ring.borrow(cs).borrow_mut();
            if ring.length > new_capacity {
                return Err(ChannelError::WouldTruncate {
                    requested: new_capacity,
                    length: ring.length,
                });
            }

            let held = ring.length;
            let moved = ring.pop(&mut fresh[..held]);
            debug_assert_eq!(moved, held);

            let old = core::mem::replace(&mut ring.storage, fresh);
            ring.length = held;
            ring.read_pos = 0;
            ring.write_pos = held % new_capacity;
            Ok(old)
        })?;

        // Old storage is freed outside the critical section
        drop(old);

        let info = self.info();
        log_info!("channel: resized to {} bytes ({} held)", info.capacity, info.length);
        Ok(info)
    }

    /// Transfer counters
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

// The ring sits behind the critical section; print a snapshot instead
impl fmt::Debug for ByteChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteChannel")
            .field("info", &self.info())
            .field("stats", &self.stats)
            .finish()
    }
}

fn allocate(capacity: usize) -> ChannelResult<Vec<u8>> {
    if capacity == 0 || capacity > MAX_FIFO_CAPACITY {
        return Err(ChannelError::InvalidCapacity {
            requested: capacity,
            max: MAX_FIFO_CAPACITY,
        });
    }

    let mut storage = Vec::new();
    storage
        .try_reserve_exact(capacity)
        .map_err(|_| ChannelError::AllocationFailed { bytes: capacity })?;
    storage.resize(capacity, 0);
    Ok(storage)
}
