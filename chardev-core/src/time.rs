//! Time sources for edge events
//!
//! Edge events carry a logical timestamp. Nothing in the cores depends on
//! its precision; it orders events in logs and lets tests tell two edges
//! apart. Sources:
//! - Tick counter (every call returns the next value)
//! - Monotonic clock since start (requires std)
//! - Fixed time for tests

use core::sync::atomic::{AtomicU64, Ordering};

/// Logical timestamp; unit depends on the source
pub type Timestamp = u64;

/// Source of timestamps
///
/// `now` is called from interrupt context and must not block.
pub trait TimeSource: Send + Sync {
    /// Current timestamp
    fn now(&self) -> Timestamp;

    /// Check if this source tracks elapsed time (vs a plain counter)
    fn is_clock(&self) -> bool;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn is_clock(&self) -> bool {
        (**self).is_clock()
    }
}

/// Counter that advances by one on every read
#[derive(Debug, Default)]
pub struct TickCounter {
    ticks: AtomicU64,
}

impl TickCounter {
    /// Counter starting at zero
    pub const fn new() -> Self {
        Self { ticks: AtomicU64::new(0) }
    }
}

impl TimeSource for TickCounter {
    fn now(&self) -> Timestamp {
        self.ticks.fetch_add(1, Ordering::Relaxed)
    }

    fn is_clock(&self) -> bool {
        false
    }
}

/// Milliseconds since construction (requires std)
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct MonotonicMillis {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicMillis {
    /// Clock starting now
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicMillis {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimeSource for MonotonicMillis {
    fn now(&self) -> Timestamp {
        self.start.elapsed().as_millis() as Timestamp
    }

    fn is_clock(&self) -> bool {
        true
    }
}

/// Fixed time source for testing
#[derive(Debug, Default)]
pub struct FixedTime {
    timestamp: AtomicU64,
}

impl FixedTime {
    /// Source frozen at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp: AtomicU64::new(timestamp) }
    }

    /// Move to `timestamp`
    pub fn set(&self, timestamp: Timestamp) {
        self.timestamp.store(timestamp, Ordering::Relaxed);
    }

    /// Move forward by `delta`
    pub fn advance(&self, delta: u64) {
        self.timestamp.fetch_add(delta, Ordering::Relaxed);
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp.load(Ordering::Relaxed)
    }

    fn is_clock(&self) -> bool {
        false
    }
}
