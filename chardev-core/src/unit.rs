//! Unit lifecycle and ordered resource ownership
//!
//! ## Overview
//!
//! A unit (the FIFO device, the blink device) goes through one lifecycle:
//!
//! ```text
//!                init()                 all acquired
//!  Uninitialized ──────▶ Initializing ─────────────────▶ Ready
//!        ▲                    │                            │
//!        │   failure: unwind  │                 teardown() │
//!        ├────────────────────┘                            ▼
//!        └───────────────────────────────────────── TearingDown
//! ```
//!
//! Everything a unit acquires is pushed onto its [`ResourceStack`] in
//! acquisition order. The same stack is unwound on a failed init and on
//! teardown, so release order is always the mirror of acquisition order
//! and no resource is released twice.

use heapless::Vec;

use crate::errors::InitError;

/// Lifecycle state of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnitState {
    /// Nothing acquired
    #[default]
    Uninitialized,
    /// Acquiring resources
    Initializing,
    /// All resources held, operations accepted
    Ready,
    /// Releasing resources
    TearingDown,
}

/// Lifecycle tracker embedded in each unit
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: UnitState,
}

impl Lifecycle {
    /// Tracker in `Uninitialized`
    pub const fn new() -> Self {
        Self { state: UnitState::Uninitialized }
    }

    /// Current state
    pub fn state(&self) -> UnitState {
        self.state
    }

    /// True once init completed and before teardown started
    pub fn is_ready(&self) -> bool {
        self.state == UnitState::Ready
    }

    /// Enter `Initializing`; fails unless the unit is uninitialised
    pub fn begin_init(&mut self) -> Result<(), InitError> {
        if self.state != UnitState::Uninitialized {
            log_warn!("unit: init while {:?}", self.state);
            return Err(InitError::AlreadyInitialised);
        }
        self.state = UnitState::Initializing;
        Ok(())
    }

    /// Init finished: `Initializing` to `Ready`
    pub fn ready(&mut self) {
        debug_assert_eq!(self.state, UnitState::Initializing);
        self.state = UnitState::Ready;
    }

    /// Init failed and was unwound: back to `Uninitialized`
    pub fn abort(&mut self) {
        debug_assert_eq!(self.state, UnitState::Initializing);
        self.state = UnitState::Uninitialized;
    }

    /// Enter `TearingDown`; returns false (and changes nothing) unless ready
    pub fn begin_teardown(&mut self) -> bool {
        if self.state != UnitState::Ready {
            return false;
        }
        self.state = UnitState::TearingDown;
        true
    }

    /// Teardown finished: back to `Uninitialized`
    pub fn finish_teardown(&mut self) {
        debug_assert_eq!(self.state, UnitState::TearingDown);
        self.state = UnitState::Uninitialized;
    }
}

/// Resources held by a unit, in acquisition order
#[derive(Debug)]
pub struct ResourceStack<R, const N: usize> {
    held: Vec<R, N>,
}

impl<R, const N: usize> Default for ResourceStack<R, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, const N: usize> ResourceStack<R, N> {
    /// Empty stack
    pub const fn new() -> Self {
        Self { held: Vec::new() }
    }

    /// Record an acquired resource
    ///
    /// When the stack is full the resource is handed back so the caller can
    /// release it before failing.
    pub fn push(&mut self, resource: R) -> Result<(), R> {
        self.held.push(resource)
    }

    /// Resources held, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.held.iter()
    }

    /// First held resource `f` maps to something
    pub fn find<'a, T: 'a>(&'a self, f: impl FnMut(&'a R) -> Option<T>) -> Option<T> {
        self.iter().find_map(f)
    }

    /// Number of resources held
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// True if nothing is held
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Release everything, newest first
    pub fn unwind(&mut self, mut release: impl FnMut(R)) {
        while let Some(resource) = self.held.pop() {
            release(resource);
        }
    }
}
