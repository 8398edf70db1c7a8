//! Deferred Task Engine
//!
//! ## Overview
//!
//! An interrupt handler may not sleep, but the work an edge asks for does:
//! it flips an output line a fixed number of times with a pause between
//! flips. The engine splits the two. The interrupt side only moves the task
//! state with one compare-and-set; the task side, running wherever sleeping
//! is allowed, picks the task up and runs the sequence to completion.
//!
//! ## State machine
//!
//! ```text
//!            schedule()                 run_pending()
//!   Idle ───────────────▶ Scheduled ───────────────▶ Running
//!    ▲                        ▲                      │    │
//!    │                        │ run finished,        │    │ schedule()
//!    │                        │ re-armed             │    ▼ (Requeue)
//!    │                        └──────────────── Running + re-armed
//!    │                                               │
//!    └────────────────── run finished ───────────────┘
//! ```
//!
//! - `schedule` from `Scheduled` is always a no-op: the pending run will
//!   see whatever the new edge wanted.
//! - `schedule` while running re-arms the task once under
//!   [`CoalescePolicy::Requeue`], or is dropped under
//!   [`CoalescePolicy::Drop`]. Further triggers are no-ops either way.
//! - Only the task side leaves `Running`, so runs never overlap.
//!
//! ## Timing
//!
//! The pause after each flip is the only suspension point of a run. The
//! worst-case run time is `iterations * interval`; there is no cancellation,
//! a run always completes.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use fugit::MillisDurationU32;

use crate::constants::{TOGGLE_INTERVAL, TOGGLE_ITERATIONS};
use crate::errors::SignalError;

const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const RUNNING: u8 = 2;
const RUNNING_REARMED: u8 = 3;

/// Externally visible task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Nothing to do
    Idle,
    /// A run has been requested and not yet picked up
    Scheduled,
    /// A run is in progress
    Running,
}

/// What happens to a trigger that arrives while a run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoalescePolicy {
    /// Remember one more run, started as soon as the current one ends
    #[default]
    Requeue,
    /// Forget the trigger
    Drop,
}

/// Result of a scheduling request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Task moved from idle to scheduled
    Scheduled,
    /// A run is in progress; another one will follow it
    Rearmed,
    /// Request merged into an already pending run, or dropped
    Coalesced,
}

/// Bounded toggle sequence parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleSequence {
    /// Flips per run
    pub iterations: u32,
    /// Pause after every flip
    pub interval: MillisDurationU32,
}

impl ToggleSequence {
    /// Sequence of `iterations` flips, `interval` apart
    pub const fn new(iterations: u32, interval: MillisDurationU32) -> Self {
        Self { iterations, interval }
    }

    /// Upper bound on how long one run takes
    pub fn worst_case_ms(&self) -> u64 {
        self.iterations as u64 * self.interval.to_millis() as u64
    }
}

impl Default for ToggleSequence {
    fn default() -> Self {
        Self::new(TOGGLE_ITERATIONS, TOGGLE_INTERVAL)
    }
}

/// Blocking millisecond delay used between flips
pub trait DelayMs {
    /// Suspend the calling task for at least `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
}

/// The line a run toggles
pub trait ToggleOutput {
    /// Level last driven
    fn level(&self) -> bool;

    /// Drive the line and remember the level
    fn set_level(&self, high: bool) -> Result<(), SignalError>;
}

/// Summary of one completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Flips that reached the line
    pub flips: u32,
    /// Flips the line refused
    pub failed_writes: u32,
}

/// Counters kept by the task
#[derive(Debug, Default)]
pub struct TaskStats {
    /// Runs finished
    pub runs: AtomicU32,
    /// Triggers that went from idle to scheduled
    pub scheduled: AtomicU32,
    /// Triggers that re-armed a running task
    pub rearmed: AtomicU32,
    /// Triggers merged or dropped
    pub coalesced: AtomicU32,
    /// Flips performed across all runs
    pub flips: AtomicU32,
}

/// Single deferred task shared by the trigger and the task context
#[derive(Debug)]
pub struct DeferredTask {
    state: AtomicU8,
    policy: CoalescePolicy,
    iteration: AtomicU32,
    stats: TaskStats,
}

impl DeferredTask {
    /// Idle task with the given coalescing policy
    pub const fn new(policy: CoalescePolicy) -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            policy,
            iteration: AtomicU32::new(0),
            stats: TaskStats {
                runs: AtomicU32::new(0),
                scheduled: AtomicU32::new(0),
                rearmed: AtomicU32::new(0),
                coalesced: AtomicU32::new(0),
                flips: AtomicU32::new(0),
            },
        }
    }

    /// Current state
    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            IDLE => TaskState::Idle,
            SCHEDULED => TaskState::Scheduled,
            _ => TaskState::Running,
        }
    }

    /// True if another run will follow the current one
    pub fn is_rearmed(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING_REARMED
    }

    /// Coalescing policy fixed at construction
    pub fn policy(&self) -> CoalescePolicy {
        self.policy
    }

    /// Flips done by the current run (or by the last one, once idle)
    pub fn iteration(&self) -> u32 {
        self.iteration.load(Ordering::Relaxed)
    }

    /// Counters
    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    /// Request a run; safe from interrupt context
    ///
    /// Never blocks and never fails. The caller is expected to wake the task
    /// context when the outcome is [`ScheduleOutcome::Scheduled`].
    pub fn schedule(&self) -> ScheduleOutcome {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let next = match (current, self.policy) {
                (IDLE, _) => SCHEDULED,
                (RUNNING, CoalescePolicy::Requeue) => RUNNING_REARMED,
                _ => {
                    self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                    return ScheduleOutcome::Coalesced;
                }
            };

            match self.state.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) if next == SCHEDULED => {
                    self.stats.scheduled.fetch_add(1, Ordering::Relaxed);
                    return ScheduleOutcome::Scheduled;
                }
                Ok(_) => {
                    self.stats.rearmed.fetch_add(1, Ordering::Relaxed);
                    return ScheduleOutcome::Rearmed;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Execute one run if one is scheduled; task context only
    ///
    /// Returns `None` without touching the line when the task is idle or
    /// already running elsewhere.
    pub fn run_pending<O, D>(&self, sequence: &ToggleSequence, output: &O, delay: &mut D) -> Option<RunReport>
    where
        O: ToggleOutput + ?Sized,
        D: DelayMs + ?Sized,
    {
        if self
            .state
            .compare_exchange(SCHEDULED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        log_info!("engine: run started ({} flips)", sequence.iterations);
        self.iteration.store(0, Ordering::Relaxed);

        let mut report = RunReport::default();
        for i in 0..sequence.iterations {
            let next = !output.level();
            match output.set_level(next) {
                Ok(()) => {
                    report.flips += 1;
                    self.stats.flips.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    log_warn!("engine: flip {} refused: {}", i, e);
                    report.failed_writes += 1;
                }
            }
            self.iteration.store(i + 1, Ordering::Relaxed);
            delay.delay_ms(sequence.interval.to_millis());
        }

        self.stats.runs.fetch_add(1, Ordering::Relaxed);
        self.finish();
        log_info!("engine: run completed ({} flips, {} refused)", report.flips, report.failed_writes);
        Some(report)
    }

    /// Keep running until no run is pending; returns the number of runs
    pub fn run_until_idle<O, D>(&self, sequence: &ToggleSequence, output: &O, delay: &mut D) -> u32
    where
        O: ToggleOutput + ?Sized,
        D: DelayMs + ?Sized,
    {
        let mut runs = 0;
        while self.run_pending(sequence, output, delay).is_some() {
            runs += 1;
        }
        runs
    }

    fn finish(&self) {
        // Only this side leaves RUNNING / RUNNING_REARMED, so a re-armed
        // task can be moved to SCHEDULED with a plain store
        if let Err(actual) = self
            .state
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
        {
            debug_assert_eq!(actual, RUNNING_REARMED);
            self.state.store(SCHEDULED, Ordering::Release);
            log_debug!("engine: re-armed run queued");
        }
    }
}

impl Default for DeferredTask {
    fn default() -> Self {
        Self::new(CoalescePolicy::default())
    }
}
