//! Edge-Trigger Handler
//!
//! Runs in interrupt context. Its whole job is one compare-and-set on the
//! deferred task and, when that moved the task out of idle, a non-blocking
//! wake of whatever executes the task. It always acknowledges the interrupt
//! as handled.

use core::ops::Deref;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::engine::{DeferredTask, ScheduleOutcome};
use crate::signal::LineId;
use crate::time::Timestamp;

/// Interrupt acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// Interrupt was not from this device
    None,
    /// Interrupt was serviced
    Handled,
}

/// One hardware edge, alive only for the duration of the handler call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Line that saw the edge
    pub line: LineId,
    /// Logical time of the edge
    pub timestamp: Timestamp,
}

/// Interrupt handler
pub trait Handler {
    /// Service one interrupt; must not block
    fn handle(&self, event: EdgeEvent) -> IrqReturn;
}

/// Non-blocking notification of the task context
pub trait Wake {
    /// Signal that a run is pending; must not block
    fn wake(&self);
}

/// For executors that poll the task instead of waiting to be woken
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWake;

impl Wake for NoWake {
    fn wake(&self) {}
}

/// Hands edges off to a [`DeferredTask`]
///
/// `T` is anything that derefs to the task (`&DeferredTask`,
/// `Arc<DeferredTask>`), so the handler can either borrow a static task or
/// share ownership with a worker.
pub struct EdgeTrigger<T, W> {
    task: T,
    waker: W,
    edges: AtomicU32,
    last_edge: AtomicU64,
}

impl<T, W> EdgeTrigger<T, W>
where
    T: Deref<Target = DeferredTask>,
    W: Wake,
{
    /// Handler scheduling `task` and waking `waker`
    pub fn new(task: T, waker: W) -> Self {
        Self {
            task,
            waker,
            edges: AtomicU32::new(0),
            last_edge: AtomicU64::new(0),
        }
    }

    /// Edges seen so far
    pub fn edges(&self) -> u32 {
        self.edges.load(Ordering::Relaxed)
    }

    /// Timestamp of the latest edge, `None` before the first one
    pub fn last_edge(&self) -> Option<Timestamp> {
        (self.edges() > 0).then(|| self.last_edge.load(Ordering::Relaxed))
    }

    /// Task this handler schedules
    pub fn task(&self) -> &DeferredTask {
        &self.task
    }
}

impl<T, W> Handler for EdgeTrigger<T, W>
where
    T: Deref<Target = DeferredTask>,
    W: Wake,
{
    fn handle(&self, event: EdgeEvent) -> IrqReturn {
        self.last_edge.store(event.timestamp, Ordering::Relaxed);
        self.edges.fetch_add(1, Ordering::Relaxed);

        match self.task.schedule() {
            ScheduleOutcome::Scheduled => {
                log_trace!("trigger: edge on line {} at {}, run scheduled", event.line, event.timestamp);
                self.waker.wake();
            }
            ScheduleOutcome::Rearmed => {
                log_trace!("trigger: edge on line {} at {}, run re-armed", event.line, event.timestamp);
            }
            ScheduleOutcome::Coalesced => {
                log_trace!("trigger: edge on line {} at {}, coalesced", event.line, event.timestamp);
            }
        }

        IrqReturn::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CoalescePolicy, TaskState};
    use core::cell::Cell;

    #[derive(Default)]
    struct CountingWake(Cell<u32>);

    impl Wake for &CountingWake {
        fn wake(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn edge(timestamp: Timestamp) -> EdgeEvent {
        EdgeEvent { line: 115, timestamp }
    }

    #[test]
    fn first_edge_schedules_and_wakes() {
        let task = DeferredTask::new(CoalescePolicy::Requeue);
        let wake = CountingWake::default();
        let trigger = EdgeTrigger::new(&task, &wake);

        assert_eq!(trigger.handle(edge(1)), IrqReturn::Handled);
        assert_eq!(task.state(), TaskState::Scheduled);
        assert_eq!(wake.0.get(), 1);
    }

    #[test]
    fn burst_is_acknowledged_but_wakes_once() {
        let task = DeferredTask::new(CoalescePolicy::Requeue);
        let wake = CountingWake::default();
        let trigger = EdgeTrigger::new(&task, &wake);

        assert_eq!(trigger.last_edge(), None);
        for t in 0..10 {
            assert_eq!(trigger.handle(edge(t)), IrqReturn::Handled);
        }
        assert_eq!(wake.0.get(), 1);
        assert_eq!(trigger.edges(), 10);
        assert_eq!(trigger.last_edge(), Some(9));
        assert_eq!(task.stats().coalesced.load(Ordering::Relaxed), 9);
    }

    #[test]
    fn no_wake_still_schedules() {
        let task = DeferredTask::default();
        let trigger = EdgeTrigger::new(&task, NoWake);
        trigger.handle(edge(0));
        assert_eq!(trigger.task().state(), TaskState::Scheduled);
    }
}
