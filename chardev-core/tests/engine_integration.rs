//! Deterministic tests for the deferred task engine
//!
//! The engine is driven by hand on the test thread. Triggers are fired
//! from the delay hook, which is exactly where an interrupt would land
//! while a run sleeps between flips.

#![cfg(all(feature = "std", feature = "sim"))]

mod common;

use std::sync::atomic::Ordering;

use chardev_core::engine::ScheduleOutcome;
use chardev_core::{CoalescePolicy, DeferredTask, EdgeEvent, EdgeTrigger, IrqReturn, TaskState, ToggleSequence};
use chardev_core::trigger::{Handler, NoWake};
use fugit::MillisDurationU32;

use common::{RecordingDelay, RecordingOutput};

fn sequence(iterations: u32) -> ToggleSequence {
    ToggleSequence::new(iterations, MillisDurationU32::millis(100))
}

#[test]
fn test_default_sequence_is_100_flips_100ms_apart() {
    let task = DeferredTask::default();
    let output = RecordingOutput::starting(true);
    let mut delay = RecordingDelay::default();

    task.schedule();
    let report = task.run_pending(&ToggleSequence::default(), &output, &mut delay).unwrap();

    assert_eq!(report.flips, 100);
    assert_eq!(delay.pauses, vec![100; 100]);
    assert_eq!(ToggleSequence::default().worst_case_ms(), 10_000);

    let levels = output.levels.borrow();
    assert!(levels.iter().step_by(2).all(|l| !*l));
    assert!(levels.iter().skip(1).step_by(2).all(|l| *l));
    assert_eq!(levels.last(), Some(&true));
}

#[test]
fn test_idle_task_does_nothing() {
    let task = DeferredTask::default();
    let output = RecordingOutput::default();
    let mut delay = RecordingDelay::default();

    assert!(task.run_pending(&sequence(3), &output, &mut delay).is_none());
    assert!(output.levels.borrow().is_empty());
    assert!(delay.pauses.is_empty());
}

#[test]
fn test_edges_mid_run_requeue_exactly_one_run() {
    let task = DeferredTask::new(CoalescePolicy::Requeue);
    let trigger = EdgeTrigger::new(&task, NoWake);
    let output = RecordingOutput::default();

    trigger.handle(EdgeEvent { line: 115, timestamp: 0 });
    let mut delay = RecordingDelay::with_hook(|i| {
        if i < 3 {
            assert_eq!(trigger.handle(EdgeEvent { line: 115, timestamp: i as u64 + 1 }), IrqReturn::Handled);
        }
    });

    assert_eq!(task.run_until_idle(&sequence(4), &output, &mut delay), 2);
    assert_eq!(task.state(), TaskState::Idle);
    assert_eq!(output.levels.borrow().len(), 8);
    assert_eq!(task.stats().rearmed.load(Ordering::Relaxed), 1);
    assert_eq!(task.stats().coalesced.load(Ordering::Relaxed), 2);
    assert_eq!(trigger.edges(), 4);
}

#[test]
fn test_edges_mid_run_dropped() {
    let task = DeferredTask::new(CoalescePolicy::Drop);
    let output = RecordingOutput::default();

    assert_eq!(task.schedule(), ScheduleOutcome::Scheduled);
    let mut delay = RecordingDelay::with_hook(|_| {
        assert_eq!(task.schedule(), ScheduleOutcome::Coalesced);
    });

    assert_eq!(task.run_until_idle(&sequence(4), &output, &mut delay), 1);
    assert_eq!(task.stats().runs.load(Ordering::Relaxed), 1);
    assert_eq!(output.levels.borrow().len(), 4);
}

#[test]
fn test_scheduled_twice_before_pickup_is_one_run() {
    let task = DeferredTask::new(CoalescePolicy::Requeue);
    assert_eq!(task.schedule(), ScheduleOutcome::Scheduled);
    assert_eq!(task.schedule(), ScheduleOutcome::Coalesced);

    let output = RecordingOutput::default();
    let mut delay = RecordingDelay::default();
    assert_eq!(task.run_until_idle(&sequence(2), &output, &mut delay), 1);
}
