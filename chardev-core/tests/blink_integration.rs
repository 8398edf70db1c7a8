//! Integration tests for the blink unit
//!
//! Drives [`BlinkDevice`] on the simulated board:
//! - A press produces one full toggle run on the worker thread
//! - Presses during a run are coalesced according to the policy
//! - Teardown waits for an in-flight run
//! - Every init failure rolls back in reverse acquisition order

#![cfg(all(feature = "std", feature = "sim"))]

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chardev_core::sim::{SimEvent, SimGpio, SIM_IRQ_BASE};
use chardev_core::{
    BlinkConfig, BlinkDevice, CoalescePolicy, Direction, InitError, IrqReturn, LineHandle, SignalError, TaskState,
    ToggleSequence, UnitState,
};
use chardev_core::errors::InitStage;
use chardev_core::time::FixedTime;
use fugit::MillisDurationU32;

use common::{fast_config, press, ready_blinker, wait_idle, wait_until, FAST_FLIPS};

const TIMEOUT: Duration = Duration::from_secs(5);

fn slow_config(policy: CoalescePolicy) -> BlinkConfig {
    BlinkConfig {
        sequence: ToggleSequence::new(10, MillisDurationU32::millis(5)),
        policy,
        ..BlinkConfig::default()
    }
}

#[test]
fn test_press_runs_one_full_sequence() {
    let (chip, dev) = ready_blinker(fast_config());
    let led = dev.config().led_line;
    assert!(chip.level(led));

    assert_eq!(press(&chip, &dev), Some(IrqReturn::Handled));
    assert!(wait_until(TIMEOUT, || dev.task().stats().runs.load(Ordering::Relaxed) == 1));
    assert!(wait_idle(dev.task(), TIMEOUT));

    assert_eq!(chip.writes(led), FAST_FLIPS);
    assert_eq!(dev.task().iteration(), FAST_FLIPS);
    // Even number of flips: back where it started
    assert!(chip.level(led));
    assert_eq!(dev.led_level(), Some(true));
}

#[test]
fn test_release_edge_is_ignored() {
    let (chip, dev) = ready_blinker(fast_config());
    let line = dev.config().switch_line;

    chip.drive(line, true);
    assert!(!chip.drive(line, false));
    assert!(!chip.drive(line, false));
}

#[test]
fn test_press_during_run_requeues_once() {
    let (chip, dev) = ready_blinker(slow_config(CoalescePolicy::Requeue));
    let led = dev.config().led_line;

    press(&chip, &dev);
    assert!(wait_until(TIMEOUT, || dev.task().state() == TaskState::Running));

    for _ in 0..5 {
        assert_eq!(press(&chip, &dev), Some(IrqReturn::Handled));
    }
    assert!(dev.task().is_rearmed());

    assert!(wait_until(TIMEOUT, || dev.task().stats().runs.load(Ordering::Relaxed) == 2));
    assert!(wait_idle(dev.task(), TIMEOUT));

    let stats = dev.task().stats();
    assert_eq!(stats.rearmed.load(Ordering::Relaxed), 1);
    assert_eq!(stats.coalesced.load(Ordering::Relaxed), 4);
    assert_eq!(chip.writes(led), 20);
    assert_eq!(dev.edges(), 6);
}

#[test]
fn test_press_during_run_is_dropped() {
    let (chip, dev) = ready_blinker(slow_config(CoalescePolicy::Drop));

    press(&chip, &dev);
    assert!(wait_until(TIMEOUT, || dev.task().state() == TaskState::Running));
    press(&chip, &dev);
    press(&chip, &dev);

    assert!(wait_idle(dev.task(), TIMEOUT));
    // Give a wrongly queued second run the chance to start
    std::thread::sleep(Duration::from_millis(20));

    let stats = dev.task().stats();
    assert_eq!(stats.runs.load(Ordering::Relaxed), 1);
    assert_eq!(stats.coalesced.load(Ordering::Relaxed), 2);
    assert_eq!(chip.writes(dev.config().led_line), 10);
}

#[test]
fn test_teardown_waits_for_running_sequence() {
    let (chip, mut dev) = ready_blinker(slow_config(CoalescePolicy::Requeue));

    press(&chip, &dev);
    assert!(wait_until(TIMEOUT, || dev.task().state() == TaskState::Running));
    dev.teardown();

    assert_eq!(dev.state(), UnitState::Uninitialized);
    assert_eq!(dev.task().stats().runs.load(Ordering::Relaxed), 1);
    assert_eq!(dev.task().iteration(), 10);
    assert_eq!(chip.writes(49), 10);
    assert!(!chip.is_claimed(49));
    assert!(!chip.is_claimed(115));

    // Edges after teardown reach nothing
    assert_eq!(press(&chip, &dev), None);
    assert_eq!(dev.on_edge(), IrqReturn::None);
}

#[test]
fn test_led_device_reflects_and_drives_line() {
    let (chip, dev) = ready_blinker(fast_config());
    let mut buf = [0u8; 4];

    assert_eq!(dev.read(&mut buf), Ok(2));
    assert_eq!(&buf[..2], b"1\n");

    assert_eq!(dev.write(b"0"), Ok(1));
    assert!(!chip.level(49));
    assert_eq!(dev.write(b"7 and more"), Ok(10));
    assert!(!chip.level(49));
    assert_eq!(dev.write(b"1\n"), Ok(2));
    assert!(chip.level(49));
    assert_eq!(dev.write(b""), Ok(0));
}

#[test]
fn test_init_twice_is_refused() {
    let (_chip, mut dev) = ready_blinker(fast_config());
    assert_eq!(dev.init(), Err(InitError::AlreadyInitialised));
    assert_eq!(dev.state(), UnitState::Ready);
}

#[test]
fn test_missing_led_acquires_nothing() {
    let chip = Arc::new(SimGpio::new());
    chip.add_line(115, true);
    let mut dev = BlinkDevice::new(Arc::clone(&chip), fast_config());

    let err = dev.init().unwrap_err();
    assert_eq!(err, InitError::Signal { stage: InitStage::OutputLine, cause: SignalError::NotAvailable(49) });
    assert_eq!(err.code(), -19);
    assert!(chip.journal().is_empty());
}

#[test]
fn test_busy_led_is_reported() {
    let chip = Arc::new(SimGpio::board());
    let other = LineHandle::acquire(&*chip, 49, Direction::Output, false, "other").unwrap();
    let mut dev = BlinkDevice::new(Arc::clone(&chip), fast_config());

    let err = dev.init().unwrap_err();
    assert_eq!(err.code(), -16);
    assert!(!chip.is_claimed(115));

    other.release(&*chip);
    dev.init().unwrap();
    assert_eq!(dev.state(), UnitState::Ready);
}

#[test]
fn test_led_configure_failure_releases_led() {
    let chip = Arc::new(SimGpio::board());
    chip.fail_configure(49);
    let mut dev = BlinkDevice::new(Arc::clone(&chip), fast_config());

    assert_eq!(dev.init().unwrap_err().stage(), Some(InitStage::OutputLine));
    assert_eq!(chip.journal().as_slice(), &[SimEvent::Requested(49), SimEvent::Freed(49)]);
}

#[test]
fn test_irq_failure_unwinds_everything_in_reverse() {
    let chip = Arc::new(SimGpio::new());
    chip.add_line(49, false);
    chip.add_line(115, false);
    let mut dev = BlinkDevice::new(Arc::clone(&chip), fast_config());

    let err = dev.init().unwrap_err();
    assert_eq!(err, InitError::Signal { stage: InitStage::EdgeIrq, cause: SignalError::NoInterrupt(115) });
    assert_eq!(dev.state(), UnitState::Uninitialized);
    assert_eq!(
        chip.journal().as_slice(),
        &[
            SimEvent::Requested(49),
            SimEvent::Requested(115),
            SimEvent::Freed(115),
            SimEvent::Freed(49),
        ]
    );
}

#[test]
fn test_full_cycle_journal() {
    let (chip, mut dev) = ready_blinker(fast_config());
    dev.teardown();
    dev.init().unwrap();
    drop(dev);

    let irq = SIM_IRQ_BASE + 115;
    let cycle = [
        SimEvent::Requested(49),
        SimEvent::Requested(115),
        SimEvent::IrqRequested(irq),
        SimEvent::IrqFreed(irq),
        SimEvent::Freed(115),
        SimEvent::Freed(49),
    ];
    let journal = chip.journal();
    assert_eq!(&journal[..6], &cycle);
    assert_eq!(&journal[6..], &cycle);
}

#[test]
fn test_edges_carry_clock_reading() {
    let chip = Arc::new(SimGpio::board());
    let clock = FixedTime::new(1_000);
    let mut dev = BlinkDevice::with_clock(Arc::clone(&chip), fast_config(), &clock);
    dev.init().unwrap();

    assert!(chip.drive(115, true));
    assert_eq!(dev.on_edge(), IrqReturn::Handled);
    assert_eq!(dev.last_edge(), Some(1_000));

    clock.advance(250);
    chip.drive(115, false);
    assert!(chip.drive(115, true));
    dev.on_edge();
    assert_eq!(dev.last_edge(), Some(1_250));
    assert_eq!(dev.edges(), 2);

    assert!(wait_idle(dev.task(), TIMEOUT));
    dev.teardown();
}
