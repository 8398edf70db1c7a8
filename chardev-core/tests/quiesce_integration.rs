//! Integration tests for producer quiescing at FIFO bring-up
//!
//! The delay hook samples the producer at every pause, so the tests see
//! the disable → wait → enable order from the outside.

#![cfg(all(feature = "std", feature = "sim"))]

mod common;

use std::cell::RefCell;

use chardev_core::constants::QUIESCE_RETRIES;
use chardev_core::sim::{ProducerEvent, SimProducer};
use chardev_core::{FifoConfig, FifoDevice, InitError, QuiesceReport, UnitState};
use common::RecordingDelay;
use fugit::MillisDurationU32;

fn config(quiesce_ms: u32) -> FifoConfig {
    FifoConfig {
        quiesce: MillisDurationU32::millis(quiesce_ms),
        ..FifoConfig::default()
    }
}

#[test]
fn test_producer_disabled_for_whole_quiet_period() {
    let producer = SimProducer::new();
    let seen = RefCell::new(Vec::new());
    let mut delay = RecordingDelay::with_hook(|_| seen.borrow_mut().push(producer.is_enabled()));

    let mut fifo = FifoDevice::new(config(400));
    let report = fifo.init_quiesced(&producer, &mut delay).unwrap();

    assert_eq!(report, QuiesceReport::default());
    assert_eq!(delay.pauses, [400]);
    assert_eq!(*seen.borrow(), [false]);
    assert!(producer.is_enabled());
    assert_eq!(fifo.state(), UnitState::Ready);
    assert_eq!(
        producer.journal().as_slice(),
        &[ProducerEvent::Disabled, ProducerEvent::Enabled]
    );
}

#[test]
fn test_busy_producer_drains_before_disable() {
    let producer = SimProducer::busy_for(4);
    let seen = RefCell::new(Vec::new());
    let mut delay = RecordingDelay::with_hook(|_| seen.borrow_mut().push(producer.is_enabled()));

    let mut fifo = FifoDevice::new(config(50));
    let report = fifo.init_quiesced(&producer, &mut delay).unwrap();

    assert_eq!(report, QuiesceReport { busy_polls: 4, forced: 0 });
    assert_eq!(delay.pauses, [1, 1, 1, 1, 50]);
    // Still enabled while draining, disabled only for the quiet period
    assert_eq!(*seen.borrow(), [true, true, true, true, false]);
}

#[test]
fn test_stuck_producer_bounded_by_retries() {
    let producer = SimProducer::busy_for(u32::MAX);
    let mut delay = RecordingDelay::default();

    let mut fifo = FifoDevice::new(config(20));
    let report = fifo.init_quiesced(&producer, &mut delay).unwrap();

    assert_eq!(report.forced, 2);
    assert_eq!(report.busy_polls, 2 * QUIESCE_RETRIES);
    assert_eq!(delay.pauses.iter().filter(|&&ms| ms == 1).count() as u32, 2 * QUIESCE_RETRIES);
    assert!(producer.is_enabled());
    assert_eq!(fifo.write(b"ok").unwrap(), 2);
}

#[test]
fn test_second_init_does_not_touch_producer() {
    let producer = SimProducer::new();
    let mut delay = RecordingDelay::default();
    let mut fifo = FifoDevice::new(config(10));
    fifo.init_quiesced(&producer, &mut delay).unwrap();

    assert_eq!(fifo.init_quiesced(&producer, &mut delay), Err(InitError::AlreadyInitialised));
    assert_eq!(producer.journal().len(), 2);
    assert_eq!(delay.pauses, [10]);
}
