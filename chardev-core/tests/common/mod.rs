//! Shared fixtures for the integration tests
//!
//! - A board with the LED and switch lines and a fast blink configuration
//! - A switch "press" that drives the line and forwards the edge
//! - Recording output/delay doubles for driving the engine by hand

#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chardev_core::engine::{DelayMs, ToggleOutput};
use chardev_core::sim::SimGpio;
use chardev_core::{BlinkConfig, BlinkDevice, DeferredTask, IrqReturn, SignalError, TaskState, ToggleSequence};
use fugit::MillisDurationU32;

/// Flips per run used by the threaded tests
pub const FAST_FLIPS: u32 = 6;

/// Blink configuration with a short sequence so runs finish in milliseconds
pub fn fast_config() -> BlinkConfig {
    BlinkConfig {
        sequence: ToggleSequence::new(FAST_FLIPS, MillisDurationU32::millis(2)),
        ..BlinkConfig::default()
    }
}

/// Board chip and an initialised blink device on it
pub fn ready_blinker(config: BlinkConfig) -> (Arc<SimGpio>, BlinkDevice<SimGpio>) {
    let chip = Arc::new(SimGpio::board());
    let mut dev = BlinkDevice::new(Arc::clone(&chip), config);
    dev.init().expect("blink init");
    (chip, dev)
}

/// Press and release the switch; returns what the handler answered, if it ran
pub fn press(chip: &SimGpio, dev: &BlinkDevice<SimGpio>) -> Option<IrqReturn> {
    let line = dev.config().switch_line;
    let fired = chip.drive(line, true).then(|| dev.on_edge());
    chip.drive(line, false);
    fired
}

/// Poll until the task is idle; false on timeout
pub fn wait_idle(task: &DeferredTask, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if task.state() == TaskState::Idle && !task.is_rearmed() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

/// Poll until `cond` holds; false on timeout
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

/// Output double that records every level it is driven to
#[derive(Default)]
pub struct RecordingOutput {
    pub levels: RefCell<Vec<bool>>,
    pub start: bool,
}

impl RecordingOutput {
    pub fn starting(level: bool) -> Self {
        Self { levels: RefCell::new(Vec::new()), start: level }
    }
}

impl ToggleOutput for RecordingOutput {
    fn level(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(self.start)
    }

    fn set_level(&self, high: bool) -> Result<(), SignalError> {
        self.levels.borrow_mut().push(high);
        Ok(())
    }
}

/// Delay double that records the pauses and can run a hook at each one
#[derive(Default)]
pub struct RecordingDelay<'a> {
    pub pauses: Vec<u32>,
    pub hook: Option<Box<dyn FnMut(usize) + 'a>>,
}

impl<'a> RecordingDelay<'a> {
    pub fn with_hook(hook: impl FnMut(usize) + 'a) -> Self {
        Self { pauses: Vec::new(), hook: Some(Box::new(hook)) }
    }
}

impl DelayMs for RecordingDelay<'_> {
    fn delay_ms(&mut self, ms: u32) {
        let index = self.pauses.len();
        self.pauses.push(ms);
        if let Some(hook) = self.hook.as_mut() {
            hook(index);
        }
    }
}
