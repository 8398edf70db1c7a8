//! Edge-triggered blink unit
//!
//! ## Overview
//!
//! A rising edge on the switch line schedules one toggle run of the LED
//! line; the run happens on a worker thread, never in the handler.
//!
//! ```text
//!  switch ──edge──▶ on_edge() ──schedule──▶ DeferredTask
//!                       │                        │
//!                       └──────unpark──────▶ Worker ──flip x N──▶ LED
//! ```
//!
//! ## Resources
//!
//! `init` acquires, in order: the LED line (driven high), the switch line,
//! the worker thread, then the edge interrupt. The interrupt comes last so
//! no edge can arrive before there is a worker to wake. Any failure unwinds
//! what was acquired so far, newest first; `teardown` unwinds the same way:
//!
//! 1. the interrupt is freed, so no new run can be scheduled
//! 2. the worker is joined, so an in-flight run finishes first
//! 3. the switch line, then the LED line, go back to the chip
//!
//! The LED line is also exposed as a tiny byte device: reading yields
//! `"1\n"` or `"0\n"`, writing `'1'` or `'0'` drives it.
//!
//! Edges are stamped by a [`TimeSource`]; milliseconds since the unit was
//! built unless another clock is passed to [`BlinkDevice::with_clock`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::{
    DEFAULT_LED_LINE, DEFAULT_SWITCH_LINE, LED_INITIAL_LEVEL, LED_LABEL, MAX_UNIT_RESOURCES, SWITCH_LABEL,
};
use crate::engine::{CoalescePolicy, DeferredTask, ToggleOutput, ToggleSequence};
use crate::errors::{DeviceError, InitError, InitStage, SignalError};
use crate::signal::{Direction, Edge, GpioChip, IrqHandle, LineHandle, LineId};
use crate::time::{MonotonicMillis, TimeSource, Timestamp};
use crate::trigger::{EdgeEvent, EdgeTrigger, Handler, IrqReturn};
use crate::unit::{Lifecycle, ResourceStack, UnitState};
use crate::worker::{StdDelay, ThreadWaker, Worker};

/// Name of the worker thread
const WORKER_NAME: &str = "chardev-blink";

/// Blink unit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkConfig {
    /// Output line that is toggled
    pub led_line: LineId,
    /// Input line whose edge triggers a run
    pub switch_line: LineId,
    /// Edge that triggers a run
    pub edge: Edge,
    /// Level the LED is driven to when claimed
    pub initial_level: bool,
    /// Flip count and pause of one run
    pub sequence: ToggleSequence,
    /// What an edge during a run does
    pub policy: CoalescePolicy,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            led_line: DEFAULT_LED_LINE,
            switch_line: DEFAULT_SWITCH_LINE,
            edge: Edge::Rising,
            initial_level: LED_INITIAL_LEVEL,
            sequence: ToggleSequence::default(),
            policy: CoalescePolicy::default(),
        }
    }
}

/// Claimed LED line shared by the worker and the byte device
struct LedOutput<C> {
    chip: Arc<C>,
    line: LineHandle,
    level: AtomicBool,
}

impl<C: GpioChip> ToggleOutput for LedOutput<C> {
    fn level(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }

    fn set_level(&self, high: bool) -> Result<(), SignalError> {
        self.line.write(&*self.chip, high)?;
        self.level.store(high, Ordering::Release);
        Ok(())
    }
}

enum BlinkResource<C> {
    Output(Arc<LedOutput<C>>),
    Input(LineHandle),
    Worker(Worker),
    Irq(IrqHandle),
}

/// LED toggled by edges on a switch line
pub struct BlinkDevice<C: GpioChip + Send + Sync + 'static, T: TimeSource = MonotonicMillis> {
    chip: Arc<C>,
    config: BlinkConfig,
    lifecycle: Lifecycle,
    task: Arc<DeferredTask>,
    trigger: Option<EdgeTrigger<Arc<DeferredTask>, ThreadWaker>>,
    resources: ResourceStack<BlinkResource<C>, MAX_UNIT_RESOURCES>,
    clock: T,
}

impl<C: GpioChip + Send + Sync + 'static> BlinkDevice<C> {
    /// Uninitialised unit on `chip`, stamping edges in milliseconds
    pub fn new(chip: Arc<C>, config: BlinkConfig) -> Self {
        Self::with_clock(chip, config, MonotonicMillis::new())
    }
}

impl<C: GpioChip + Send + Sync + 'static, T: TimeSource> BlinkDevice<C, T> {
    /// Uninitialised unit on `chip` with its own edge clock
    pub fn with_clock(chip: Arc<C>, config: BlinkConfig, clock: T) -> Self {
        Self {
            chip,
            task: Arc::new(DeferredTask::new(config.policy)),
            config,
            lifecycle: Lifecycle::new(),
            trigger: None,
            resources: ResourceStack::new(),
            clock,
        }
    }

    /// Acquire every resource or none
    pub fn init(&mut self) -> Result<(), InitError> {
        self.lifecycle.begin_init()?;
        self.task = Arc::new(DeferredTask::new(self.config.policy));

        match self.acquire() {
            Ok(()) => {
                self.lifecycle.ready();
                log_info!(
                    "blink: ready, line {} toggles line {} ({:?}, edges stamped in {})",
                    self.config.switch_line,
                    self.config.led_line,
                    self.task.policy(),
                    if self.clock.is_clock() { "ms" } else { "ticks" }
                );
                Ok(())
            }
            Err(e) => {
                log_error!("blink: init failed: {}", e);
                self.trigger = None;
                self.release_all();
                self.lifecycle.abort();
                Err(e)
            }
        }
    }

    fn acquire(&mut self) -> Result<(), InitError> {
        let cfg = self.config;

        let led = LineHandle::acquire(&*self.chip, cfg.led_line, Direction::Output, cfg.initial_level, LED_LABEL)
            .map_err(|cause| InitError::Signal { stage: InitStage::OutputLine, cause })?;
        let output = Arc::new(LedOutput {
            chip: Arc::clone(&self.chip),
            line: led,
            level: AtomicBool::new(cfg.initial_level),
        });
        self.hold(BlinkResource::Output(Arc::clone(&output)))?;

        let switch = LineHandle::acquire(&*self.chip, cfg.switch_line, Direction::Input, false, SWITCH_LABEL)
            .map_err(|cause| InitError::Signal { stage: InitStage::InputLine, cause })?;
        self.hold(BlinkResource::Input(switch))?;

        let worker = Worker::spawn(WORKER_NAME, Arc::clone(&self.task), cfg.sequence, output, StdDelay)?;
        self.trigger = Some(EdgeTrigger::new(Arc::clone(&self.task), worker.waker()));
        self.hold(BlinkResource::Worker(worker))?;

        let irq = {
            let switch = self
                .resources
                .find(|r| match r {
                    BlinkResource::Input(line) => Some(line),
                    _ => None,
                })
                .ok_or(InitError::ResourceStackFull)?;
            IrqHandle::register(&*self.chip, switch, cfg.edge)
                .map_err(|cause| InitError::Signal { stage: InitStage::EdgeIrq, cause })?
        };
        self.hold(BlinkResource::Irq(irq))
    }

    fn hold(&mut self, resource: BlinkResource<C>) -> Result<(), InitError> {
        self.resources.push(resource).map_err(|resource| {
            release(&*self.chip, resource);
            InitError::ResourceStackFull
        })
    }

    fn release_all(&mut self) {
        let chip = Arc::clone(&self.chip);
        self.resources.unwind(|resource| release(&*chip, resource));
    }

    /// Free the interrupt, join the worker, release both lines
    ///
    /// A no-op unless the unit is ready.
    pub fn teardown(&mut self) {
        if !self.lifecycle.begin_teardown() {
            return;
        }
        self.release_all();
        self.trigger = None;
        self.lifecycle.finish_teardown();
        log_info!("blink: torn down after {} runs", self.task.stats().runs.load(Ordering::Relaxed));
    }

    /// Interrupt entry for the switch line; never blocks
    ///
    /// Returns [`IrqReturn::None`] when the unit is not ready.
    pub fn on_edge(&self) -> IrqReturn {
        match (&self.trigger, self.lifecycle.is_ready()) {
            (Some(trigger), true) => trigger.handle(EdgeEvent {
                line: self.config.switch_line,
                timestamp: self.clock.now(),
            }),
            _ => IrqReturn::None,
        }
    }

    /// Lifecycle state
    pub fn state(&self) -> UnitState {
        self.lifecycle.state()
    }

    /// Configuration the unit was built with
    pub fn config(&self) -> &BlinkConfig {
        &self.config
    }

    /// Deferred task of the current (or last) initialisation
    pub fn task(&self) -> &DeferredTask {
        &self.task
    }

    /// Edges accepted by the handler since init
    pub fn edges(&self) -> u32 {
        self.trigger.as_ref().map(|t| t.edges()).unwrap_or(0)
    }

    /// Clock reading of the latest accepted edge
    pub fn last_edge(&self) -> Option<Timestamp> {
        self.trigger.as_ref().and_then(|t| t.last_edge())
    }

    fn output(&self) -> Option<&LedOutput<C>> {
        if !self.lifecycle.is_ready() {
            return None;
        }
        self.resources.find(|r| match r {
            BlinkResource::Output(out) => Some(&**out),
            _ => None,
        })
    }

    /// Level last driven onto the LED, while ready
    pub fn led_level(&self) -> Option<bool> {
        self.output().map(|out| out.level())
    }

    /// Render the LED state as `"1\n"` or `"0\n"`
    ///
    /// Copies as much of the two bytes as fits in `out`.
    pub fn read(&self, out: &mut [u8]) -> Result<usize, DeviceError> {
        let led = self.output().ok_or(DeviceError::NotReady)?;
        let text: &[u8; 2] = if led.level() { b"1\n" } else { b"0\n" };
        let n = out.len().min(text.len());
        out[..n].copy_from_slice(&text[..n]);
        Ok(n)
    }

    /// Drive the LED from the first byte: `'1'` high, `'0'` low
    ///
    /// Any other byte is logged and ignored. The whole buffer is always
    /// reported as consumed.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, DeviceError> {
        let led = self.output().ok_or(DeviceError::NotReady)?;
        match bytes.first() {
            Some(b'1') => led.set_level(true)?,
            Some(b'0') => led.set_level(false)?,
            Some(other) => log_warn!("blink: invalid argument {:#04x}", other),
            None => {}
        }
        Ok(bytes.len())
    }
}

impl<C: GpioChip + Send + Sync + 'static, T: TimeSource> Drop for BlinkDevice<C, T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn release<C: GpioChip>(chip: &C, resource: BlinkResource<C>) {
    match resource {
        BlinkResource::Irq(irq) => irq.release(chip),
        BlinkResource::Worker(worker) => {
            let runs = worker.stop();
            log_debug!("blink: worker stopped after {} runs", runs);
        }
        BlinkResource::Input(line) => line.release(chip),
        BlinkResource::Output(output) => match Arc::try_unwrap(output) {
            Ok(output) => output.line.release(chip),
            Err(_) => log_error!("blink: LED line still shared, not released"),
        },
    }
}
