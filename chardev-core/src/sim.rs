//! In-memory GPIO chip and byte producer
//!
//! `SimGpio` behaves like a small GPIO controller: lines must exist to be
//! claimed, a line has one owner, outputs remember their level, and inputs
//! can raise an edge interrupt when driven from outside. It also keeps a
//! journal of claims and releases so that teardown order can be checked.
//!
//! `SimProducer` stands in for the controller that feeds the FIFO unit. It
//! can report busy for a number of polls and journals every command.
//!
//! Built with the `sim` feature; used by the test suites and the demos.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::{FnvIndexMap, Vec};

use crate::errors::SignalError;
use crate::fifo::ProducerSource;
use crate::signal::{Direction, Edge, GpioChip, LineId};

/// Most lines a simulated chip can carry
pub const SIM_MAX_LINES: usize = 32;

/// Journal entries kept; later entries are dropped
pub const SIM_JOURNAL_LEN: usize = 64;

/// Interrupt numbers are `SIM_IRQ_BASE + line id`
pub const SIM_IRQ_BASE: u32 = 64;

/// Resource event recorded by the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// Line claimed
    Requested(LineId),
    /// Line released
    Freed(LineId),
    /// Interrupt enabled
    IrqRequested(u32),
    /// Interrupt disabled
    IrqFreed(u32),
}

#[derive(Debug, Clone, Copy, Default)]
struct SimLine {
    irq_capable: bool,
    owner: Option<&'static str>,
    direction: Option<Direction>,
    level: bool,
    irq: Option<Edge>,
    writes: u32,
}

#[derive(Default)]
struct SimState {
    lines: FnvIndexMap<LineId, SimLine, SIM_MAX_LINES>,
    journal: Vec<SimEvent, SIM_JOURNAL_LEN>,
    fail_configure: Option<LineId>,
}

impl SimState {
    fn line(&mut self, id: LineId) -> Result<&mut SimLine, SignalError> {
        self.lines.get_mut(&id).ok_or(SignalError::NotAvailable(id))
    }

    fn claimed(&mut self, id: LineId) -> Result<&mut SimLine, SignalError> {
        let line = self.line(id)?;
        if line.owner.is_none() {
            return Err(SignalError::NotClaimed(id));
        }
        Ok(line)
    }

    fn record(&mut self, event: SimEvent) {
        // Journal is diagnostic only; overflow is silently dropped
        let _ = self.journal.push(event);
    }
}

/// Simulated GPIO controller
pub struct SimGpio {
    state: Mutex<RefCell<SimState>>,
}

impl Default for SimGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGpio {
    /// Chip with no lines
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(SimState::default())),
        }
    }

    /// Chip carrying the default LED and switch lines
    pub fn board() -> Self {
        use crate::constants::{DEFAULT_LED_LINE, DEFAULT_SWITCH_LINE};

        let chip = Self::new();
        chip.add_line(DEFAULT_LED_LINE, false);
        chip.add_line(DEFAULT_SWITCH_LINE, true);
        chip
    }

    /// Add a line; returns false if the chip is full
    pub fn add_line(&self, id: LineId, irq_capable: bool) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let line = SimLine { irq_capable, ..SimLine::default() };
            state.lines.insert(id, line).is_ok()
        })
    }

    /// Make the next `configure` of `id` fail
    pub fn fail_configure(&self, id: LineId) {
        critical_section::with(|cs| self.state.borrow(cs).borrow_mut().fail_configure = Some(id));
    }

    /// Drive an input line from outside
    ///
    /// Returns true when the transition matches the registered interrupt
    /// edge, i.e. when the platform would now invoke the line's handler.
    pub fn drive(&self, id: LineId, high: bool) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let Ok(line) = state.line(id) else {
                return false;
            };

            let was = line.level;
            line.level = high;
            match (line.irq, was, high) {
                (Some(Edge::Rising), false, true) => true,
                (Some(Edge::Falling), true, false) => true,
                (Some(Edge::Both), a, b) => a != b,
                _ => false,
            }
        })
    }

    /// Current level of a line (false for unknown lines)
    pub fn level(&self, id: LineId) -> bool {
        critical_section::with(|cs| {
            self.state.borrow(cs).borrow().lines.get(&id).map(|l| l.level).unwrap_or(false)
        })
    }

    /// Number of `set_level` calls that reached the line
    pub fn writes(&self, id: LineId) -> u32 {
        critical_section::with(|cs| {
            self.state.borrow(cs).borrow().lines.get(&id).map(|l| l.writes).unwrap_or(0)
        })
    }

    /// True if the line currently has an owner
    pub fn is_claimed(&self, id: LineId) -> bool {
        critical_section::with(|cs| {
            self.state.borrow(cs).borrow().lines.get(&id).map(|l| l.owner.is_some()).unwrap_or(false)
        })
    }

    /// Copy of the resource journal, oldest first
    pub fn journal(&self) -> Vec<SimEvent, SIM_JOURNAL_LEN> {
        critical_section::with(|cs| self.state.borrow(cs).borrow().journal.clone())
    }
}

impl GpioChip for SimGpio {
    fn is_valid(&self, id: LineId) -> bool {
        critical_section::with(|cs| self.state.borrow(cs).borrow().lines.contains_key(&id))
    }

    fn request(&self, id: LineId, label: &'static str) -> Result<(), SignalError> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let line = state.line(id)?;
            if line.owner.is_some() {
                return Err(SignalError::AlreadyClaimed(id));
            }
            line.owner = Some(label);
            state.record(SimEvent::Requested(id));
            Ok(())
        })
    }

    fn configure(&self, id: LineId, direction: Direction, initial: bool) -> Result<(), SignalError> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            if state.fail_configure == Some(id) {
                state.fail_configure = None;
                return Err(SignalError::NotAvailable(id));
            }

            let line = state.claimed(id)?;
            line.direction = Some(direction);
            if direction == Direction::Output {
                line.level = initial;
            }
            Ok(())
        })
    }

    fn get_level(&self, id: LineId) -> Result<bool, SignalError> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let level = state.claimed(id)?.level;
            Ok(level)
        })
    }

    fn set_level(&self, id: LineId, high: bool) -> Result<(), SignalError> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let line = state.claimed(id)?;
            if line.direction != Some(Direction::Output) {
                return Err(SignalError::WrongDirection(id));
            }
            line.level = high;
            line.writes += 1;
            Ok(())
        })
    }

    fn free(&self, id: LineId) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let freed = match state.line(id) {
                Ok(line) => {
                    // Level and write count outlive the claim
                    line.owner = None;
                    line.direction = None;
                    line.irq = None;
                    true
                }
                Err(_) => false,
            };
            if freed {
                state.record(SimEvent::Freed(id));
            }
        })
    }

    fn request_irq(&self, id: LineId, edge: Edge) -> Result<u32, SignalError> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let line = state.claimed(id)?;
            if !line.irq_capable {
                return Err(SignalError::NoInterrupt(id));
            }
            let irq = SIM_IRQ_BASE + id;
            if line.irq.is_some() {
                return Err(SignalError::IrqBusy(irq));
            }
            line.irq = Some(edge);
            state.record(SimEvent::IrqRequested(irq));
            Ok(irq)
        })
    }

    fn free_irq(&self, irq: u32) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let id = irq.wrapping_sub(SIM_IRQ_BASE);
            let freed = match state.line(id) {
                Ok(line) => line.irq.take().is_some(),
                Err(_) => false,
            };
            if freed {
                state.record(SimEvent::IrqFreed(irq));
            }
        })
    }
}

/// Command or poll seen by a [`SimProducer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerEvent {
    /// `is_busy` answered true
    BusyPoll,
    /// Producer disabled
    Disabled,
    /// Producer enabled
    Enabled,
}

#[derive(Default)]
struct ProducerState {
    busy_polls: u32,
    disabled: bool,
    journal: Vec<ProducerEvent, SIM_JOURNAL_LEN>,
}

/// Simulated byte producer
pub struct SimProducer {
    state: Mutex<RefCell<ProducerState>>,
}

impl Default for SimProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimProducer {
    /// Enabled producer that is never busy
    pub fn new() -> Self {
        Self::busy_for(0)
    }

    /// Producer whose next `polls` busy checks answer true
    pub fn busy_for(polls: u32) -> Self {
        Self {
            state: Mutex::new(RefCell::new(ProducerState { busy_polls: polls, ..ProducerState::default() })),
        }
    }

    /// True unless the producer was disabled and not enabled since
    pub fn is_enabled(&self) -> bool {
        critical_section::with(|cs| !self.state.borrow(cs).borrow().disabled)
    }

    /// Copy of the event journal, oldest first
    pub fn journal(&self) -> Vec<ProducerEvent, SIM_JOURNAL_LEN> {
        critical_section::with(|cs| self.state.borrow(cs).borrow().journal.clone())
    }

    fn command(&self, event: ProducerEvent) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            state.disabled = event == ProducerEvent::Disabled;
            let _ = state.journal.push(event);
        })
    }
}

impl ProducerSource for SimProducer {
    fn is_busy(&self) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            if state.busy_polls == 0 {
                return false;
            }
            state.busy_polls -= 1;
            let _ = state.journal.push(ProducerEvent::BusyPoll);
            true
        })
    }

    fn disable(&self) {
        self.command(ProducerEvent::Disabled);
    }

    fn enable(&self) {
        self.command(ProducerEvent::Enabled);
    }
}
