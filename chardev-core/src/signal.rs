//! Signal-Line Abstraction
//!
//! ## Overview
//!
//! A signal line is one digital pin, named by a stable [`LineId`]. Access
//! goes through two layers:
//!
//! - [`GpioChip`]: what a platform provides. Raw, id-based, no ownership.
//!   Methods take `&self` because the registers behind them are shared
//!   between task and interrupt context.
//! - [`LineHandle`]: an exclusive claim on one line with a fixed direction.
//!   It is not `Clone`, and releasing it consumes it, so a line cannot be
//!   written after it was handed back to the chip.
//!
//! ```text
//! acquire(id, dir)          write(level)            release()
//!   is_valid? ──no──▶ NotAvailable
//!   request?  ──no──▶ AlreadyClaimed
//!   configure ──err─▶ free, propagate
//!        │
//!        ▼
//!   LineHandle ───────▶ Output: chip.set_level
//!                       Input:  WrongDirection (chip untouched)
//! ```
//!
//! Edge interrupts are registered on claimed input lines and are held by an
//! [`IrqHandle`], which follows the same consume-on-release rule.

use crate::errors::SignalError;

/// Hardware identifier of a line
pub type LineId = u32;

/// Direction a line is claimed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Line is sampled
    Input,
    /// Line is driven
    Output,
}

/// Edge that raises the line interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    /// Low to high
    #[default]
    Rising,
    /// High to low
    Falling,
    /// Either transition
    Both,
}

/// Platform GPIO controller
///
/// Implementations must be safe to call from interrupt context for
/// `get_level`, and must never sleep in any method.
pub trait GpioChip {
    /// True if `id` names a line on this chip
    fn is_valid(&self, id: LineId) -> bool;

    /// Claim `id` for exclusive use
    ///
    /// Fails with `AlreadyClaimed` if another owner holds it.
    fn request(&self, id: LineId, label: &'static str) -> Result<(), SignalError>;

    /// Set the direction of a claimed line; `initial` is the output level
    fn configure(&self, id: LineId, direction: Direction, initial: bool) -> Result<(), SignalError>;

    /// Sample the line
    fn get_level(&self, id: LineId) -> Result<bool, SignalError>;

    /// Drive the line
    fn set_level(&self, id: LineId, high: bool) -> Result<(), SignalError>;

    /// Return a claimed line to the chip
    fn free(&self, id: LineId);

    /// Enable the edge interrupt of `id`; returns the interrupt number
    fn request_irq(&self, id: LineId, edge: Edge) -> Result<u32, SignalError>;

    /// Disable an interrupt returned by `request_irq`
    fn free_irq(&self, irq: u32);
}

/// Exclusive claim on one line
#[derive(Debug, PartialEq, Eq)]
pub struct LineHandle {
    id: LineId,
    direction: Direction,
}

impl LineHandle {
    /// Claim `id` with a fixed direction
    ///
    /// For outputs the line is driven to `initial` as part of the claim. If
    /// configuring the direction fails the claim is released before the
    /// error is returned.
    pub fn acquire<C: GpioChip + ?Sized>(
        chip: &C,
        id: LineId,
        direction: Direction,
        initial: bool,
        label: &'static str,
    ) -> Result<Self, SignalError> {
        if !chip.is_valid(id) {
            log_error!("signal: line {} does not exist", id);
            return Err(SignalError::NotAvailable(id));
        }

        chip.request(id, label).map_err(|e| {
            log_error!("signal: line {} is busy", id);
            e
        })?;

        if let Err(e) = chip.configure(id, direction, initial) {
            log_error!("signal: line {} direction not set: {}", id, e);
            chip.free(id);
            return Err(e);
        }

        log_info!("signal: line {} claimed as {:?} ({})", id, direction, label);
        Ok(Self { id, direction })
    }

    /// Line id
    pub fn id(&self) -> LineId {
        self.id
    }

    /// Direction fixed at acquisition
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sample the line; valid for either direction
    pub fn read<C: GpioChip + ?Sized>(&self, chip: &C) -> Result<bool, SignalError> {
        chip.get_level(self.id)
    }

    /// Drive the line
    ///
    /// Input lines reject the write with `WrongDirection` and the chip is
    /// not touched.
    pub fn write<C: GpioChip + ?Sized>(&self, chip: &C, high: bool) -> Result<(), SignalError> {
        if self.direction == Direction::Input {
            log_warn!("signal: write to input line {} ignored", self.id);
            return Err(SignalError::WrongDirection(self.id));
        }
        chip.set_level(self.id, high)
    }

    /// Hand the line back to the chip
    pub fn release<C: GpioChip + ?Sized>(self, chip: &C) {
        chip.free(self.id);
        log_info!("signal: line {} released", self.id);
    }
}

/// Registered edge interrupt of an input line
#[derive(Debug, PartialEq, Eq)]
pub struct IrqHandle {
    irq: u32,
    line: LineId,
    edge: Edge,
}

impl IrqHandle {
    /// Enable the edge interrupt of a claimed input line
    pub fn register<C: GpioChip + ?Sized>(
        chip: &C,
        line: &LineHandle,
        edge: Edge,
    ) -> Result<Self, SignalError> {
        if line.direction() != Direction::Input {
            return Err(SignalError::WrongDirection(line.id()));
        }

        let irq = chip.request_irq(line.id(), edge).map_err(|e| {
            log_error!("signal: irq registration on line {} failed: {}", line.id(), e);
            e
        })?;

        log_info!("signal: line {} registered {:?} edge on irq {}", line.id(), edge, irq);
        Ok(Self { irq, line: line.id(), edge })
    }

    /// Interrupt number
    pub fn irq(&self) -> u32 {
        self.irq
    }

    /// Disable the interrupt
    pub fn release<C: GpioChip + ?Sized>(self, chip: &C) {
        chip.free_irq(self.irq);
        log_info!("signal: irq {} ({:?} edge of line {}) released", self.irq, self.edge, self.line);
    }
}
