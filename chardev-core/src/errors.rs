//! Error Types for Device Cores
//!
//! ## Design
//!
//! Errors are small `Copy` enums with no heap data, so they can be returned
//! from interrupt-adjacent code and stored in stats without allocation.
//! Each carries a stable negative errno-style code via `code()`; the control
//! client prints these and they let callers tell one failure from another
//! without matching on the enum.
//!
//! ## Categories
//!
//! ### Resource acquisition (fatal to initialisation)
//! - [`SignalError`]: line missing, already claimed, wrong direction
//! - [`ChannelError::AllocationFailed`]: backing storage could not be reserved
//!
//! ### Control channel (reported per request, state unchanged)
//! - [`ControlError`]: unknown opcode, bad argument, failed resize
//!
//! ### Device operations
//! - [`DeviceError`]: unit not ready, line refused the operation
//!
//! ### Initialisation
//! - [`InitError`]: earliest cause plus the stage that failed
//!
//! Partial writes and empty reads are not errors; see [`crate::channel`].

use thiserror_no_std::Error;

/// Errno values used for [`code`](ChannelError::code) mappings.
pub mod errno {
    /// Operation not permitted.
    pub const EPERM: i32 = 1;
    /// Out of memory.
    pub const ENOMEM: i32 = 12;
    /// Device or resource busy.
    pub const EBUSY: i32 = 16;
    /// No such device.
    pub const ENODEV: i32 = 19;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// Inappropriate ioctl for device.
    pub const ENOTTY: i32 = 25;
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Failures of the bounded byte channel
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// Requested capacity is zero or above the configured maximum
    #[error("Invalid capacity {requested} (max {max})")]
    InvalidCapacity {
        /// Capacity asked for
        requested: usize,
        /// Largest capacity accepted
        max: usize,
    },

    /// Backing storage could not be allocated
    #[error("Allocation of {bytes} bytes failed")]
    AllocationFailed {
        /// Bytes that were requested
        bytes: usize,
    },

    /// Shrinking would discard bytes still held in the channel
    #[error("Resize to {requested} would drop data: {length} bytes held")]
    WouldTruncate {
        /// Capacity asked for
        requested: usize,
        /// Bytes currently held
        length: usize,
    },
}

impl ChannelError {
    /// Negative errno-style code for this failure
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidCapacity { .. } => -errno::EINVAL,
            Self::AllocationFailed { .. } => -errno::ENOMEM,
            Self::WouldTruncate { .. } => -errno::EBUSY,
        }
    }
}

/// Failures of the control channel
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// Opcode does not name a known request
    #[error("Unknown control request 0x{0:08x}")]
    UnknownRequest(u32),

    /// Resize argument is negative or does not fit the platform word
    #[error("Invalid resize argument {0}")]
    InvalidArgument(i64),

    /// The underlying channel refused the request
    #[error("Channel error: {0}")]
    Channel(ChannelError),

    /// The owning unit is not initialised
    #[error("Device not ready")]
    NotReady,
}

impl ControlError {
    /// Negative errno-style code for this failure
    pub fn code(&self) -> i32 {
        match self {
            Self::UnknownRequest(_) => -errno::ENOTTY,
            Self::InvalidArgument(_) => -errno::EINVAL,
            Self::Channel(e) => e.code(),
            Self::NotReady => -errno::ENODEV,
        }
    }
}

impl From<ChannelError> for ControlError {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

/// Failures of the signal-line abstraction
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// No line with this id exists on the chip
    #[error("Line {0} does not exist")]
    NotAvailable(u32),

    /// Line is already claimed by another owner
    #[error("Line {0} is already claimed")]
    AlreadyClaimed(u32),

    /// Write attempted on a line claimed as input
    #[error("Line {0} is an input")]
    WrongDirection(u32),

    /// Line cannot raise edge interrupts
    #[error("Line {0} has no interrupt")]
    NoInterrupt(u32),

    /// Interrupt line is already registered
    #[error("Interrupt {0} is busy")]
    IrqBusy(u32),

    /// Handle does not belong to a live claim
    #[error("Line {0} is not claimed")]
    NotClaimed(u32),
}

impl SignalError {
    /// Negative errno-style code for this failure
    pub fn code(&self) -> i32 {
        match self {
            Self::NotAvailable(_) | Self::NoInterrupt(_) => -errno::ENODEV,
            Self::AlreadyClaimed(_) | Self::IrqBusy(_) => -errno::EBUSY,
            Self::WrongDirection(_) | Self::NotClaimed(_) => -errno::EPERM,
        }
    }
}

/// Failures of byte-stream operations on a device unit
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The unit is not initialised
    #[error("Device not ready")]
    NotReady,

    /// A line refused the operation
    #[error("Signal error: {0}")]
    Signal(SignalError),
}

impl DeviceError {
    /// Negative errno-style code for this failure
    pub fn code(&self) -> i32 {
        match self {
            Self::NotReady => -errno::ENODEV,
            Self::Signal(e) => e.code(),
        }
    }
}

impl From<SignalError> for DeviceError {
    fn from(e: SignalError) -> Self {
        Self::Signal(e)
    }
}

/// Stage of unit initialisation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitStage {
    /// Allocating the FIFO backing storage
    ChannelStorage,
    /// Claiming the output line
    OutputLine,
    /// Claiming the input line
    InputLine,
    /// Registering the edge interrupt
    EdgeIrq,
    /// Starting the deferred-task worker
    Worker,
}

/// Initialisation failure, carrying the earliest cause
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// A unit is already initialised
    #[error("Unit is not uninitialised")]
    AlreadyInitialised,

    /// Channel storage could not be created
    #[error("{stage:?} failed: {cause}")]
    Channel {
        /// Failing stage
        stage: InitStage,
        /// Underlying cause
        cause: ChannelError,
    },

    /// A line or interrupt could not be acquired
    #[error("{stage:?} failed: {cause}")]
    Signal {
        /// Failing stage
        stage: InitStage,
        /// Underlying cause
        cause: SignalError,
    },

    /// The worker thread could not be spawned
    #[error("Worker failed to start")]
    Worker,

    /// Too many resources for the rollback stack
    #[error("Resource stack exhausted")]
    ResourceStackFull,
}

impl InitError {
    /// Negative errno-style code for this failure
    pub fn code(&self) -> i32 {
        match self {
            Self::AlreadyInitialised => -errno::EBUSY,
            Self::Channel { cause, .. } => cause.code(),
            Self::Signal { cause, .. } => cause.code(),
            Self::Worker | Self::ResourceStackFull => -errno::ENOMEM,
        }
    }

    /// Stage that failed, if the failure happened inside a stage
    pub fn stage(&self) -> Option<InitStage> {
        match self {
            Self::Channel { stage, .. } | Self::Signal { stage, .. } => Some(*stage),
            Self::Worker => Some(InitStage::Worker),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ChannelError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::InvalidCapacity { requested, max } =>
                defmt::write!(fmt, "Invalid capacity {} (max {})", requested, max),
            Self::AllocationFailed { bytes } =>
                defmt::write!(fmt, "Allocation of {} bytes failed", bytes),
            Self::WouldTruncate { requested, length } =>
                defmt::write!(fmt, "Resize to {} would drop {} bytes", requested, length),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SignalError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::NotAvailable(id) => defmt::write!(fmt, "Line {} missing", id),
            Self::AlreadyClaimed(id) => defmt::write!(fmt, "Line {} claimed", id),
            Self::WrongDirection(id) => defmt::write!(fmt, "Line {} is input", id),
            Self::NoInterrupt(id) => defmt::write!(fmt, "Line {} has no irq", id),
            Self::IrqBusy(irq) => defmt::write!(fmt, "Irq {} busy", irq),
            Self::NotClaimed(id) => defmt::write!(fmt, "Line {} not claimed", id),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ControlError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::UnknownRequest(cmd) => defmt::write!(fmt, "Unknown request {=u32:#x}", cmd),
            Self::InvalidArgument(arg) => defmt::write!(fmt, "Invalid argument {}", arg),
            Self::Channel(e) => defmt::write!(fmt, "Channel: {}", e),
            Self::NotReady => defmt::write!(fmt, "Not ready"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DeviceError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::NotReady => defmt::write!(fmt, "Not ready"),
            Self::Signal(e) => defmt::write!(fmt, "Signal: {}", e),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for InitError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::AlreadyInitialised => defmt::write!(fmt, "Already initialised"),
            Self::Channel { stage, cause } => defmt::write!(fmt, "{} failed: {}", stage, cause),
            Self::Signal { stage, cause } => defmt::write!(fmt, "{} failed: {}", stage, cause),
            Self::Worker => defmt::write!(fmt, "Worker failed"),
            Self::ResourceStackFull => defmt::write!(fmt, "Resource stack full"),
        }
    }
}
