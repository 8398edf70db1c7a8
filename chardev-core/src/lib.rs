//! Device cores for chardev
//!
//! Two small hardware-facing cores that share one concurrency discipline:
//! an asynchronous domain (interrupt handlers, producers) that must never
//! block, and a cooperative domain (readers, worker threads) that may sleep.
//!
//! - **FIFO unit**: a bounded circular byte channel with partial-write and
//!   zero-length-read semantics, plus out-of-band control requests
//!   (clear, query, resize). Bring-up can hold the upstream producer off
//!   for a configured quiet period.
//! - **Blink unit**: a rising edge on an input line schedules a deferred task
//!   that toggles an output line a fixed number of times.
//!
//! Key constraints:
//! - Nothing reachable from an interrupt handler blocks or allocates
//! - Initialisation failures roll back every acquired resource in reverse order
//! - Deferred runs never overlap
//!
//! ```no_run
//! use chardev_core::{ByteChannel, ControlRequest, ControlResponse};
//!
//! let channel = ByteChannel::with_capacity(32).unwrap();
//! assert_eq!(channel.write(&[0xAA; 40]), 32);
//!
//! match chardev_core::control::apply(&channel, ControlRequest::QueryInfo) {
//!     Ok(ControlResponse::Info(info)) => assert_eq!(info.available, 0),
//!     _ => {}
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

#[macro_use]
mod logging;

pub mod channel;
pub mod constants;
pub mod control;
pub mod engine;
pub mod errors;
pub mod fifo;
pub mod signal;
pub mod time;
pub mod trigger;
pub mod unit;

#[cfg(feature = "sim")]
pub mod sim;

#[cfg(feature = "std")]
pub mod worker;

#[cfg(feature = "std")]
pub mod blinker;

// Public API
pub use channel::{ByteChannel, ChannelInfo};
pub use control::{ControlRequest, ControlResponse, ControlTarget};
pub use engine::{CoalescePolicy, DeferredTask, TaskState, ToggleSequence};
pub use errors::{ChannelError, ControlError, DeviceError, InitError, SignalError};
pub use fifo::{FifoConfig, FifoDevice, ProducerSource, QuiesceReport};
pub use signal::{Direction, Edge, GpioChip, LineHandle, LineId};
pub use trigger::{EdgeEvent, EdgeTrigger, IrqReturn};
pub use unit::UnitState;

#[cfg(feature = "std")]
pub use blinker::{BlinkConfig, BlinkDevice};

/// Crate version, as reported by the control client.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
