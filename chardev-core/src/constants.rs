//! Constants for chardev
//!
//! Defaults for both device units. Values match the board the drivers were
//! first brought up on (BeagleBone Black header pins, 32-byte FIFO).

use fugit::MillisDurationU32;

// ===== FIFO UNIT =====

/// Capacity of the FIFO channel created at unit initialisation.
pub const DEFAULT_FIFO_CAPACITY: usize = 32;

/// Upper bound accepted by a resize request.
///
/// Larger requests are refused before any allocation is attempted, so a bad
/// control argument cannot exhaust memory on a small target.
pub const MAX_FIFO_CAPACITY: usize = 1 << 20;

/// Size requested by the control client when none is given.
pub const DEFAULT_RESIZE_REQUEST: i64 = 1024;

/// How long the producer stays disabled while the FIFO unit comes up.
pub const DEFAULT_QUIESCE: MillisDurationU32 = MillisDurationU32::millis(10_000);

/// Busy polls allowed before a command is sent to the producer anyway.
pub const QUIESCE_RETRIES: u32 = 10;

/// Pause between two busy polls.
pub const QUIESCE_POLL: MillisDurationU32 = MillisDurationU32::millis(1);

// ===== BLINK UNIT =====

/// Output line driving the LED (GPIO1_17, header P9_23).
pub const DEFAULT_LED_LINE: u32 = 49;

/// Input line wired to the push switch (GPIO3_19, header P9_27).
pub const DEFAULT_SWITCH_LINE: u32 = 115;

/// Number of level flips performed by one deferred run.
pub const TOGGLE_ITERATIONS: u32 = 100;

/// Pause between two flips of a deferred run.
pub const TOGGLE_INTERVAL: MillisDurationU32 = MillisDurationU32::millis(100);

/// Level the LED line is driven to when it is claimed.
pub const LED_INITIAL_LEVEL: bool = true;

// ===== LIFECYCLE =====

/// Most resources a single device unit ever holds at once.
pub const MAX_UNIT_RESOURCES: usize = 8;

/// Labels passed to the GPIO chip when lines are claimed.
pub const LED_LABEL: &str = "chardev_led";

/// See [`LED_LABEL`].
pub const SWITCH_LABEL: &str = "chardev_switch";
