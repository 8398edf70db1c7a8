//! Out-of-band control requests for the byte channel
//!
//! Three requests are defined; each maps onto exactly one
//! [`ByteChannel`] operation:
//!
//! | Request     | Channel call | Response                    |
//! |-------------|--------------|-----------------------------|
//! | `Clear`     | `clear()`    | `Cleared`                   |
//! | `QueryInfo` | `info()`     | `Info { capacity, length, available }` |
//! | `Resize(n)` | `resize(n)`  | `Resized { capacity }`      |
//!
//! Requests also have numeric opcodes built the way `ioctl` numbers are
//! (direction, argument size, magic, number), so a raw `(cmd, arg)` pair
//! from a foreign caller can be decoded with [`ControlRequest::decode`].
//! Unknown opcodes are rejected, never ignored.

use crate::channel::{ByteChannel, ChannelInfo};
use crate::errors::ControlError;

/// Magic byte shared by every chardev opcode
pub const CONTROL_MAGIC: u8 = b'p';

const DIR_NONE: u32 = 0;
const DIR_WRITE: u32 = 1;
const DIR_READ: u32 = 2;

const fn ioc(dir: u32, magic: u8, nr: u8, size: u32) -> u32 {
    (dir << 30) | (size << 16) | ((magic as u32) << 8) | nr as u32
}

/// Size of the info triple on the wire: three 32-bit integers
const INFO_WIRE_SIZE: u32 = 12;

/// Size of the resize argument on the wire: one 64-bit integer
const RESIZE_WIRE_SIZE: u32 = 8;

/// A control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlRequest {
    /// Discard every held byte
    Clear,
    /// Report capacity, length and free space
    QueryInfo,
    /// Replace storage with the given capacity
    Resize(i64),
}

impl ControlRequest {
    /// Opcode of [`ControlRequest::Clear`]
    pub const CLEAR: u32 = ioc(DIR_NONE, CONTROL_MAGIC, 1, 0);
    /// Opcode of [`ControlRequest::QueryInfo`]
    pub const QUERY_INFO: u32 = ioc(DIR_READ, CONTROL_MAGIC, 2, INFO_WIRE_SIZE);
    /// Opcode of [`ControlRequest::Resize`]
    pub const RESIZE: u32 = ioc(DIR_WRITE, CONTROL_MAGIC, 3, RESIZE_WIRE_SIZE);

    /// Numeric opcode for this request
    pub fn opcode(&self) -> u32 {
        match self {
            Self::Clear => Self::CLEAR,
            Self::QueryInfo => Self::QUERY_INFO,
            Self::Resize(_) => Self::RESIZE,
        }
    }

    /// Decode a raw `(cmd, arg)` pair; `arg` is ignored except for resize
    pub fn decode(cmd: u32, arg: i64) -> Result<Self, ControlError> {
        match cmd {
            Self::CLEAR => Ok(Self::Clear),
            Self::QUERY_INFO => Ok(Self::QueryInfo),
            Self::RESIZE => Ok(Self::Resize(arg)),
            other => Err(ControlError::UnknownRequest(other)),
        }
    }
}

/// Successful outcome of a control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlResponse {
    /// Channel emptied
    Cleared,
    /// Fill level snapshot
    Info(ChannelInfo),
    /// Storage replaced; carries the resulting capacity
    Resized {
        /// Capacity after the resize
        capacity: usize,
    },
}

/// Anything that accepts control requests
///
/// Implemented by [`crate::fifo::FifoDevice`]; the control client is written
/// against this trait so it can drive any unit that owns a channel.
pub trait ControlTarget {
    /// Execute one request
    fn control(&self, request: ControlRequest) -> Result<ControlResponse, ControlError>;
}

/// Execute `request` against `channel`
pub fn apply(channel: &ByteChannel, request: ControlRequest) -> Result<ControlResponse, ControlError> {
    match request {
        ControlRequest::Clear => {
            channel.clear();
            Ok(ControlResponse::Cleared)
        }
        ControlRequest::QueryInfo => Ok(ControlResponse::Info(channel.info())),
        ControlRequest::Resize(size) => {
            let capacity = usize::try_from(size).map_err(|_| ControlError::InvalidArgument(size))?;
            let info = channel.resize(capacity).map_err(|e| {
                log_warn!("control: resize to {} refused: {}", size, e);
                ControlError::from(e)
            })?;
            Ok(ControlResponse::Resized { capacity: info.capacity })
        }
    }
}
