//! FIFO device unit
//!
//! ## Overview
//!
//! Wraps one [`ByteChannel`] in the unit lifecycle. The channel storage is
//! the unit's only resource: it is allocated by [`FifoDevice::init`] and
//! dropped by [`FifoDevice::teardown`]. Until init succeeds, and again after
//! teardown, every operation fails with `NotReady` instead of touching
//! memory that does not exist.
//!
//! Byte-stream semantics are the channel's: writes copy what fits and
//! report the count, reads take what is held and report the count, and a
//! count of zero is a normal result.
//!
//! ```text
//!   producer ──write()──▶ ┌──────────────┐ ──read()──▶ consumer
//!                         │ ByteChannel  │
//!   client ──control()──▶ └──────────────┘
//! ```
//!
//! ## Quiescing the producer
//!
//! When the unit is fed by a hardware source, [`FifoDevice::init_quiesced`]
//! holds that source off while the unit comes up:
//!
//! 1. poll until the source is idle, at most [`QUIESCE_RETRIES`] times
//! 2. disable it
//! 3. wait [`FifoConfig::quiesce`]
//! 4. poll again with the same bound, then enable it
//!
//! A source that is still busy after the last poll gets the command anyway;
//! the report counts how often that happened.

use core::convert::Infallible;

use fugit::MillisDurationU32;

use crate::channel::{ByteChannel, ChannelInfo};
use crate::constants::{DEFAULT_FIFO_CAPACITY, DEFAULT_QUIESCE, QUIESCE_POLL, QUIESCE_RETRIES};
use crate::control::{self, ControlRequest, ControlResponse, ControlTarget};
use crate::engine::DelayMs;
use crate::errors::{ControlError, DeviceError, InitError, InitStage};
use crate::unit::{Lifecycle, ResourceStack, UnitState};

/// FIFO unit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FifoConfig {
    /// Initial channel capacity in bytes
    pub capacity: usize,
    /// How long the producer is held disabled by `init_quiesced`
    pub quiesce: MillisDurationU32,
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_FIFO_CAPACITY,
            quiesce: DEFAULT_QUIESCE,
        }
    }
}

/// Upstream source of FIFO bytes, such as an input controller
pub trait ProducerSource {
    /// True while the source cannot take a command yet
    fn is_busy(&self) -> bool;

    /// Stop the source from producing
    fn disable(&self);

    /// Let the source produce again
    fn enable(&self);
}

/// Outcome of one quiesce pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuiesceReport {
    /// Polls that found the source busy
    pub busy_polls: u32,
    /// Commands sent while the source was still busy
    pub forced: u32,
}

/// Disable `producer`, wait `hold`, enable it again
pub fn quiesce<P, D>(producer: &P, delay: &mut D, hold: MillisDurationU32) -> QuiesceReport
where
    P: ProducerSource + ?Sized,
    D: DelayMs,
{
    let mut report = QuiesceReport::default();

    settle(producer, delay, &mut report);
    producer.disable();
    log_info!("fifo: producer disabled for {} ms", hold.ticks());

    delay.delay_ms(hold.ticks());

    settle(producer, delay, &mut report);
    producer.enable();
    log_info!("fifo: producer enabled");
    report
}

fn settle<P, D>(producer: &P, delay: &mut D, report: &mut QuiesceReport)
where
    P: ProducerSource + ?Sized,
    D: DelayMs,
{
    let mut polls = 0;
    while producer.is_busy() {
        if polls == QUIESCE_RETRIES {
            log_warn!("fifo: producer still busy after {} polls", polls);
            report.forced += 1;
            return;
        }
        delay.delay_ms(QUIESCE_POLL.ticks());
        polls += 1;
        report.busy_polls += 1;
    }
}

#[derive(Debug)]
enum FifoResource {
    Storage(ByteChannel),
}

/// Bounded byte FIFO with control requests
#[derive(Debug)]
pub struct FifoDevice {
    config: FifoConfig,
    lifecycle: Lifecycle,
    resources: ResourceStack<FifoResource, 1>,
}

impl FifoDevice {
    /// Uninitialised unit
    pub const fn new(config: FifoConfig) -> Self {
        Self {
            config,
            lifecycle: Lifecycle::new(),
            resources: ResourceStack::new(),
        }
    }

    /// Allocate the channel and become ready
    pub fn init(&mut self) -> Result<(), InitError> {
        self.lifecycle.begin_init()?;

        let channel = match ByteChannel::with_capacity(self.config.capacity) {
            Ok(channel) => channel,
            Err(cause) => {
                log_error!("fifo: storage of {} bytes not allocated: {}", self.config.capacity, cause);
                self.lifecycle.abort();
                return Err(InitError::Channel { stage: InitStage::ChannelStorage, cause });
            }
        };

        if self.resources.push(FifoResource::Storage(channel)).is_err() {
            self.lifecycle.abort();
            return Err(InitError::ResourceStackFull);
        }

        self.lifecycle.ready();
        log_info!("fifo: ready, capacity {}", self.config.capacity);
        Ok(())
    }

    /// [`init`](Self::init), then quiesce `producer` for `config.quiesce`
    ///
    /// Nothing is disabled when allocation fails.
    pub fn init_quiesced<P, D>(&mut self, producer: &P, delay: &mut D) -> Result<QuiesceReport, InitError>
    where
        P: ProducerSource + ?Sized,
        D: DelayMs,
    {
        self.init()?;
        Ok(quiesce(producer, delay, self.config.quiesce))
    }

    /// Drop the channel and any bytes it held
    ///
    /// A no-op unless the unit is ready.
    pub fn teardown(&mut self) {
        if !self.lifecycle.begin_teardown() {
            return;
        }
        self.resources.unwind(|resource| match resource {
            FifoResource::Storage(channel) => {
                log_debug!("fifo: dropping {} held bytes", channel.len());
                drop(channel);
            }
        });
        self.lifecycle.finish_teardown();
        log_info!("fifo: torn down");
    }

    /// Lifecycle state
    pub fn state(&self) -> UnitState {
        self.lifecycle.state()
    }

    /// Configuration the unit was built with
    pub fn config(&self) -> &FifoConfig {
        &self.config
    }

    /// The channel, while ready
    pub fn channel(&self) -> Option<&ByteChannel> {
        if !self.lifecycle.is_ready() {
            return None;
        }
        self.resources.find(|resource| match resource {
            FifoResource::Storage(channel) => Some(channel),
        })
    }

    fn ready_channel(&self) -> Result<&ByteChannel, DeviceError> {
        self.channel().ok_or(DeviceError::NotReady)
    }

    /// Copy as many bytes as fit; returns the count accepted
    pub fn write(&self, bytes: &[u8]) -> Result<usize, DeviceError> {
        let copied = self.ready_channel()?.write(bytes);
        log_debug!("fifo: write {} of {} bytes", copied, bytes.len());
        Ok(copied)
    }

    /// Move up to `out.len()` bytes out; returns the count, zero when empty
    pub fn read(&self, out: &mut [u8]) -> Result<usize, DeviceError> {
        let copied = self.ready_channel()?.read(out);
        log_debug!("fifo: read {} bytes", copied);
        Ok(copied)
    }

    /// Non-blocking read; `WouldBlock` while empty
    pub fn poll_read(&self, out: &mut [u8]) -> nb::Result<usize, DeviceError> {
        let channel = self.ready_channel().map_err(nb::Error::Other)?;
        channel.poll_read(out).map_err(widen)
    }

    /// Non-blocking write; `WouldBlock` while full
    pub fn poll_write(&self, bytes: &[u8]) -> nb::Result<usize, DeviceError> {
        let channel = self.ready_channel().map_err(nb::Error::Other)?;
        channel.poll_write(bytes).map_err(widen)
    }

    /// Fill level snapshot
    pub fn info(&self) -> Result<ChannelInfo, DeviceError> {
        Ok(self.ready_channel()?.info())
    }

    /// Decode and execute a raw `(cmd, arg)` request
    pub fn ioctl(&self, cmd: u32, arg: i64) -> Result<ControlResponse, ControlError> {
        let request = ControlRequest::decode(cmd, arg).map_err(|e| {
            log_warn!("fifo: unknown request {:#x}", cmd);
            e
        })?;
        self.control(request)
    }
}

impl Default for FifoDevice {
    fn default() -> Self {
        Self::new(FifoConfig::default())
    }
}

impl ControlTarget for FifoDevice {
    fn control(&self, request: ControlRequest) -> Result<ControlResponse, ControlError> {
        let channel = self.channel().ok_or(ControlError::NotReady)?;
        let response = control::apply(channel, request)?;
        log_info!("fifo: {:?} -> {:?}", request, response);
        Ok(response)
    }
}

fn widen(e: nb::Error<Infallible>) -> nb::Error<DeviceError> {
    match e {
        nb::Error::WouldBlock => nb::Error::WouldBlock,
        nb::Error::Other(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_FIFO_CAPACITY;
    use crate::errors::ChannelError;

    #[cfg(feature = "sim")]
    #[derive(Default)]
    struct Pauses(alloc::vec::Vec<u32>);

    #[cfg(feature = "sim")]
    impl DelayMs for Pauses {
        fn delay_ms(&mut self, ms: u32) {
            self.0.push(ms);
        }
    }

    fn ready() -> FifoDevice {
        let mut fifo = FifoDevice::default();
        fifo.init().unwrap();
        fifo
    }

    #[test]
    fn operations_before_init_are_refused() {
        let fifo = FifoDevice::default();
        assert_eq!(fifo.state(), UnitState::Uninitialized);
        assert_eq!(fifo.write(b"x"), Err(DeviceError::NotReady));
        assert_eq!(fifo.read(&mut [0; 4]), Err(DeviceError::NotReady));
        assert_eq!(fifo.control(ControlRequest::Clear), Err(ControlError::NotReady));
        assert_eq!(fifo.poll_read(&mut [0; 4]), Err(nb::Error::Other(DeviceError::NotReady)));
    }

    #[test]
    fn default_capacity_is_32() {
        let fifo = ready();
        assert_eq!(fifo.state(), UnitState::Ready);
        assert_eq!(fifo.write(&[1; 40]), Ok(32));
        assert_eq!(fifo.info().unwrap().available, 0);
    }

    #[test]
    fn init_twice_keeps_first_channel() {
        let mut fifo = ready();
        fifo.write(b"keep").unwrap();
        assert_eq!(fifo.init(), Err(InitError::AlreadyInitialised));
        assert_eq!(fifo.info().unwrap().length, 4);
    }

    #[test]
    fn failed_allocation_leaves_unit_uninitialised() {
        let mut fifo = FifoDevice::new(FifoConfig { capacity: MAX_FIFO_CAPACITY + 1, ..FifoConfig::default() });
        let err = fifo.init().unwrap_err();
        assert_eq!(err.stage(), Some(InitStage::ChannelStorage));
        assert!(matches!(err, InitError::Channel { cause: ChannelError::InvalidCapacity { .. }, .. }));
        assert_eq!(fifo.state(), UnitState::Uninitialized);
    }

    #[test]
    fn teardown_discards_bytes() {
        let mut fifo = ready();
        fifo.write(b"gone").unwrap();
        fifo.teardown();
        assert_eq!(fifo.state(), UnitState::Uninitialized);
        assert!(fifo.channel().is_none());

        fifo.init().unwrap();
        assert_eq!(fifo.read(&mut [0; 8]), Ok(0));
    }

    #[test]
    fn ioctl_decodes_raw_opcodes() {
        let fifo = ready();
        fifo.write(b"abc").unwrap();

        let info = fifo.ioctl(ControlRequest::QUERY_INFO, 0).unwrap();
        assert_eq!(
            info,
            ControlResponse::Info(ChannelInfo { capacity: 32, length: 3, available: 29 })
        );
        assert_eq!(fifo.ioctl(ControlRequest::CLEAR, 0), Ok(ControlResponse::Cleared));
        assert_eq!(
            fifo.ioctl(ControlRequest::RESIZE, 1024),
            Ok(ControlResponse::Resized { capacity: 1024 })
        );
        assert_eq!(fifo.ioctl(0xdead, 0), Err(ControlError::UnknownRequest(0xdead)));
        assert_eq!(ControlError::UnknownRequest(0xdead).code(), -25);
    }

    #[test]
    fn poll_reports_would_block() {
        let fifo = ready();
        assert_eq!(fifo.poll_read(&mut [0; 4]), Err(nb::Error::WouldBlock));
        fifo.write(&[0; 32]).unwrap();
        assert_eq!(fifo.poll_write(b"x"), Err(nb::Error::WouldBlock));
        assert_eq!(fifo.poll_read(&mut [0; 4]), Ok(4));
    }

    #[test]
    fn debug_shows_channel_snapshot() {
        let fifo = ready();
        fifo.write(b"ab").unwrap();
        let shown = alloc::format!("{:?}", fifo);
        assert!(shown.contains("Ready"));
        assert!(shown.contains("length: 2"));
    }

    #[cfg(feature = "sim")]
    #[test]
    fn quiesce_polls_then_disables_waits_and_enables() {
        use crate::sim::{ProducerEvent, SimProducer};

        let producer = SimProducer::busy_for(3);
        let mut pauses = Pauses::default();
        let report = quiesce(&producer, &mut pauses, MillisDurationU32::millis(250));

        assert_eq!(report, QuiesceReport { busy_polls: 3, forced: 0 });
        assert_eq!(pauses.0, [1, 1, 1, 250]);
        assert!(producer.is_enabled());
        assert_eq!(
            producer.journal().as_slice(),
            &[
                ProducerEvent::BusyPoll,
                ProducerEvent::BusyPoll,
                ProducerEvent::BusyPoll,
                ProducerEvent::Disabled,
                ProducerEvent::Enabled,
            ]
        );
    }

    #[cfg(feature = "sim")]
    #[test]
    fn stuck_producer_is_commanded_after_retry_bound() {
        use crate::sim::SimProducer;

        let producer = SimProducer::busy_for(u32::MAX);
        let mut pauses = Pauses::default();
        let report = quiesce(&producer, &mut pauses, MillisDurationU32::millis(5));

        // Each settle gives up after the bound, before disable and before enable
        assert_eq!(report.busy_polls, 2 * QUIESCE_RETRIES);
        assert_eq!(report.forced, 2);
        assert_eq!(pauses.0.len() as u32, 2 * QUIESCE_RETRIES + 1);
        assert_eq!(pauses.0[QUIESCE_RETRIES as usize], 5);
        assert!(producer.is_enabled());
    }

    #[cfg(feature = "sim")]
    #[test]
    fn failed_allocation_leaves_producer_alone() {
        use crate::sim::SimProducer;

        let producer = SimProducer::new();
        let mut pauses = Pauses::default();
        let mut fifo = FifoDevice::new(FifoConfig { capacity: 0, ..FifoConfig::default() });

        assert!(fifo.init_quiesced(&producer, &mut pauses).is_err());
        assert!(producer.journal().is_empty());
        assert!(pauses.0.is_empty());
    }
}
