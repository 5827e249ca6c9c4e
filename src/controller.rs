// slcan-gateway/src/controller.rs
//
// The CAN controller adapter: software transmit queue and acceptance filter.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The bus-facing side of the gateway.
//!
//! A raw CAN device is anything implementing [`CanDevice`]: the
//! `embedded_can` non-blocking [`Can`](embedded_can::nb::Can) trait, plus
//! the ability to be started at a bitrate preset and stopped again.
//!
//! [`ControllerAdapter`] wraps such a device with the two things most
//! hardware FIFOs don't give us reliably:
//!
//! - A software transmit queue that absorbs bursts while the hardware is
//!   busy. Frames are always sent in the order they were written.
//! - A software mask/code acceptance filter applied to received frames.
//!
//! The protocol engine only talks to the adapter through the
//! [`Controller`] trait, so it can be driven by any other implementation.

use crate::{
    bus::{Bitrate, Mode, StatusFlags},
    frame::CanFrame,
    id::AcceptanceFilter,
    ring::Ring,
    Error, Result,
};
use log::{debug, trace, warn};
use std::time::Instant;

/// A raw, non-blocking CAN device.
///
/// `transmit()` reports a busy hardware FIFO as `nb::Error::WouldBlock`,
/// and `receive()` reports an empty receive path the same way.
pub trait CanDevice: embedded_can::nb::Can<Frame = CanFrame> {
    /// Determines if the device can run at the bitrate preset.
    fn supports_bitrate(&self, bitrate: Bitrate) -> bool;

    /// Brings the device onto the bus.
    fn start(&mut self, bitrate: Bitrate, mode: Mode) -> Result<()>;

    /// Takes the device off the bus.
    fn stop(&mut self);
}

/// The controller capability used by the protocol engine.
pub trait Controller {
    /// Determines if the controller can run at the bitrate preset.
    fn supports_bitrate(&self, bitrate: Bitrate) -> bool;

    /// Opens the channel.
    ///
    /// Any frames left in the transmit queue from an earlier session are
    /// discarded first.
    fn open(&mut self, bitrate: Bitrate, mode: Mode) -> Result<()>;

    /// Closes the channel, discarding any queued frames. Closing a closed
    /// channel does nothing.
    fn close(&mut self);

    /// Whether the channel is open
    fn is_open(&self) -> bool;

    /// The mode of the current (or last) session
    fn mode(&self) -> Mode;

    /// Sends a frame now, or queues it for [`service`](Self::service).
    fn write(&mut self, frame: &CanFrame) -> Result<()>;

    /// Determines if a received frame is waiting.
    fn available(&mut self) -> bool;

    /// Takes one received frame.
    ///
    /// A frame rejected by the acceptance filter is consumed and `None` is
    /// returned, even if more frames are waiting. Callers that want to drain
    /// the receive path must loop on [`available`](Self::available).
    fn read(&mut self) -> Option<CanFrame>;

    /// The software-observable status flags.
    fn status(&self) -> StatusFlags;

    /// Installs and enables the acceptance filter.
    fn set_filter(&mut self, mask: u32, code: u32);

    /// Removes the acceptance filter.
    fn clear_filter(&mut self);

    /// Moves queued frames into the hardware, once per loop iteration.
    fn service(&mut self);
}

/// Adapter diagnostic counters
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct AdapterCounters {
    /// Frames rejected because the transmit queue was full
    pub tx_queue_full: u32,
}

/// A [`Controller`] built on a raw [`CanDevice`].
#[derive(Debug)]
pub struct ControllerAdapter<D> {
    device: D,
    open: bool,
    mode: Mode,
    tx_queue: Ring<CanFrame>,
    filter: AcceptanceFilter,
    // A frame taken from the device by `available()` but not yet read.
    pending: Option<CanFrame>,
    epoch: Instant,
    counters: AdapterCounters,
}

impl<D: CanDevice> ControllerAdapter<D> {
    /// Creates an adapter with a transmit queue of `tx_queue_len` frames.
    pub fn new(device: D, tx_queue_len: usize) -> Self {
        Self {
            device,
            open: false,
            mode: Mode::default(),
            tx_queue: Ring::new(tx_queue_len),
            filter: AcceptanceFilter::default(),
            pending: None,
            epoch: Instant::now(),
            counters: AdapterCounters::default(),
        }
    }

    /// Gets a reference to the underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Gets a mutable reference to the underlying device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The number of frames waiting in the transmit queue
    pub fn tx_queue_len(&self) -> usize {
        self.tx_queue.len()
    }

    /// The acceptance filter currently installed
    pub fn filter(&self) -> AcceptanceFilter {
        self.filter
    }

    /// A snapshot of the diagnostic counters
    pub fn counters(&self) -> AdapterCounters {
        self.counters
    }

    /// Resets the diagnostic counters to zero.
    pub fn reset_counters(&mut self) {
        self.counters = AdapterCounters::default();
    }

    // Milliseconds since the adapter was created, wrapping at 16 bits.
    fn timestamp(&self) -> u16 {
        (self.epoch.elapsed().as_millis() & 0xFFFF) as u16
    }

    fn enqueue(&mut self, frame: CanFrame) -> Result<()> {
        if self.tx_queue.push(frame).is_err() {
            self.counters.tx_queue_full = self.counters.tx_queue_full.wrapping_add(1);
            warn!("Transmit queue full, rejecting frame {:X}", frame);
            return Err(Error::TxQueueFull);
        }
        trace!("Queued frame {:X} ({} waiting)", frame, self.tx_queue.len());
        Ok(())
    }

    // Puts a frame the device pushed out back at the head of the queue,
    // since it was written before anything still waiting.
    fn requeue(&mut self, frame: CanFrame) {
        if self.tx_queue.push_front(frame).is_err() {
            self.counters.tx_queue_full = self.counters.tx_queue_full.wrapping_add(1);
            warn!("Transmit queue full, dropping displaced frame {:X}", frame);
        }
    }

    // Pulls the next frame from the device, if any.
    fn fetch(&mut self) -> Option<CanFrame> {
        if let Some(frame) = self.pending.take() {
            return Some(frame);
        }
        match self.device.receive() {
            Ok(frame) => Some(frame),
            Err(nb::Error::WouldBlock) => None,
            Err(nb::Error::Other(err)) => {
                warn!("CAN receive error: {:?}", Error::device(err));
                None
            }
        }
    }
}

impl<D: CanDevice> Controller for ControllerAdapter<D> {
    fn supports_bitrate(&self, bitrate: Bitrate) -> bool {
        self.device.supports_bitrate(bitrate)
    }

    fn open(&mut self, bitrate: Bitrate, mode: Mode) -> Result<()> {
        if !self.supports_bitrate(bitrate) {
            return Err(Error::UnsupportedBitrate(bitrate.preset()));
        }

        self.tx_queue.clear();
        if self.open {
            self.close();
        }

        self.device.start(bitrate, mode)?;
        self.open = true;
        self.mode = mode;
        self.pending = None;
        debug!("Controller open at {} in {:?} mode", bitrate, mode);
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.device.stop();
            self.open = false;
            debug!("Controller closed");
        }
        self.tx_queue.clear();
        self.pending = None;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn write(&mut self, frame: &CanFrame) -> Result<()> {
        if !self.open {
            return Err(Error::NotOpen);
        }
        if self.mode == Mode::ListenOnly {
            return Err(Error::ListenOnly);
        }

        // Only go straight to the hardware when nothing is queued ahead.
        if self.tx_queue.is_empty() {
            match self.device.transmit(frame) {
                Ok(displaced) => {
                    trace!("Sent frame {:X}", frame);
                    if let Some(displaced) = displaced {
                        // Lower-priority frame pushed out of the hardware
                        self.requeue(displaced);
                    }
                    return Ok(());
                }
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(err)) => return Err(Error::device(err)),
            }
        }
        self.enqueue(*frame)
    }

    fn available(&mut self) -> bool {
        if !self.open {
            return false;
        }
        if self.pending.is_none() {
            self.pending = self.fetch();
        }
        self.pending.is_some()
    }

    fn read(&mut self) -> Option<CanFrame> {
        if !self.open {
            return None;
        }

        let frame = self.fetch()?.with_timestamp(self.timestamp());
        if !self.filter.passes(frame.raw_id()) {
            trace!("Filtered out frame {:X}", frame);
            return None;
        }
        trace!("Received frame {:X}", frame);
        Some(frame)
    }

    fn status(&self) -> StatusFlags {
        let mut flags = StatusFlags::empty();
        if self.open && self.tx_queue.is_full() {
            flags |= StatusFlags::TX_FIFO_FULL;
        }
        flags
    }

    fn set_filter(&mut self, mask: u32, code: u32) {
        self.filter.set(mask, code);
        debug!("Acceptance filter mask={:08X} code={:08X}", mask, code);
    }

    fn clear_filter(&mut self) {
        self.filter.clear();
        debug!("Acceptance filter cleared");
    }

    fn service(&mut self) {
        if !self.open {
            return;
        }

        // Bounded, in case the device keeps handing frames back
        for _ in 0..self.tx_queue.capacity() {
            let Some(frame) = self.tx_queue.peek().copied() else {
                break;
            };
            match self.device.transmit(&frame) {
                Ok(displaced) => {
                    self.tx_queue.pop();
                    trace!("Sent queued frame {:X}", frame);
                    if let Some(displaced) = displaced {
                        self.requeue(displaced);
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(err)) => {
                    warn!("CAN transmit error: {:?}", Error::device(err));
                    break;
                }
            }
        }
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{id::CanId, mock::MockDevice};
    use embedded_can::Frame as EmbeddedFrame;

    fn frame(id: u16, data: &[u8]) -> CanFrame {
        CanFrame::with_id(CanId::standard(id).unwrap(), data).unwrap()
    }

    fn open_adapter(tx_len: usize) -> (MockDevice, ControllerAdapter<MockDevice>) {
        let dev = MockDevice::new();
        let mut can = ControllerAdapter::new(dev.clone(), tx_len);
        can.open(Bitrate::Rate500K, Mode::Normal).unwrap();
        (dev, can)
    }

    #[test]
    fn test_open_unsupported_bitrate() {
        let dev = MockDevice::with_bitrates(&[Bitrate::Rate500K]);
        let mut can = ControllerAdapter::new(dev.clone(), 4);

        assert!(matches!(
            can.open(Bitrate::Rate10K, Mode::Normal),
            Err(Error::UnsupportedBitrate(0))
        ));
        assert!(!can.is_open());
        assert!(!dev.is_started());
    }

    #[test]
    fn test_open_device_failure() {
        let dev = MockDevice::new();
        dev.set_fail_start(true);
        let mut can = ControllerAdapter::new(dev, 4);

        assert!(can.open(Bitrate::Rate500K, Mode::Normal).is_err());
        assert!(!can.is_open());
    }

    #[test]
    fn test_write_rejected_when_closed_or_listening() {
        let dev = MockDevice::new();
        let mut can = ControllerAdapter::new(dev.clone(), 4);

        assert!(matches!(can.write(&frame(1, &[])), Err(Error::NotOpen)));

        can.open(Bitrate::Rate500K, Mode::ListenOnly).unwrap();
        assert_eq!(can.mode(), Mode::ListenOnly);
        assert!(matches!(can.write(&frame(1, &[])), Err(Error::ListenOnly)));

        assert!(dev.transmitted().is_empty());
        assert_eq!(can.tx_queue_len(), 0);
    }

    #[test]
    fn test_write_immediate() {
        let (dev, mut can) = open_adapter(4);
        can.write(&frame(0x123, &[1, 2, 3])).unwrap();

        assert_eq!(dev.transmitted(), vec![frame(0x123, &[1, 2, 3])]);
        assert_eq!(can.tx_queue_len(), 0);
    }

    #[test]
    fn test_displaced_frame_goes_first() {
        let (dev, mut can) = open_adapter(8);

        dev.set_tx_busy(true);
        can.write(&frame(1, &[])).unwrap();
        can.write(&frame(2, &[])).unwrap();

        // Sending 1 pushes 0x10 back out of the hardware mailbox
        dev.set_tx_busy(false);
        dev.set_displaced(frame(0x10, &[]));
        can.service();

        let ids: Vec<_> = dev.transmitted().iter().map(|f| f.raw_id()).collect();
        assert_eq!(ids, vec![1, 0x10, 2]);
        assert_eq!(can.tx_queue_len(), 0);

        // Also on the direct path, ahead of later writes
        dev.take_transmitted();
        dev.set_displaced(frame(0x20, &[]));
        can.write(&frame(3, &[])).unwrap();
        can.write(&frame(4, &[])).unwrap();
        assert_eq!(can.tx_queue_len(), 2);

        can.service();
        let ids: Vec<_> = dev.transmitted().iter().map(|f| f.raw_id()).collect();
        assert_eq!(ids, vec![3, 0x20, 4]);
    }

    #[test]
    fn test_queue_preserves_order() {
        let (dev, mut can) = open_adapter(8);

        dev.set_tx_busy(true);
        for id in 1..=3 {
            can.write(&frame(id, &[])).unwrap();
        }
        assert_eq!(can.tx_queue_len(), 3);

        // Hardware frees up, but a new frame must not jump the queue
        dev.set_tx_busy(false);
        can.write(&frame(4, &[])).unwrap();
        assert!(dev.transmitted().is_empty());

        can.service();
        let ids: Vec<_> = dev.transmitted().iter().map(|f| f.raw_id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(can.tx_queue_len(), 0);
    }

    #[test]
    fn test_service_stops_at_busy() {
        let (dev, mut can) = open_adapter(8);
        dev.set_tx_busy(true);
        can.write(&frame(1, &[])).unwrap();
        can.write(&frame(2, &[])).unwrap();

        can.service();
        assert!(dev.transmitted().is_empty());
        assert_eq!(can.tx_queue_len(), 2);

        dev.set_tx_budget(1);
        can.service();
        assert_eq!(dev.transmitted(), vec![frame(1, &[])]);
        assert_eq!(can.tx_queue_len(), 1);
    }

    #[test]
    fn test_queue_full() {
        let (dev, mut can) = open_adapter(2);
        dev.set_tx_busy(true);

        can.write(&frame(1, &[])).unwrap();
        can.write(&frame(2, &[])).unwrap();
        assert!(can.status().contains(StatusFlags::TX_FIFO_FULL));
        assert!(matches!(can.write(&frame(3, &[])), Err(Error::TxQueueFull)));
        assert_eq!(can.counters().tx_queue_full, 1);

        can.reset_counters();
        assert_eq!(can.counters(), AdapterCounters::default());
    }

    #[test]
    fn test_reopen_discards_queue() {
        let (dev, mut can) = open_adapter(4);
        dev.set_tx_busy(true);
        can.write(&frame(1, &[])).unwrap();

        can.open(Bitrate::Rate500K, Mode::Normal).unwrap();
        assert_eq!(can.tx_queue_len(), 0);

        can.write(&frame(2, &[])).unwrap();
        can.close();
        assert_eq!(can.tx_queue_len(), 0);
        assert!(!dev.is_started());

        // Idempotent
        can.close();
        assert!(!can.is_open());
    }

    #[test]
    fn test_read_filter_and_timestamp() {
        let (dev, mut can) = open_adapter(4);
        can.set_filter(0x7FF, 0x123);

        dev.push_rx(frame(0x456, &[1]));
        dev.push_rx(frame(0x123, &[2]));

        assert!(can.available());
        assert_eq!(can.read(), None);
        assert!(can.available());
        let rx = can.read().unwrap();
        assert_eq!(rx.raw_id(), 0x123);
        assert_eq!(rx.data(), &[2]);
        assert!(rx.timestamp().is_some());
        assert!(!can.available());

        can.clear_filter();
        dev.push_rx(frame(0x456, &[1]));
        assert_eq!(can.read().map(|f| f.raw_id()), Some(0x456));
    }

    #[test]
    fn test_read_when_closed() {
        let dev = MockDevice::new();
        let mut can = ControllerAdapter::new(dev.clone(), 4);
        dev.push_rx(frame(1, &[]));

        assert!(!can.available());
        assert_eq!(can.read(), None);
        assert_eq!(dev.rx_len(), 1);
    }
}
