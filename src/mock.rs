// slcan-gateway/src/mock.rs
//
// In-memory CAN device and byte stream.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Test doubles for the two external boundaries of the gateway.
//!
//! Both are cheap shared handles: clone one, hand the clone to the gateway,
//! and keep the other handle to inject traffic and inspect what came out.

use crate::{
    bus::{Bitrate, Mode},
    controller::CanDevice,
    frame::CanFrame,
    transport::ByteStream,
    Error, Result,
};
use std::{cell::RefCell, collections::VecDeque, io, rc::Rc};

// ===== MockDevice =====

#[derive(Debug, Default)]
struct DeviceState {
    // None supports every preset
    bitrates: Option<Vec<Bitrate>>,
    fail_start: bool,
    started: Option<(Bitrate, Mode)>,
    tx_busy: bool,
    tx_budget: Option<usize>,
    displaced: Option<CanFrame>,
    transmitted: Vec<CanFrame>,
    rx: VecDeque<CanFrame>,
}

/// An in-memory CAN device.
#[derive(Debug, Clone, Default)]
pub struct MockDevice(Rc<RefCell<DeviceState>>);

impl MockDevice {
    /// Creates a device that supports every bitrate preset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device that only supports the given presets.
    pub fn with_bitrates(bitrates: &[Bitrate]) -> Self {
        let dev = Self::default();
        dev.0.borrow_mut().bitrates = Some(bitrates.to_vec());
        dev
    }

    /// Makes the next `start()` calls fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.0.borrow_mut().fail_start = fail;
    }

    /// Whether the device is on the bus
    pub fn is_started(&self) -> bool {
        self.0.borrow().started.is_some()
    }

    /// The bitrate and mode of the running session
    pub fn started(&self) -> Option<(Bitrate, Mode)> {
        self.0.borrow().started
    }

    /// Makes the transmit FIFO report busy (or not) indefinitely.
    pub fn set_tx_busy(&self, busy: bool) {
        let mut st = self.0.borrow_mut();
        st.tx_busy = busy;
        st.tx_budget = None;
    }

    /// Lets the transmit FIFO take `n` more frames, then report busy.
    pub fn set_tx_budget(&self, n: usize) {
        let mut st = self.0.borrow_mut();
        st.tx_busy = false;
        st.tx_budget = Some(n);
    }

    /// Makes the next accepted transmit hand back `frame`, as if it had
    /// been pushed out of the hardware mailbox.
    pub fn set_displaced(&self, frame: CanFrame) {
        self.0.borrow_mut().displaced = Some(frame);
    }

    /// Every frame put on the bus so far
    pub fn transmitted(&self) -> Vec<CanFrame> {
        self.0.borrow().transmitted.clone()
    }

    /// Takes the frames put on the bus so far.
    pub fn take_transmitted(&self) -> Vec<CanFrame> {
        std::mem::take(&mut self.0.borrow_mut().transmitted)
    }

    /// Simulates a frame arriving from the bus.
    pub fn push_rx(&self, frame: CanFrame) {
        self.0.borrow_mut().rx.push_back(frame);
    }

    /// The number of received frames not yet taken
    pub fn rx_len(&self) -> usize {
        self.0.borrow().rx.len()
    }
}

impl embedded_can::nb::Can for MockDevice {
    type Frame = CanFrame;
    type Error = Error;

    fn transmit(&mut self, frame: &CanFrame) -> nb::Result<Option<CanFrame>, Error> {
        let mut st = self.0.borrow_mut();
        if st.started.is_none() {
            return Err(nb::Error::Other(Error::NotOpen));
        }
        if st.tx_busy {
            return Err(nb::Error::WouldBlock);
        }
        match st.tx_budget {
            Some(0) => return Err(nb::Error::WouldBlock),
            Some(n) => st.tx_budget = Some(n - 1),
            None => {}
        }
        st.transmitted.push(*frame);
        Ok(st.displaced.take())
    }

    fn receive(&mut self) -> nb::Result<CanFrame, Error> {
        let mut st = self.0.borrow_mut();
        if st.started.is_none() {
            return Err(nb::Error::WouldBlock);
        }
        st.rx.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

impl CanDevice for MockDevice {
    fn supports_bitrate(&self, bitrate: Bitrate) -> bool {
        self.0
            .borrow()
            .bitrates
            .as_ref()
            .map_or(true, |rates| rates.contains(&bitrate))
    }

    fn start(&mut self, bitrate: Bitrate, mode: Mode) -> Result<()> {
        let mut st = self.0.borrow_mut();
        if st.fail_start {
            return Err(Error::Device(embedded_can::ErrorKind::Other));
        }
        st.started = Some((bitrate, mode));
        Ok(())
    }

    fn stop(&mut self) {
        self.0.borrow_mut().started = None;
    }
}

// ===== MockStream =====

#[derive(Debug, Default)]
struct StreamState {
    input: VecDeque<u8>,
    output: Vec<u8>,
    capacity: Option<usize>,
    eof: bool,
}

/// An in-memory byte stream.
///
/// The write capacity is fixed until changed: it is the size of the largest
/// write the stream will take, not a budget that gets used up.
#[derive(Debug, Clone, Default)]
pub struct MockStream(Rc<RefCell<StreamState>>);

impl MockStream {
    /// Creates an empty stream that takes writes of any size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes from the host.
    pub fn feed(&self, data: impl AsRef<[u8]>) {
        self.0.borrow_mut().input.extend(data.as_ref());
    }

    /// Sets the write capacity (`None` for unknown).
    pub fn set_capacity(&self, capacity: Option<usize>) {
        self.0.borrow_mut().capacity = capacity;
    }

    /// Reports end of stream once the queued input is consumed.
    pub fn set_eof(&self, eof: bool) {
        self.0.borrow_mut().eof = eof;
    }

    /// Everything written to the host so far
    pub fn output(&self) -> Vec<u8> {
        self.0.borrow().output.clone()
    }

    /// Takes everything written to the host so far.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut().output)
    }

    /// Takes the output as text.
    pub fn take_output_string(&self) -> String {
        String::from_utf8_lossy(&self.take_output()).into_owned()
    }
}

impl ByteStream for MockStream {
    fn read_byte(&mut self) -> nb::Result<u8, io::Error> {
        let mut st = self.0.borrow_mut();
        match st.input.pop_front() {
            Some(b) => Ok(b),
            None if st.eof => Err(nb::Error::Other(io::ErrorKind::UnexpectedEof.into())),
            None => Err(nb::Error::WouldBlock),
        }
    }

    fn write_capacity(&self) -> Option<usize> {
        self.0.borrow().capacity
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut st = self.0.borrow_mut();
        if st.capacity.map_or(false, |cap| buf.len() > cap) {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        st.output.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/////////////////////////////////////////////////////////////////////////////
