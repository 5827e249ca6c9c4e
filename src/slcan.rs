// slcan-gateway/src/slcan.rs
//
// The SLCAN (Lawicel) protocol engine.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The SLCAN protocol handler.
//!
//! [`Slcan`] owns the channel state and the receive ring, parses host
//! commands and drives a [`Controller`]. Frames received from the bus are
//! buffered in the ring and forwarded to the host from [`poll`], a bounded
//! number at a time.
//!
//! | Command | Meaning | Reply |
//! |---|---|---|
//! | `S0`..`S8` | Set bitrate preset (closed only) | CR |
//! | `s...` | Custom bit timing | always BEL |
//! | `O` / `L` | Open normal / listen-only | CR |
//! | `C` | Close | CR |
//! | `tiiil..` `Tiiiiiiiil..` | Send data frame (open only) | `z` / `Z` |
//! | `riiil` `Riiiiiiiil` | Send remote frame (open only) | `z` / `Z` |
//! | `F` | Status flags | `Fxx` |
//! | `V` / `N` | Version / serial number | `Vxxyy` / `Nxxxx` |
//! | `Z0` `Z1` | Timestamps off / on | CR |
//! | `X0` `X1` | Auto-forwarding off / on | CR |
//! | `Mxxxxxxxx` `mxxxxxxxx` | Acceptance mask / code | CR |
//! | `P` / `A` | Poll one / all frames (open, `X0` only) | frame(s) |
//!
//! [`poll`]: ProtocolHandler::poll

use crate::{
    bus::{Bitrate, Mode, StatusFlags},
    codec::{format_frame, parse_frame},
    config::Config,
    controller::Controller,
    frame::CanFrame,
    handler::{ProtocolHandler, Response, CR},
    ring::Ring,
    transport::{Transport, WritePriority},
};
use embedded_can::Frame as EmbeddedFrame;
use log::{debug, trace, warn};
use std::fmt::Display;

/// Every command letter the engine answers to
const COMMANDS: &str = "SsOLCtTrRFVNZXMmPA";

/// The state of the CAN channel, as seen by the host.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Not on the bus; configuration commands are accepted.
    #[default]
    Closed,
    /// On the bus, transmitting and receiving.
    Open,
    /// On the bus, receiving only.
    ListenOnly,
}

/// Protocol engine diagnostic counters
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SlcanCounters {
    /// Received frames refused, at least once, because the ring was full
    pub rx_overflows: u32,
    /// Frames lost because the host couldn't take them
    pub forward_drops: u32,
}

/// The SLCAN protocol engine, driving a CAN controller.
#[derive(Debug)]
pub struct Slcan<C> {
    can: C,
    state: ChannelState,
    bitrate: Bitrate,
    timestamps: bool,
    auto_forward: bool,
    filter_mask: u32,
    filter_code: u32,
    rx_ring: Ring<CanFrame>,
    // Set once an overflow is counted for the frame waiting in the controller
    rx_blocked: bool,
    max_frames_per_poll: usize,
    max_response_len: usize,
    version: (u8, u8),
    serial: String,
    counters: SlcanCounters,
}

impl<C: Controller> Slcan<C> {
    /// Creates an engine with the default configuration.
    pub fn new(can: C) -> Self {
        Self::with_config(can, &Config::default())
    }

    /// Creates an engine with the receive ring, poll limit, bitrate and
    /// identification taken from the configuration.
    pub fn with_config(can: C, config: &Config) -> Self {
        Self {
            can,
            state: ChannelState::Closed,
            bitrate: config.default_bitrate,
            timestamps: false,
            auto_forward: true,
            filter_mask: 0,
            filter_code: 0,
            rx_ring: Ring::new(config.rx_ring_len),
            rx_blocked: false,
            max_frames_per_poll: config.max_frames_per_poll,
            max_response_len: config.max_response_len,
            version: config.version,
            serial: config.serial.clone(),
            counters: SlcanCounters::default(),
        }
    }

    /// The current channel state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// The bitrate preset used by the next open
    pub fn bitrate(&self) -> Bitrate {
        self.bitrate
    }

    /// Whether forwarded frames carry a timestamp suffix
    pub fn timestamps_enabled(&self) -> bool {
        self.timestamps
    }

    /// Whether received frames are forwarded from `poll()`
    pub fn auto_forward(&self) -> bool {
        self.auto_forward
    }

    /// The stored acceptance filter, as (mask, code)
    pub fn filter(&self) -> (u32, u32) {
        (self.filter_mask, self.filter_code)
    }

    /// The number of frames waiting in the receive ring
    pub fn rx_pending(&self) -> usize {
        self.rx_ring.len()
    }

    /// Gets a reference to the controller.
    pub fn controller(&self) -> &C {
        &self.can
    }

    /// Gets a mutable reference to the controller.
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.can
    }

    /// A snapshot of the diagnostic counters
    pub fn counters(&self) -> SlcanCounters {
        self.counters
    }

    /// Resets the diagnostic counters to zero.
    pub fn reset_counters(&mut self) {
        self.counters = SlcanCounters::default();
    }

    fn reject(line: &str, reason: impl Display) -> Response {
        debug!("Rejected {:?}: {}", line, reason);
        Response::Error
    }

    fn set_bitrate(&mut self, line: &str) -> Response {
        let rate = match line.as_bytes().get(1) {
            Some(d @ b'0'..=b'8') => Bitrate::from_preset(d - b'0'),
            _ => None,
        };
        let Some(rate) = rate else {
            return Self::reject(line, "bad bitrate preset");
        };
        if !self.can.supports_bitrate(rate) {
            return Self::reject(line, format!("{} not supported", rate));
        }
        if self.state != ChannelState::Closed {
            return Self::reject(line, "channel is open");
        }
        self.bitrate = rate;
        debug!("Bitrate set to {}", rate);
        Response::Ok
    }

    fn open(&mut self, line: &str, mode: Mode) -> Response {
        if self.state != ChannelState::Closed {
            return Self::reject(line, "channel already open");
        }
        if let Err(err) = self.can.open(self.bitrate, mode) {
            return Self::reject(line, err);
        }

        if self.filter_mask != 0 {
            self.can.set_filter(self.filter_mask, self.filter_code);
        } else {
            self.can.clear_filter();
        }

        self.state = match mode {
            Mode::Normal => ChannelState::Open,
            Mode::ListenOnly => ChannelState::ListenOnly,
        };
        debug!("Channel {:?}", self.state);
        Response::Ok
    }

    fn close(&mut self) -> Response {
        if self.state != ChannelState::Closed {
            self.can.close();
            self.rx_blocked = false;
            self.state = ChannelState::Closed;
            debug!("Channel closed");
        }
        Response::Ok
    }

    fn transmit(&mut self, line: &str) -> Response {
        if self.state != ChannelState::Open {
            return Self::reject(line, "channel not open for transmit");
        }
        let frame = match parse_frame(line) {
            Ok(frame) => frame,
            Err(err) => return Self::reject(line, err),
        };
        if let Err(err) = self.can.write(&frame) {
            return Self::reject(line, err);
        }
        let ack = if frame.is_extended() { "Z" } else { "z" };
        Response::Payload(ack.into())
    }

    fn status(&self) -> Response {
        let mut flags = self.can.status();
        if self.rx_ring.is_full() {
            flags |= StatusFlags::RX_FIFO_FULL;
        }
        Response::Payload(format!("F{:02X}", flags.bits()))
    }

    // Parses the 0/1 argument of the toggle commands.
    fn toggle(line: &str) -> Option<bool> {
        match line.as_bytes().get(1) {
            Some(b'0') => Some(false),
            Some(b'1') => Some(true),
            _ => None,
        }
    }

    // Parses the 8 hex digit argument of the filter commands.
    fn filter_arg(line: &str) -> Option<u32> {
        let digits = line.get(1..)?;
        if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(digits, 16).ok()
    }

    fn set_filter(&mut self, line: &str, is_mask: bool) -> Response {
        let Some(value) = Self::filter_arg(line) else {
            return Self::reject(line, "expected 8 hex digits");
        };
        if is_mask {
            self.filter_mask = value;
        } else {
            self.filter_code = value;
        }
        if self.state != ChannelState::Closed {
            self.can.set_filter(self.filter_mask, self.filter_code);
        }
        Response::Ok
    }

    fn polling_allowed(&self) -> bool {
        self.state != ChannelState::Closed && !self.auto_forward
    }

    fn poll_one(&mut self, line: &str) -> Response {
        if !self.polling_allowed() {
            return Self::reject(line, "polling needs an open channel and X0");
        }
        self.drain();
        match self.rx_ring.pop() {
            Some(frame) => Response::Payload(format_frame(&frame, self.timestamps)),
            None => Response::Ok,
        }
    }

    fn poll_all(&mut self, line: &str) -> Response {
        if !self.polling_allowed() {
            return Self::reject(line, "polling needs an open channel and X0");
        }
        self.drain();

        // Whatever doesn't fit in one response stays for the next `A`.
        // Two bytes are kept for the closing "A" and CR.
        let budget = self.max_response_len.saturating_sub(2);
        let mut text = String::new();
        while let Some(frame) = self.rx_ring.peek() {
            let line = format_frame(frame, self.timestamps);
            if text.len() + line.len() + 1 > budget {
                break;
            }
            self.rx_ring.pop();
            text.push_str(&line);
            text.push(char::from(CR));
        }
        text.push('A');
        Response::Payload(text)
    }

    // Moves received frames from the controller into the ring. When the
    // ring is full, the next frame is left in the controller and draining
    // stops until the next call. Each refused frame is counted once.
    fn drain(&mut self) {
        while self.can.available() {
            if self.rx_ring.is_full() {
                if !self.rx_blocked {
                    self.rx_blocked = true;
                    self.counters.rx_overflows = self.counters.rx_overflows.wrapping_add(1);
                    warn!("Receive ring full ({} frames)", self.rx_ring.len());
                }
                return;
            }
            self.rx_blocked = false;
            // A frame rejected by the filter reads as None
            if let Some(frame) = self.can.read() {
                let _ = self.rx_ring.push(frame);
            }
        }
    }
}

impl<C: Controller> ProtocolHandler for Slcan<C> {
    fn name(&self) -> &str {
        "SLCAN"
    }

    fn can_handle(&self, line: &str) -> bool {
        line.chars().next().map_or(false, |c| COMMANDS.contains(c))
    }

    fn process(&mut self, line: &str) -> Response {
        let Some(cmd) = line.chars().next() else {
            return Response::Error;
        };

        let resp = match cmd {
            'S' => self.set_bitrate(line),
            's' => Self::reject(line, "custom bit timing not supported"),
            'O' => self.open(line, Mode::Normal),
            'L' => self.open(line, Mode::ListenOnly),
            'C' => self.close(),
            't' | 'T' | 'r' | 'R' => self.transmit(line),
            'F' => self.status(),
            'V' => Response::Payload(format!("V{:02X}{:02X}", self.version.0, self.version.1)),
            'N' => Response::Payload(format!("N{}", self.serial)),
            'Z' => match Self::toggle(line) {
                Some(on) => {
                    self.timestamps = on;
                    Response::Ok
                }
                None => Self::reject(line, "expected Z0 or Z1"),
            },
            'X' => match Self::toggle(line) {
                Some(on) => {
                    self.auto_forward = on;
                    Response::Ok
                }
                None => Self::reject(line, "expected X0 or X1"),
            },
            'M' => self.set_filter(line, true),
            'm' => self.set_filter(line, false),
            'P' => self.poll_one(line),
            'A' => self.poll_all(line),
            _ => Self::reject(line, "unknown command"),
        };
        trace!("{:?} -> {}", line, resp);
        resp
    }

    fn poll(&mut self, transport: &mut dyn Transport) {
        if self.state == ChannelState::Closed {
            return;
        }

        self.can.service();

        if !self.auto_forward {
            return;
        }

        self.drain();

        for _ in 0..self.max_frames_per_poll {
            let Some(frame) = self.rx_ring.pop() else {
                break;
            };
            let mut line = format_frame(&frame, self.timestamps).into_bytes();
            line.push(CR);
            if !transport.write_with_priority(&line, WritePriority::BestEffort) {
                // The popped frame is lost; the rest wait for the next poll
                self.counters.forward_drops = self.counters.forward_drops.wrapping_add(1);
                break;
            }
        }
    }

    fn is_active(&self) -> bool {
        self.state != ChannelState::Closed
    }
}

/////////////////////////////////////////////////////////////////////////////
