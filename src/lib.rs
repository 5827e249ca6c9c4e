// slcan-gateway/src/lib.rs
//
// The main lib file for the SLCAN gateway.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Serial Line CAN (SLCAN) gateway.
//!
//! SLCAN, also known as the Lawicel protocol, is the ASCII line protocol
//! spoken by many USB-to-CAN adapters, and understood by tools like
//! `slcand` and python-can. A host sends single-letter commands terminated
//! by CR (`S6` to select 500 kbit/s, `O` to open the channel,
//! `t1233AABBCC` to send a frame) and gets back a CR, a BEL for errors, or
//! a short payload. Frames received from the bus are sent to the host
//! unsolicited, in the same text format.
//!
//! This crate is the protocol engine of such an adapter. It sits between:
//!
//! - a byte stream to the host (a [`ByteStream`], like a serial tty), and
//! - a CAN controller (a [`CanDevice`], like a SocketCAN interface).
//!
//! # Structure
//!
//! ```text
//!  host <-> ByteStream <-> LineTransport <-> Gateway/Dispatcher
//!                                                 |
//!                                               Slcan <-> ControllerAdapter <-> CanDevice <-> bus
//! ```
//!
//! Everything runs in a single, cooperative loop. The application calls
//! [`Gateway::run_once`] repeatedly; each call handles a bounded number of
//! host commands and forwards a bounded number of received frames. Nothing
//! blocks, except for a short, bounded wait for room to send a command
//! response. Every message that has to be dropped is counted.
//!
//! # Example
//!
//! ```
//! use slcan_gateway::{
//!     handler_ref, ControllerAdapter, Gateway, LineTransport, MockDevice, MockStream, Slcan,
//! };
//!
//! let stream = MockStream::new();
//! let can = ControllerAdapter::new(MockDevice::new(), 32);
//!
//! let mut gw = Gateway::new(LineTransport::new(stream.clone()));
//! gw.register(handler_ref(Slcan::new(can)));
//!
//! stream.feed("S6\rO\rt1233AABBCC\r");
//! gw.run_once();
//! assert_eq!(stream.take_output(), b"\r\rz\r");
//! ```
//!
//! # Crate Features
//!
//! ### Default
//!
//! * **socketcan** -
//!   The [`SocketCanDevice`], for Linux SocketCAN interfaces.
//!
//! ### Non-default
//!
//! * **utils** -
//!   Builds the `slcan-gateway` command-line application.
//!
//! * **vcan_tests** -
//!   Runs integration tests against a virtual CAN interface named `vcan0`.

#![deny(
    missing_docs,
    missing_copy_implementations,
    missing_debug_implementations,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]
// clippy::len_without_is_empty is fine for the fixed-capacity containers
#![allow(clippy::len_without_is_empty)]

pub mod bus;
pub use bus::{Bitrate, Mode, StatusFlags};

pub mod codec;
pub use codec::{format_frame, parse_frame, ParseError};

pub mod config;
pub use config::Config;

pub mod controller;
pub use controller::{AdapterCounters, CanDevice, Controller, ControllerAdapter};

pub mod dispatcher;
pub use dispatcher::{handler_ref, Dispatcher, HandlerRef};

pub mod errors;
pub use errors::{Error, Result};

pub mod frame;
pub use frame::CanFrame;

pub mod gateway;
pub use gateway::Gateway;

pub mod handler;
pub use handler::{ProtocolHandler, Response};

pub mod id;
pub use id::{AcceptanceFilter, CanId};

pub mod mock;
pub use mock::{MockDevice, MockStream};

pub mod ring;
pub use ring::Ring;

pub mod slcan;
pub use slcan::{ChannelState, Slcan, SlcanCounters};

pub mod transport;
pub use transport::{ByteStream, LineTransport, Transport, TransportCounters, WritePriority};

#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub use stream::FdStream;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socket;
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use socket::SocketCanDevice;
