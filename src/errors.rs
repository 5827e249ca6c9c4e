// slcan-gateway/src/errors.rs
//
// Implements errors for the SLCAN gateway.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Gateway errors.
//!
//! Nothing in the gateway is fatal. Every error returned here ends up as
//! the SLCAN error marker (`BEL`) on the wire, or as a dropped message and
//! an incremented counter, and the loop moves on to its next iteration.
//!
//! Errors parsing SLCAN frame text are reported separately, by
//! [`ParseError`](crate::codec::ParseError).

use std::io;
use thiserror::Error as ThisError;

/// Errors from the controller adapter and the devices beneath it.
#[derive(ThisError, Debug)]
pub enum Error {
    /// The channel is not open
    #[error("CAN channel is not open")]
    NotOpen,
    /// The channel is open in listen-only mode and can not transmit
    #[error("CAN channel is in listen-only mode")]
    ListenOnly,
    /// The controller can not run at the requested bitrate
    #[error("Unsupported bitrate preset S{0}")]
    UnsupportedBitrate(u8),
    /// The software transmit queue is full
    #[error("Transmit queue full")]
    TxQueueFull,
    /// The CAN device reported an error
    #[error("CAN device error: {0:?}")]
    Device(embedded_can::ErrorKind),
    /// A low-level I/O error
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Wraps any `embedded_can` error by its kind.
    pub fn device<E: embedded_can::Error>(err: E) -> Self {
        Self::Device(err.kind())
    }
}

impl embedded_can::Error for Error {
    fn kind(&self) -> embedded_can::ErrorKind {
        match *self {
            Error::TxQueueFull => embedded_can::ErrorKind::Overrun,
            Error::Device(kind) => kind,
            _ => embedded_can::ErrorKind::Other,
        }
    }
}

/// A result that can derive from an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/////////////////////////////////////////////////////////////////////////////
