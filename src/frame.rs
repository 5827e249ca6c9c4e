// slcan-gateway/src/frame.rs
//
// Implements the classic CAN 2.0 frame passed between the host and the bus.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN bus frames.
//!
//! A [`CanFrame`] is a classic CAN 2.0 frame: a standard or extended
//! identifier, a data length code of 0-8, and up to 8 data bytes. Remote
//! frames carry a data length code but no data.
//!
//! Frames are created either by the command parser (host to bus) or by the
//! controller adapter (bus to host, stamped with a 16-bit millisecond
//! timestamp). They are plain `Copy` values and never change once built.
//!
//! `CanFrame` implements the
//! [embedded_can::Frame](https://docs.rs/embedded-can/latest/embedded_can/trait.Frame.html)
//! trait, so it can be used with any `embedded-can` device.

use crate::id::{id_to_raw, CanId};
use embedded_can::{Frame as EmbeddedFrame, Id, StandardId};
use std::fmt;

/// The maximum number of data bytes in a classic CAN frame
pub const CAN_MAX_DLEN: usize = 8;

/// A classic CAN 2.0 frame.
///
/// The data bytes beyond the data length code are always zero, so two
/// frames carrying the same payload compare equal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CanFrame {
    id: Id,
    dlc: u8,
    data: [u8; CAN_MAX_DLEN],
    remote: bool,
    timestamp: Option<u16>,
}

impl CanFrame {
    /// Creates a data frame with an identifier of explicit width.
    pub fn with_id(id: CanId, data: &[u8]) -> Option<Self> {
        <Self as EmbeddedFrame>::new(id, data)
    }

    /// Creates a remote frame with an identifier of explicit width.
    pub fn remote_with_id(id: CanId, dlc: usize) -> Option<Self> {
        <Self as EmbeddedFrame>::new_remote(id, dlc)
    }

    /// Returns a copy of the frame carrying a receive timestamp.
    pub fn with_timestamp(mut self, timestamp: u16) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The raw numeric identifier, without any width information.
    #[inline]
    pub fn raw_id(&self) -> u32 {
        id_to_raw(&self.id)
    }

    /// The identifier, with its width
    #[inline]
    pub fn can_id(&self) -> CanId {
        self.id.into()
    }

    /// The receive timestamp in milliseconds (wrapping at 16 bits), if any.
    #[inline]
    pub fn timestamp(&self) -> Option<u16> {
        self.timestamp
    }
}

impl Default for CanFrame {
    /// An empty data frame with a standard ID of zero.
    fn default() -> Self {
        Self {
            id: StandardId::ZERO.into(),
            dlc: 0,
            data: [0; CAN_MAX_DLEN],
            remote: false,
            timestamp: None,
        }
    }
}

impl EmbeddedFrame for CanFrame {
    /// Creates a data frame. Fails if there is more than 8 bytes of data.
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > CAN_MAX_DLEN {
            return None;
        }

        let mut buf = [0; CAN_MAX_DLEN];
        buf[..data.len()].copy_from_slice(data);

        Some(Self {
            id: id.into(),
            dlc: data.len() as u8,
            data: buf,
            remote: false,
            timestamp: None,
        })
    }

    /// Creates a remote frame. Fails if the requested length is over 8.
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > CAN_MAX_DLEN {
            return None;
        }

        Some(Self {
            id: id.into(),
            dlc: dlc as u8,
            data: [0; CAN_MAX_DLEN],
            remote: true,
            timestamp: None,
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        usize::from(self.dlc)
    }

    /// The payload. Always empty for a remote frame.
    fn data(&self) -> &[u8] {
        if self.remote {
            &[]
        } else {
            &self.data[..usize::from(self.dlc)]
        }
    }
}

impl fmt::UpperHex for CanFrame {
    /// Formats the frame in the candump style, like `123#AABBCC` or `123#R3`
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_extended() {
            write!(f, "{:08X}#", self.raw_id())?;
        } else {
            write!(f, "{:03X}#", self.raw_id())?;
        }
        if self.remote {
            write!(f, "R{}", self.dlc)
        } else {
            f.write_str(&hex::encode_upper(self.data()))
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
